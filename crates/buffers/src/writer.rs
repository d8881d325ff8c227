//! Growable big-endian byte writer.

use crate::BufferError;

/// A byte writer that appends big-endian quantities to an owned buffer.
///
/// # Example
///
/// ```
/// use meta_buffers::Writer;
///
/// let mut writer = Writer::new();
/// writer.u8(0x01);
/// writer.u16(0x0203);
/// assert_eq!(writer.flush(), [0x01, 0x02, 0x03]);
/// ```
#[derive(Debug, Default, Clone)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Creates a writer with room for `capacity` bytes before reallocating.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Number of bytes written since the last flush.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Returns the written bytes and leaves the writer empty.
    pub fn flush(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buf)
    }

    /// View of the bytes written so far.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    #[inline]
    pub fn u8(&mut self, val: u8) {
        self.buf.push(val);
    }

    #[inline]
    pub fn u16(&mut self, val: u16) {
        self.buf.extend_from_slice(&val.to_be_bytes());
    }

    #[inline]
    pub fn i16(&mut self, val: i16) {
        self.buf.extend_from_slice(&val.to_be_bytes());
    }

    #[inline]
    pub fn u32(&mut self, val: u32) {
        self.buf.extend_from_slice(&val.to_be_bytes());
    }

    #[inline]
    pub fn i32(&mut self, val: i32) {
        self.buf.extend_from_slice(&val.to_be_bytes());
    }

    #[inline]
    pub fn i64(&mut self, val: i64) {
        self.buf.extend_from_slice(&val.to_be_bytes());
    }

    #[inline]
    pub fn f64(&mut self, val: f64) {
        self.buf.extend_from_slice(&val.to_be_bytes());
    }

    /// Writes raw bytes with no length prefix.
    pub fn buf(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Writes a `u16` count, failing if `len` does not fit.
    pub fn len16(&mut self, len: usize) -> Result<(), BufferError> {
        let len16 = u16::try_from(len).map_err(|_| BufferError::LengthOverflow {
            len,
            limit: u16::MAX as usize,
        })?;
        self.u16(len16);
        Ok(())
    }

    /// Writes a UTF-8 string prefixed with its byte length as `u16`.
    pub fn str16(&mut self, s: &str) -> Result<(), BufferError> {
        self.len16(s.len())?;
        self.buf(s.as_bytes());
        Ok(())
    }

    /// Writes a UTF-8 string prefixed with its byte length as `u32`.
    pub fn str32(&mut self, s: &str) -> Result<(), BufferError> {
        let len = u32::try_from(s.len()).map_err(|_| BufferError::LengthOverflow {
            len: s.len(),
            limit: u32::MAX as usize,
        })?;
        self.u32(len);
        self.buf(s.as_bytes());
        Ok(())
    }
}
