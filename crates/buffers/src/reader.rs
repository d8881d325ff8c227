//! Bounds-checked big-endian byte reader.

use std::str;

use crate::BufferError;

/// A cursor over a byte slice.
///
/// Every read checks the remaining length first and reports
/// [`BufferError::EndOfBuffer`] instead of panicking, so truncated input
/// surfaces as an error at the call site.
///
/// # Example
///
/// ```
/// use meta_buffers::Reader;
///
/// let data = [0x01, 0x02, 0x03];
/// let mut reader = Reader::new(&data);
///
/// assert_eq!(reader.u8().unwrap(), 0x01);
/// assert_eq!(reader.u16().unwrap(), 0x0203);
/// assert!(reader.u8().is_err());
/// ```
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    data: &'a [u8],
    x: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, x: 0 }
    }

    /// Current cursor offset from the start of the input.
    pub fn position(&self) -> usize {
        self.x
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.x
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], BufferError> {
        if self.remaining() < n {
            return Err(BufferError::EndOfBuffer {
                offset: self.x,
                needed: n,
            });
        }
        let bytes = &self.data[self.x..self.x + n];
        self.x += n;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], BufferError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Returns the next byte without advancing.
    pub fn peek(&self) -> Result<u8, BufferError> {
        self.data.get(self.x).copied().ok_or(BufferError::EndOfBuffer {
            offset: self.x,
            needed: 1,
        })
    }

    #[inline]
    pub fn u8(&mut self) -> Result<u8, BufferError> {
        Ok(self.array::<1>()?[0])
    }

    #[inline]
    pub fn u16(&mut self) -> Result<u16, BufferError> {
        self.array().map(u16::from_be_bytes)
    }

    #[inline]
    pub fn i16(&mut self) -> Result<i16, BufferError> {
        self.array().map(i16::from_be_bytes)
    }

    #[inline]
    pub fn u32(&mut self) -> Result<u32, BufferError> {
        self.array().map(u32::from_be_bytes)
    }

    #[inline]
    pub fn i32(&mut self) -> Result<i32, BufferError> {
        self.array().map(i32::from_be_bytes)
    }

    #[inline]
    pub fn i64(&mut self) -> Result<i64, BufferError> {
        self.array().map(i64::from_be_bytes)
    }

    #[inline]
    pub fn f64(&mut self) -> Result<f64, BufferError> {
        self.array().map(f64::from_be_bytes)
    }

    /// Returns the next `size` bytes and advances past them.
    pub fn buf(&mut self, size: usize) -> Result<&'a [u8], BufferError> {
        self.take(size)
    }

    /// Reads `size` bytes as UTF-8.
    pub fn utf8(&mut self, size: usize) -> Result<&'a str, BufferError> {
        let offset = self.x;
        let bytes = self.take(size)?;
        str::from_utf8(bytes).map_err(|_| BufferError::InvalidUtf8(offset))
    }

    /// Reads a string prefixed with a `u16` byte length.
    pub fn str16(&mut self) -> Result<&'a str, BufferError> {
        let len = self.u16()? as usize;
        self.utf8(len)
    }

    /// Reads a string prefixed with a `u32` byte length.
    pub fn str32(&mut self) -> Result<&'a str, BufferError> {
        let len = self.u32()? as usize;
        self.utf8(len)
    }
}
