//! Binary buffer primitives for the meta tree wire format.
//!
//! The codec writes every multi-byte quantity big-endian and prefixes every
//! string with its UTF-8 byte length. [`Writer`] accumulates bytes,
//! [`Reader`] consumes them and reports truncation instead of panicking.
//!
//! # Example
//!
//! ```
//! use meta_buffers::{Reader, Writer};
//!
//! let mut writer = Writer::new();
//! writer.u16(2);
//! writer.str16("id").unwrap();
//! let bytes = writer.flush();
//!
//! let mut reader = Reader::new(&bytes);
//! assert_eq!(reader.u16().unwrap(), 2);
//! assert_eq!(reader.str16().unwrap(), "id");
//! assert!(reader.is_empty());
//! ```

use thiserror::Error;

mod reader;
mod writer;

pub use reader::Reader;
pub use writer::Writer;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BufferError {
    #[error("unexpected end of buffer: needed {needed} bytes at offset {offset}")]
    EndOfBuffer { offset: usize, needed: usize },
    #[error("invalid UTF-8 at offset {0}")]
    InvalidUtf8(usize),
    #[error("length {len} exceeds the {limit}-byte prefix limit")]
    LengthOverflow { len: usize, limit: usize },
}
