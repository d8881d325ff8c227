//! Compact binary encoding of trees.
//!
//! ```text
//! node        = [name] u16 value-count value* u16 group-count group*
//! name        = u16 byte-length utf8
//! value       = name tag payload
//! group       = name u16 size node*        members omit their name
//! ```
//!
//! All integers are big-endian. Value tags:
//!
//! | tag | payload |
//! |-----|---------|
//! | `0` | none (null) |
//! | `+` / `-` | none (true / false) |
//! | `I` | i32 |
//! | `L` | i64 |
//! | `D` | f64 |
//! | `N` | u16 byte count, two's complement unscaled bytes, i32 scale |
//! | `S` | u32 byte length, utf8 |
//! | `T` | i64 seconds, i64 nanos |
//! | `*` | u16 count, values without names |
//!
//! There is no header, version or checksum; wrap the bytes if you need any.

use std::io::{Read, Write};

use meta_buffers::{Reader, Writer};
use meta_values::{Decimal, Number, Timestamp, Value};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MetaError, Result};
use crate::meta::Meta;
use crate::sealed::SealedMeta;

const TAG_NULL: u8 = b'0';
const TAG_TRUE: u8 = b'+';
const TAG_FALSE: u8 = b'-';
const TAG_INT: u8 = b'I';
const TAG_LONG: u8 = b'L';
const TAG_DOUBLE: u8 = b'D';
const TAG_DECIMAL: u8 = b'N';
const TAG_STRING: u8 = b'S';
const TAG_TIMESTAMP: u8 = b'T';
const TAG_LIST: u8 = b'*';

const NANOS_PER_SECOND: i64 = 1_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Write the root name. When off, the reader supplies it.
    pub include_root_name: bool,
    /// Deepest node level accepted on either side.
    pub max_depth: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            include_root_name: true,
            max_depth: 512,
        }
    }
}

/// Reads a whole document from `input`: exactly `length` bytes when given,
/// otherwise up to end of stream.
pub trait MetaReader {
    fn read(&self, input: &mut dyn Read, length: Option<usize>) -> Result<SealedMeta>;
}

pub trait MetaWriter {
    fn write(&self, out: &mut dyn Write, meta: &dyn Meta) -> Result<()>;
}

pub(crate) fn read_input(input: &mut dyn Read, length: Option<usize>) -> Result<Vec<u8>> {
    match length {
        Some(len) => {
            let mut bytes = vec![0; len];
            input.read_exact(&mut bytes)?;
            Ok(bytes)
        }
        None => {
            let mut bytes = Vec::new();
            input.read_to_end(&mut bytes)?;
            Ok(bytes)
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BinaryCodec {
    config: CodecConfig,
}

fn u16_len(what: &'static str, len: usize) -> Result<u16> {
    u16::try_from(len).map_err(|_| MetaError::Oversized { what, len })
}

fn malformed(reader: &Reader<'_>, what: impl std::fmt::Display) -> MetaError {
    MetaError::MalformedStream(format!("{what} at offset {}", reader.position()))
}

impl BinaryCodec {
    pub fn new(config: CodecConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    pub fn encode(&self, meta: &dyn Meta) -> Result<Vec<u8>> {
        let mut writer = Writer::new();
        if self.config.include_root_name {
            self.write_name(&mut writer, meta.name())?;
        }
        self.write_node(&mut writer, meta, 0)?;
        let bytes = writer.flush();
        debug!(name = %meta.name(), bytes = bytes.len(), "encoded tree");
        Ok(bytes)
    }

    /// Decodes a stream written with the same configuration. Without a
    /// root name in the stream the root is left unnamed.
    pub fn decode(&self, bytes: &[u8]) -> Result<SealedMeta> {
        self.decode_with(bytes, None)
    }

    /// Decodes a stream whose root name is supplied out of band.
    pub fn decode_named(&self, bytes: &[u8], name: &str) -> Result<SealedMeta> {
        self.decode_with(bytes, Some(name))
    }

    fn decode_with(&self, bytes: &[u8], name: Option<&str>) -> Result<SealedMeta> {
        let mut reader = Reader::new(bytes);
        let stored = if self.config.include_root_name {
            Some(reader.str16()?)
        } else {
            None
        };
        let name = name.or(stored).unwrap_or_default();
        let meta = self.read_node(&mut reader, name, 0)?;
        if !reader.is_empty() {
            return Err(malformed(
                &reader,
                format_args!("{} trailing bytes", reader.remaining()),
            ));
        }
        debug!(name = %name, bytes = bytes.len(), "decoded tree");
        Ok(meta)
    }

    fn write_name(&self, writer: &mut Writer, name: &str) -> Result<()> {
        u16_len("name", name.len())?;
        writer.str16(name)?;
        Ok(())
    }

    fn write_node(&self, writer: &mut Writer, meta: &dyn Meta, depth: usize) -> Result<()> {
        if depth > self.config.max_depth {
            return Err(MetaError::DepthLimitExceeded(self.config.max_depth));
        }
        let values: Vec<(&str, Value)> = meta
            .value_names(true)
            .into_iter()
            .filter_map(|n| meta.local_value(n).map(|v| (n, v.clone().normalize())))
            .filter(|(_, v)| !v.is_null())
            .collect();
        writer.u16(u16_len("value count", values.len())?);
        for (name, value) in &values {
            self.write_name(writer, name)?;
            write_value(writer, value)?;
        }

        let groups: Vec<_> = meta
            .node_names(true)
            .into_iter()
            .map(|n| (n, meta.local_nodes(n)))
            .filter(|(_, g)| !g.is_empty())
            .collect();
        writer.u16(u16_len("group count", groups.len())?);
        for (name, group) in groups {
            self.write_name(writer, name)?;
            writer.u16(u16_len("group size", group.len())?);
            for child in &group {
                self.write_node(writer, child, depth + 1)?;
            }
        }
        Ok(())
    }

    fn read_node(&self, reader: &mut Reader<'_>, name: &str, depth: usize) -> Result<SealedMeta> {
        if depth > self.config.max_depth {
            return Err(MetaError::DepthLimitExceeded(self.config.max_depth));
        }
        let value_count = reader.u16()?;
        let mut values = Vec::with_capacity(value_count as usize);
        for _ in 0..value_count {
            let key = reader.str16()?;
            values.push((key.to_string(), read_value(reader, true)?));
        }
        let group_count = reader.u16()?;
        let mut groups = Vec::with_capacity(group_count as usize);
        for _ in 0..group_count {
            let key = reader.str16()?;
            let size = reader.u16()?;
            let mut members = Vec::with_capacity(size as usize);
            for _ in 0..size {
                members.push(self.read_node(reader, key, depth + 1)?);
            }
            groups.push((key.to_string(), members));
        }
        Ok(SealedMeta::from_parts(name, values, groups))
    }
}

fn write_value(writer: &mut Writer, value: &Value) -> Result<()> {
    match value {
        Value::Null => writer.u8(TAG_NULL),
        Value::Boolean(true) => writer.u8(TAG_TRUE),
        Value::Boolean(false) => writer.u8(TAG_FALSE),
        Value::Number(Number::Integer(n)) => match i32::try_from(*n) {
            Ok(small) => {
                writer.u8(TAG_INT);
                writer.i32(small);
            }
            Err(_) => {
                writer.u8(TAG_LONG);
                writer.i64(*n);
            }
        },
        Value::Number(Number::Float(f)) => {
            writer.u8(TAG_DOUBLE);
            writer.f64(*f);
        }
        Value::Number(Number::Decimal(d)) => {
            let bytes = d.unscaled_bytes();
            writer.u8(TAG_DECIMAL);
            writer.u16(u16_len("decimal", bytes.len())?);
            writer.buf(&bytes);
            writer.i32(d.scale);
        }
        Value::String(s) => {
            writer.u8(TAG_STRING);
            writer.str32(s)?;
        }
        Value::Timestamp(t) => {
            writer.u8(TAG_TIMESTAMP);
            writer.i64(t.seconds());
            writer.i64(i64::from(t.nanos()));
        }
        Value::List(items) => {
            writer.u8(TAG_LIST);
            writer.u16(u16_len("list", items.len())?);
            for item in items {
                write_value(writer, item)?;
            }
        }
    }
    Ok(())
}

/// Reads one tagged value; lists only at the top level of a value.
fn read_value(reader: &mut Reader<'_>, allow_list: bool) -> Result<Value> {
    let tag = reader.u8()?;
    let value = match tag {
        TAG_NULL => Value::Null,
        TAG_TRUE => Value::Boolean(true),
        TAG_FALSE => Value::Boolean(false),
        TAG_INT => Value::from(reader.i32()?),
        TAG_LONG => Value::from(reader.i64()?),
        TAG_DOUBLE => Value::from(reader.f64()?),
        TAG_DECIMAL => {
            let len = reader.u16()? as usize;
            let bytes = reader.buf(len)?;
            let scale = reader.i32()?;
            let decimal = Decimal::from_unscaled_bytes(bytes, scale)
                .ok_or_else(|| malformed(reader, format_args!("bad decimal of {len} bytes")))?;
            Value::from(decimal)
        }
        TAG_STRING => Value::from(reader.str32()?),
        TAG_TIMESTAMP => {
            let seconds = reader.i64()?;
            let nanos = reader.i64()?;
            if !(0..NANOS_PER_SECOND).contains(&nanos) {
                return Err(malformed(reader, format_args!("nanos {nanos} out of range")));
            }
            Value::from(Timestamp::new(seconds, nanos as u32))
        }
        TAG_LIST if allow_list => {
            let count = reader.u16()?;
            let mut items = Vec::with_capacity(count as usize);
            for _ in 0..count {
                items.push(read_value(reader, false)?);
            }
            Value::list(items)
        }
        other => {
            return Err(malformed(reader, format_args!("unknown type tag 0x{other:02x}")));
        }
    };
    Ok(value)
}

impl MetaReader for BinaryCodec {
    fn read(&self, input: &mut dyn Read, length: Option<usize>) -> Result<SealedMeta> {
        self.decode(&read_input(input, length)?)
    }
}

impl MetaWriter for BinaryCodec {
    fn write(&self, out: &mut dyn Write, meta: &dyn Meta) -> Result<()> {
        out.write_all(&self.encode(meta)?)?;
        Ok(())
    }
}

/// Encodes with the default configuration.
pub fn serialize(meta: &dyn Meta) -> Result<Vec<u8>> {
    BinaryCodec::default().encode(meta)
}

pub fn deserialize(bytes: &[u8]) -> Result<SealedMeta> {
    BinaryCodec::default().decode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::MetaTree;

    fn sample() -> SealedMeta {
        let mut tree = MetaTree::new("device");
        let mut root = tree.root_mut();
        root.set_value("id", 7).unwrap();
        root.set_value("big", i64::MAX).unwrap();
        root.set_value("ratio", 0.25).unwrap();
        root.set_value("price", "12.50".parse::<Decimal>().unwrap()).unwrap();
        root.set_value("at", Timestamp::new(1_700_000_000, 5)).unwrap();
        root.set_value("on", true).unwrap();
        root.set_value("@hidden", "h").unwrap();
        root.put_values("tags", ["a", "b"]).unwrap();
        for letter in ["x", "y"] {
            let mut ch = MetaTree::new("channel");
            ch.root_mut().set_value("letter", letter).unwrap();
            root.put_node(&ch).unwrap();
        }
        tree.seal()
    }

    #[test]
    fn test_round_trip() {
        let meta = sample();
        let bytes = serialize(&meta).unwrap();
        assert_eq!(deserialize(&bytes).unwrap(), meta);
    }

    #[test]
    fn test_empty_tree_layout() {
        let bytes = serialize(&SealedMeta::empty("r")).unwrap();
        assert_eq!(bytes, [0, 1, b'r', 0, 0, 0, 0]);
    }

    #[test]
    fn test_small_integers_use_int_tag() {
        let meta = SealedMeta::from_parts("", [("n".to_string(), Value::from(1))], []);
        let bytes = serialize(&meta).unwrap();
        assert_eq!(bytes, [0, 0, 0, 1, 0, 1, b'n', b'I', 0, 0, 0, 1, 0, 0]);
    }

    #[test]
    fn test_truncated_and_trailing() {
        let bytes = serialize(&sample()).unwrap();
        for cut in [1, bytes.len() / 2, bytes.len() - 1] {
            assert!(matches!(
                deserialize(&bytes[..cut]),
                Err(MetaError::MalformedStream(_))
            ));
        }
        let mut longer = bytes.clone();
        longer.push(0);
        assert!(matches!(deserialize(&longer), Err(MetaError::MalformedStream(_))));
    }

    #[test]
    fn test_unknown_tag() {
        let bytes = [0, 0, 0, 1, 0, 1, b'n', b'?', 0, 0];
        let err = deserialize(&bytes).unwrap_err();
        assert!(err.to_string().contains("unknown type tag 0x3f"));
    }

    #[test]
    fn test_out_of_band_name() {
        let codec = BinaryCodec::new(CodecConfig {
            include_root_name: false,
            ..CodecConfig::default()
        });
        let bytes = codec.encode(&sample()).unwrap();
        assert_eq!(codec.decode_named(&bytes, "device").unwrap(), sample());
        assert_eq!(codec.decode(&bytes).unwrap().name(), "");
    }

    #[test]
    fn test_depth_limit() {
        let mut tree = MetaTree::new("r");
        tree.root_mut().set_value("a.b.c.d", 1).unwrap();
        let codec = BinaryCodec::new(CodecConfig {
            max_depth: 2,
            ..CodecConfig::default()
        });
        assert!(matches!(
            codec.encode(&tree),
            Err(MetaError::DepthLimitExceeded(2))
        ));
        let bytes = serialize(&tree).unwrap();
        assert!(matches!(
            codec.decode(&bytes),
            Err(MetaError::DepthLimitExceeded(2))
        ));
    }

    #[test]
    fn test_oversized_name() {
        let long = "n".repeat(70_000);
        let meta = SealedMeta::from_parts("", [(long, Value::from(1))], []);
        assert!(matches!(
            serialize(&meta),
            Err(MetaError::Oversized { what: "name", len: 70_000 })
        ));
    }

    #[test]
    fn test_stream_adapters() {
        let codec = BinaryCodec::default();
        let mut out = Vec::new();
        codec.write(&mut out, &sample()).unwrap();
        let mut input = out.as_slice();
        let len = input.len();
        assert_eq!(codec.read(&mut input, Some(len)).unwrap(), sample());
        let mut short: &[u8] = &out[..3];
        assert!(matches!(codec.read(&mut short, Some(len)), Err(MetaError::Io(_))));
    }
}
