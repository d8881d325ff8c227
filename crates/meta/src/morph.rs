//! Conversions between domain types and trees.
//!
//! ```
//! use meta_tree::{FromMeta, Meta, MetaError, Result, SealedMeta, ToMeta, Value};
//!
//! struct Endpoint {
//!     host: String,
//!     port: i64,
//! }
//!
//! impl ToMeta for Endpoint {
//!     fn to_meta(&self) -> SealedMeta {
//!         SealedMeta::from_parts(
//!             "endpoint",
//!             [
//!                 ("host".to_string(), Value::from(self.host.as_str())),
//!                 ("port".to_string(), Value::from(self.port)),
//!             ],
//!             [],
//!         )
//!     }
//! }
//!
//! impl FromMeta for Endpoint {
//!     fn from_meta(meta: &dyn Meta) -> Result<Self> {
//!         Ok(Endpoint {
//!             host: meta.get_value("host")?.to_string(),
//!             port: meta
//!                 .get_value("port")?
//!                 .as_i64()
//!                 .ok_or_else(|| MetaError::Parse("port is not an integer".into()))?,
//!         })
//!     }
//! }
//!
//! let meta = Endpoint { host: "localhost".into(), port: 80 }.to_meta();
//! let back = Endpoint::from_meta(&meta).unwrap();
//! assert_eq!((back.host.as_str(), back.port), ("localhost", 80));
//! ```

use crate::error::Result;
use crate::json::JsonFormat;
use crate::laminate::Laminate;
use crate::meta::Meta;
use crate::sealed::SealedMeta;
use crate::tree::MetaTree;

pub trait ToMeta {
    fn to_meta(&self) -> SealedMeta;
}

pub trait FromMeta: Sized {
    fn from_meta(meta: &dyn Meta) -> Result<Self>;
}

impl ToMeta for SealedMeta {
    fn to_meta(&self) -> SealedMeta {
        self.clone()
    }
}

impl ToMeta for MetaTree {
    fn to_meta(&self) -> SealedMeta {
        self.seal()
    }
}

impl ToMeta for Laminate {
    fn to_meta(&self) -> SealedMeta {
        self.seal()
    }
}

impl FromMeta for SealedMeta {
    fn from_meta(meta: &dyn Meta) -> Result<Self> {
        Ok(meta.seal())
    }
}

impl FromMeta for MetaTree {
    fn from_meta(meta: &dyn Meta) -> Result<Self> {
        Ok(MetaTree::from_meta(meta))
    }
}

/// The JSON object of [`JsonFormat::to_json`]. The other direction is
/// fallible; use [`JsonFormat::from_json`].
impl FromMeta for serde_json::Value {
    fn from_meta(meta: &dyn Meta) -> Result<Self> {
        Ok(JsonFormat::new().to_json(meta))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meta_values::Value;
    use serde_json::json;

    #[test]
    fn test_json_from_meta() {
        let mut tree = MetaTree::new("r");
        tree.root_mut().set_value("a.b", 1).unwrap();
        let json = <serde_json::Value as FromMeta>::from_meta(&tree).unwrap();
        assert_eq!(json, json!({"a": {"b": 1}}));
    }

    #[test]
    fn test_tree_conversions() {
        let sealed = SealedMeta::from_parts("r", [("v".to_string(), Value::from(2))], []);
        let tree = <MetaTree as FromMeta>::from_meta(&sealed).unwrap();
        assert_eq!(tree.to_meta(), sealed);
        assert_eq!(<SealedMeta as FromMeta>::from_meta(&tree).unwrap(), sealed);
        assert_eq!(Laminate::new([sealed.clone()]).to_meta(), sealed);
    }
}
