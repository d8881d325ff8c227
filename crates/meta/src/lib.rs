//! Hierarchical metadata trees.
//!
//! A tree node holds named [`Value`]s and named groups of child nodes.
//! Three representations share the [`Meta`] read contract:
//!
//! - [`SealedMeta`], an immutable deep copy with structural equality;
//! - [`MetaTree`], an arena of mutable nodes that report their changes to
//!   listeners, wrapped by [`Configuration`] for whole-tree observation;
//! - [`Laminate`], a read-only stack of layers.
//!
//! Trees are addressed with dotted paths (`device.channel[letter=a].gain`),
//! merged with [`MergeRule`]s, filled in from `${path|default}`
//! placeholders with [`substitute_values`], and streamed with
//! [`BinaryCodec`] or [`JsonFormat`].
//!
//! ```
//! use meta_tree::{merge_join, Meta, MetaTree, Value};
//!
//! let mut a = MetaTree::new("a");
//! a.root_mut().set_value("tags", "red").unwrap();
//! let mut b = MetaTree::new("b");
//! b.root_mut().set_value("tags", "blue").unwrap();
//!
//! let merged = merge_join(&a, &b);
//! assert_eq!(merged.get_value("tags").unwrap(), &Value::list(["red".into(), "blue".into()]));
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod events;
pub mod json;
pub mod laminate;
pub mod merge;
pub mod meta;
pub mod morph;
pub mod sealed;
pub mod substitute;
pub mod tree;

pub use codec::{deserialize, serialize, BinaryCodec, CodecConfig, MetaReader, MetaWriter};
pub use config::Configuration;
pub use error::{MetaError, Result};
pub use events::{ChangeEvent, ListenerId};
pub use json::JsonFormat;
pub use laminate::Laminate;
pub use merge::{
    merge_all, merge_join, merge_replace, rule_for, CustomRule, FnRule, JoinRule, MergeRule,
    ReplaceRule, MERGE_RULE_KEY,
};
pub use meta::{meta_eq, meta_hash, resolve_nodes, resolve_value, Meta, MetaRef};
pub use morph::{FromMeta, ToMeta};
pub use sealed::SealedMeta;
pub use substitute::{substitute_values, transform_value};
pub use tree::{MetaTree, NodeId, NodeMut, NodeRef};

pub use meta_names::{Name, NameError, NameToken, Predicate, Query};
pub use meta_values::{Decimal, Number, Timestamp, Value, ValueType};
