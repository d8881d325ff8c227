use std::hash::{Hash, Hasher};

use indexmap::IndexMap;
use meta_names::is_hidden;
use meta_values::Value;

use crate::meta::{meta_eq, meta_hash, Meta, MetaRef};
use crate::tree::MetaTree;

/// A fully immutable, deep-copied tree.
///
/// Equality and hashing are structural: map order is ignored, the order of
/// nodes inside a group is not.
#[derive(Debug, Clone, Default)]
pub struct SealedMeta {
    name: String,
    values: IndexMap<String, Value>,
    nodes: IndexMap<String, Vec<SealedMeta>>,
}

impl SealedMeta {
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Builds a node from parts, dropping `Null` values and empty groups.
    pub fn from_parts(
        name: impl Into<String>,
        values: impl IntoIterator<Item = (String, Value)>,
        nodes: impl IntoIterator<Item = (String, Vec<SealedMeta>)>,
    ) -> Self {
        Self {
            name: name.into(),
            values: values
                .into_iter()
                .map(|(n, v)| (n, v.normalize()))
                .filter(|(_, v)| !v.is_null())
                .collect(),
            nodes: nodes.into_iter().filter(|(_, g)| !g.is_empty()).collect(),
        }
    }

    /// Deep copy of any tree.
    pub fn from_meta<M: Meta + ?Sized>(meta: &M) -> Self {
        let values = meta
            .value_names(true)
            .into_iter()
            .filter_map(|n| meta.local_value(n).map(|v| (n.to_string(), v.clone())));
        let nodes = meta.node_names(true).into_iter().map(|n| {
            let group = meta
                .local_nodes(n)
                .iter()
                .map(|child| SealedMeta::from_meta(child))
                .collect();
            (n.to_string(), group)
        });
        Self::from_parts(meta.name(), values, nodes)
    }

    /// Starts a mutable tree to build in place; call [`MetaTree::seal`]
    /// when done.
    pub fn builder(name: impl Into<String>) -> MetaTree {
        MetaTree::new(name)
    }

    /// Copy of this node under another name.
    pub fn with_name(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: self.values.clone(),
            nodes: self.nodes.clone(),
        }
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// The group under `name`, empty if absent.
    pub fn nodes(&self, name: &str) -> &[SealedMeta] {
        self.nodes.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn value_keys(&self, include_hidden: bool) -> Vec<&str> {
        visible(self.values.keys(), include_hidden)
    }

    pub(crate) fn node_keys(&self, include_hidden: bool) -> Vec<&str> {
        visible(self.nodes.keys(), include_hidden)
    }
}

pub(crate) fn visible<'a>(
    keys: impl Iterator<Item = &'a String>,
    include_hidden: bool,
) -> Vec<&'a str> {
    keys.map(String::as_str)
        .filter(|k| include_hidden || !is_hidden(k))
        .collect()
}

impl Meta for SealedMeta {
    fn name(&self) -> &str {
        &self.name
    }

    fn value_names(&self, include_hidden: bool) -> Vec<&str> {
        self.value_keys(include_hidden)
    }

    fn node_names(&self, include_hidden: bool) -> Vec<&str> {
        self.node_keys(include_hidden)
    }

    fn local_value(&self, name: &str) -> Option<&Value> {
        self.value(name)
    }

    fn local_nodes(&self, name: &str) -> Vec<MetaRef<'_>> {
        self.nodes(name).iter().map(MetaRef::Sealed).collect()
    }
}

impl PartialEq for SealedMeta {
    fn eq(&self, other: &Self) -> bool {
        meta_eq(self, other)
    }
}

impl Eq for SealedMeta {}

impl Hash for SealedMeta {
    fn hash<H: Hasher>(&self, state: &mut H) {
        meta_hash(self, state);
    }
}
