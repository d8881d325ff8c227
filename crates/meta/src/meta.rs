//! The read contract shared by every tree representation.
//!
//! Paths are resolved token by token. Each intermediate token selects a
//! group, applies its query and continues from the first match; the last
//! token selects a value or a whole group. A bare token selects the whole
//! group, `name[i]` one element, and `name[k=v]` every element whose own
//! value `k` equals `v`. Each query is a linear scan over the group.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use meta_names::{Name, NameToken, Predicate, Query};
use meta_values::{Number, Timestamp, Value};

use crate::error::{MetaError, Result};
use crate::sealed::SealedMeta;
use crate::tree::NodeRef;

/// Read access to a tree node.
///
/// Implementors supply local lookups; path resolution, typed getters and
/// sealing are provided on top of them.
pub trait Meta {
    fn name(&self) -> &str;

    /// Names of the values of this node. Names starting with `@` are
    /// listed only when `include_hidden` is set.
    fn value_names(&self, include_hidden: bool) -> Vec<&str>;

    fn node_names(&self, include_hidden: bool) -> Vec<&str>;

    fn local_value(&self, name: &str) -> Option<&Value>;

    /// The child group `name`, empty if absent.
    fn local_nodes(&self, name: &str) -> Vec<MetaRef<'_>>;

    /// Value at `path`, or `None` if any step is missing.
    fn opt_value(&self, path: &str) -> Result<Option<&Value>> {
        resolve_value(self, &Name::parse(path)?)
    }

    /// Value at `path`; a missing value is [`MetaError::PathNotFound`].
    fn get_value(&self, path: &str) -> Result<&Value> {
        self.opt_value(path)?
            .ok_or_else(|| MetaError::PathNotFound(path.to_string()))
    }

    /// All nodes selected by `path`.
    fn meta_list(&self, path: &str) -> Result<Vec<MetaRef<'_>>> {
        resolve_nodes(self, &Name::parse(path)?)
    }

    /// The first node selected by `path`.
    fn opt_meta(&self, path: &str) -> Result<Option<MetaRef<'_>>> {
        Ok(self.meta_list(path)?.into_iter().next())
    }

    fn get_meta(&self, path: &str) -> Result<MetaRef<'_>> {
        self.opt_meta(path)?
            .ok_or_else(|| MetaError::PathNotFound(path.to_string()))
    }

    fn has_value(&self, path: &str) -> Result<bool> {
        Ok(self.opt_value(path)?.is_some())
    }

    fn has_meta(&self, path: &str) -> Result<bool> {
        Ok(!self.meta_list(path)?.is_empty())
    }

    fn opt_string(&self, path: &str) -> Result<Option<&str>> {
        Ok(self.opt_value(path)?.and_then(Value::as_str))
    }

    fn opt_boolean(&self, path: &str) -> Result<Option<bool>> {
        Ok(self.opt_value(path)?.and_then(Value::as_bool))
    }

    fn opt_number(&self, path: &str) -> Result<Option<Number>> {
        Ok(self.opt_value(path)?.and_then(Value::as_number))
    }

    fn opt_timestamp(&self, path: &str) -> Result<Option<Timestamp>> {
        Ok(self.opt_value(path)?.and_then(Value::as_timestamp))
    }

    /// The value at `path` rendered as text, or `default`.
    fn string_or(&self, path: &str, default: &str) -> Result<String> {
        Ok(self
            .opt_value(path)?
            .map_or_else(|| default.to_string(), Value::to_string))
    }

    /// `true` if the node has neither values nor groups, hidden included.
    fn is_empty(&self) -> bool {
        self.value_names(true).is_empty() && self.node_names(true).is_empty()
    }

    fn seal(&self) -> SealedMeta {
        SealedMeta::from_meta(self)
    }

    /// Every visible value of the subtree, depth first, keyed by its path
    /// from this node. Sole members of a group appear unindexed.
    fn value_stream(&self) -> Vec<(Name, &Value)> {
        let mut out = Vec::new();
        collect_values(Cursor::Start(self), &Name::empty(), &mut out);
        out
    }

    /// Every visible descendant node, depth first, keyed by its path.
    fn node_stream(&self) -> Vec<(Name, MetaRef<'_>)> {
        let mut out = Vec::new();
        collect_nodes(Cursor::Start(self), &Name::empty(), &mut out);
        out
    }
}

impl<T: Meta + ?Sized> Meta for &T {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn value_names(&self, include_hidden: bool) -> Vec<&str> {
        (**self).value_names(include_hidden)
    }

    fn node_names(&self, include_hidden: bool) -> Vec<&str> {
        (**self).node_names(include_hidden)
    }

    fn local_value(&self, name: &str) -> Option<&Value> {
        (**self).local_value(name)
    }

    fn local_nodes(&self, name: &str) -> Vec<MetaRef<'_>> {
        (**self).local_nodes(name)
    }
}

/// A borrowed view of a node in either a sealed tree or a [`MetaTree`].
///
/// The inherent methods keep the lifetime of the underlying storage, so a
/// `MetaRef` can be navigated further without borrowing the view itself.
///
/// [`MetaTree`]: crate::MetaTree
#[derive(Debug, Clone, Copy)]
pub enum MetaRef<'a> {
    Sealed(&'a SealedMeta),
    Node(NodeRef<'a>),
}

impl<'a> MetaRef<'a> {
    pub fn name(self) -> &'a str {
        match self {
            MetaRef::Sealed(s) => s.name(),
            MetaRef::Node(n) => n.name(),
        }
    }

    pub fn value(self, name: &str) -> Option<&'a Value> {
        match self {
            MetaRef::Sealed(s) => s.value(name),
            MetaRef::Node(n) => n.value(name),
        }
    }

    pub fn nodes(self, name: &str) -> Vec<MetaRef<'a>> {
        match self {
            MetaRef::Sealed(s) => s.nodes(name).iter().map(MetaRef::Sealed).collect(),
            MetaRef::Node(n) => n.nodes(name),
        }
    }

    pub fn value_names(self, include_hidden: bool) -> Vec<&'a str> {
        match self {
            MetaRef::Sealed(s) => s.value_keys(include_hidden),
            MetaRef::Node(n) => n.value_names(include_hidden),
        }
    }

    pub fn node_names(self, include_hidden: bool) -> Vec<&'a str> {
        match self {
            MetaRef::Sealed(s) => s.node_keys(include_hidden),
            MetaRef::Node(n) => n.node_names(include_hidden),
        }
    }

    /// The arena node behind this view, if any.
    pub fn as_node(self) -> Option<NodeRef<'a>> {
        match self {
            MetaRef::Node(n) => Some(n),
            MetaRef::Sealed(_) => None,
        }
    }
}

impl Meta for MetaRef<'_> {
    fn name(&self) -> &str {
        MetaRef::name(*self)
    }

    fn value_names(&self, include_hidden: bool) -> Vec<&str> {
        MetaRef::value_names(*self, include_hidden)
    }

    fn node_names(&self, include_hidden: bool) -> Vec<&str> {
        MetaRef::node_names(*self, include_hidden)
    }

    fn local_value(&self, name: &str) -> Option<&Value> {
        MetaRef::value(*self, name)
    }

    fn local_nodes(&self, name: &str) -> Vec<MetaRef<'_>> {
        MetaRef::nodes(*self, name)
    }
}

impl PartialEq for MetaRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        meta_eq(self, other)
    }
}

/// Resolution position: the node resolution started from, or a node
/// reached through it.
enum Cursor<'a, M: ?Sized> {
    Start(&'a M),
    At(MetaRef<'a>),
}

impl<'a, M: Meta + ?Sized> Cursor<'a, M> {
    fn nodes(&self, name: &str) -> Vec<MetaRef<'a>> {
        match *self {
            Cursor::Start(m) => m.local_nodes(name),
            Cursor::At(r) => r.nodes(name),
        }
    }

    fn value(&self, name: &str) -> Option<&'a Value> {
        match *self {
            Cursor::Start(m) => m.local_value(name),
            Cursor::At(r) => r.value(name),
        }
    }

    fn value_names(&self) -> Vec<&'a str> {
        match *self {
            Cursor::Start(m) => m.value_names(false),
            Cursor::At(r) => r.value_names(false),
        }
    }

    fn node_names(&self) -> Vec<&'a str> {
        match *self {
            Cursor::Start(m) => m.node_names(false),
            Cursor::At(r) => r.node_names(false),
        }
    }
}

/// `true` if every predicate names a local value equal to its literal.
///
/// The literal is compared both as a parsed value and as text, so `2`
/// matches the integer 2 and `a` matches the string "a".
pub(crate) fn matches_predicates(node: MetaRef<'_>, predicates: &[Predicate]) -> bool {
    predicates.iter().all(|p| match node.value(&p.key) {
        Some(v) => *v == Value::parse(&p.value) || v.to_string() == p.value,
        None => false,
    })
}

/// Applies a token query to a group. A missing group selects nothing.
pub(crate) fn select<'a>(
    candidates: Vec<MetaRef<'a>>,
    query: Option<&Query>,
    path: &Name,
) -> Result<Vec<MetaRef<'a>>> {
    match query {
        None => Ok(candidates),
        Some(_) if candidates.is_empty() => Ok(candidates),
        Some(Query::Index(index)) => match candidates.get(*index) {
            Some(m) => Ok(vec![*m]),
            None => Err(MetaError::IndexOutOfRange {
                path: path.to_string(),
                index: *index,
                len: candidates.len(),
            }),
        },
        Some(Query::Filter(predicates)) => Ok(candidates
            .into_iter()
            .filter(|m| matches_predicates(*m, predicates))
            .collect()),
    }
}

/// Walks every token but the last; `None` if an intermediate step is empty.
fn navigate<'a, M: Meta + ?Sized>(start: &'a M, path: &Name) -> Result<Option<Cursor<'a, M>>> {
    let mut cursor = Cursor::Start(start);
    let tokens = path.tokens();
    for token in &tokens[..tokens.len().saturating_sub(1)] {
        let found = select(cursor.nodes(&token.entry), token.query.as_ref(), path)?;
        match found.first() {
            Some(m) => cursor = Cursor::At(*m),
            None => return Ok(None),
        }
    }
    Ok(Some(cursor))
}

/// Resolves `path` to the nodes it selects.
pub fn resolve_nodes<'a, M: Meta + ?Sized>(start: &'a M, path: &Name) -> Result<Vec<MetaRef<'a>>> {
    let Some(last) = path.last_token() else {
        return Ok(Vec::new());
    };
    let Some(cursor) = navigate(start, path)? else {
        return Ok(Vec::new());
    };
    select(cursor.nodes(&last.entry), last.query.as_ref(), path)
}

/// Resolves `path` to a value. An index on the last token selects an
/// element of a list value; a filter on it never matches.
pub fn resolve_value<'a, M: Meta + ?Sized>(start: &'a M, path: &Name) -> Result<Option<&'a Value>> {
    let Some(last) = path.last_token() else {
        return Ok(None);
    };
    let Some(cursor) = navigate(start, path)? else {
        return Ok(None);
    };
    let Some(value) = cursor.value(&last.entry) else {
        return Ok(None);
    };
    match &last.query {
        None => Ok(Some(value)),
        Some(Query::Index(index)) => {
            let out_of_range = |len| MetaError::IndexOutOfRange {
                path: path.to_string(),
                index: *index,
                len,
            };
            match value {
                Value::List(items) => items
                    .get(*index)
                    .map(Some)
                    .ok_or_else(|| out_of_range(items.len())),
                scalar if *index == 0 => Ok(Some(scalar)),
                _ => Err(out_of_range(1)),
            }
        }
        Some(Query::Filter(_)) => Ok(None),
    }
}

/// Path token for element `index` of a group of `len`.
pub(crate) fn qualified_token(entry: &str, index: usize, len: usize) -> NameToken {
    if len > 1 {
        NameToken::with_index(entry, index)
    } else {
        NameToken::new(entry)
    }
}

fn collect_values<'a, M: Meta + ?Sized>(
    cursor: Cursor<'a, M>,
    prefix: &Name,
    out: &mut Vec<(Name, &'a Value)>,
) {
    for name in cursor.value_names() {
        if let Some(value) = cursor.value(name) {
            out.push((prefix.plus_token(NameToken::new(name)), value));
        }
    }
    for group in cursor.node_names() {
        let nodes = cursor.nodes(group);
        let len = nodes.len();
        for (i, node) in nodes.into_iter().enumerate() {
            let path = prefix.plus_token(qualified_token(group, i, len));
            collect_values(Cursor::<M>::At(node), &path, out);
        }
    }
}

fn collect_nodes<'a, M: Meta + ?Sized>(
    cursor: Cursor<'a, M>,
    prefix: &Name,
    out: &mut Vec<(Name, MetaRef<'a>)>,
) {
    for group in cursor.node_names() {
        let nodes = cursor.nodes(group);
        let len = nodes.len();
        for (i, node) in nodes.into_iter().enumerate() {
            let path = prefix.plus_token(qualified_token(group, i, len));
            out.push((path.clone(), node));
            collect_nodes(Cursor::<M>::At(node), &path, out);
        }
    }
}

/// Structural equality: names, value maps and groups, ignoring map order
/// but not the order inside a group.
pub fn meta_eq<A: Meta + ?Sized, B: Meta + ?Sized>(a: &A, b: &B) -> bool {
    if a.name() != b.name() {
        return false;
    }
    let values = a.value_names(true);
    if values.len() != b.value_names(true).len()
        || values.iter().any(|n| a.local_value(n) != b.local_value(n))
    {
        return false;
    }
    let groups = a.node_names(true);
    if groups.len() != b.node_names(true).len() {
        return false;
    }
    groups.iter().all(|n| {
        let left = a.local_nodes(n);
        let right = b.local_nodes(n);
        left.len() == right.len() && left.iter().zip(&right).all(|(x, y)| meta_eq(x, y))
    })
}

/// Hash consistent with [`meta_eq`]. Map entries are hashed separately and
/// combined with a commutative sum.
pub fn meta_hash<M: Meta + ?Sized, H: Hasher>(meta: &M, state: &mut H) {
    meta.name().hash(state);
    let mut values = 0u64;
    for name in meta.value_names(true) {
        let mut h = DefaultHasher::new();
        name.hash(&mut h);
        meta.local_value(name).hash(&mut h);
        values = values.wrapping_add(h.finish());
    }
    state.write_u64(values);
    let mut groups = 0u64;
    for name in meta.node_names(true) {
        let mut h = DefaultHasher::new();
        name.hash(&mut h);
        for child in meta.local_nodes(name) {
            meta_hash(&child, &mut h);
        }
        groups = groups.wrapping_add(h.finish());
    }
    state.write_u64(groups);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(letter: &str, gain: i32) -> SealedMeta {
        SealedMeta::from_parts(
            "channel",
            [
                ("letter".to_string(), Value::from(letter)),
                ("gain".to_string(), Value::from(gain)),
            ],
            [],
        )
    }

    fn device() -> SealedMeta {
        let inner = SealedMeta::from_parts("inner", [("deep".to_string(), Value::from(true))], []);
        let a = SealedMeta::from_parts(
            "channel",
            [
                ("letter".to_string(), Value::from("a")),
                ("gain".to_string(), Value::from(1)),
            ],
            [("inner".to_string(), vec![inner])],
        );
        SealedMeta::from_parts(
            "device",
            [
                ("id".to_string(), Value::from(7)),
                ("@hidden".to_string(), Value::from("h")),
                (
                    "tags".to_string(),
                    Value::list([Value::from("x"), Value::from("y")]),
                ),
            ],
            [(
                "channel".to_string(),
                vec![a, channel("b", 2), channel("c", 2)],
            )],
        )
    }

    #[test]
    fn test_filter_query() {
        let d = device();
        let found = d.meta_list("channel[letter=b]").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].value("gain"), Some(&Value::from(2)));
        assert_eq!(d.meta_list("channel[gain=2]").unwrap().len(), 2);
        assert_eq!(d.meta_list("channel[gain=2, letter=c]").unwrap().len(), 1);
        assert!(d.meta_list("channel[missing=1]").unwrap().is_empty());
    }

    #[test]
    fn test_index_query() {
        let d = device();
        assert_eq!(d.get_value("channel[2].letter").unwrap(), &Value::from("c"));
        assert_eq!(d.get_value("channel.letter").unwrap(), &Value::from("a"));
        assert!(matches!(
            d.opt_value("channel[5].letter"),
            Err(MetaError::IndexOutOfRange { index: 5, len: 3, .. })
        ));
        assert_eq!(d.opt_meta("nothing[3]").unwrap(), None);
    }

    #[test]
    fn test_deep_navigation() {
        let d = device();
        assert_eq!(d.opt_boolean("channel.inner.deep").unwrap(), Some(true));
        assert_eq!(d.opt_boolean("channel[1].inner.deep").unwrap(), None);
        let inner = d.get_meta("channel[letter=a].inner").unwrap();
        assert_eq!(inner.name(), "inner");
    }

    #[test]
    fn test_list_value_index() {
        let d = device();
        assert_eq!(d.get_value("tags[1]").unwrap(), &Value::from("y"));
        assert_eq!(d.get_value("id[0]").unwrap(), &Value::from(7));
        assert!(d.opt_value("tags[2]").is_err());
    }

    #[test]
    fn test_missing_and_syntax_errors() {
        let d = device();
        assert!(matches!(d.get_value("nope"), Err(MetaError::PathNotFound(p)) if p == "nope"));
        assert!(matches!(d.opt_value("a..b"), Err(MetaError::InvalidPathSyntax(_))));
        assert_eq!(d.opt_value("").unwrap(), None);
        assert_eq!(d.string_or("nope", "dflt").unwrap(), "dflt");
        assert_eq!(d.string_or("id", "dflt").unwrap(), "7");
    }

    #[test]
    fn test_hidden_names() {
        let d = device();
        assert!(!d.value_names(false).contains(&"@hidden"));
        assert!(d.value_names(true).contains(&"@hidden"));
        assert_eq!(d.opt_string("@hidden").unwrap(), Some("h"));
    }

    #[test]
    fn test_value_stream_paths() {
        let d = device();
        let paths: Vec<String> = d.value_stream().iter().map(|(n, _)| n.to_string()).collect();
        assert_eq!(
            paths,
            [
                "id",
                "tags",
                "channel[0].letter",
                "channel[0].gain",
                "channel[0].inner.deep",
                "channel[1].letter",
                "channel[1].gain",
                "channel[2].letter",
                "channel[2].gain",
            ]
        );
        let nodes: Vec<String> = d.node_stream().iter().map(|(n, _)| n.to_string()).collect();
        assert_eq!(nodes, ["channel[0]", "channel[0].inner", "channel[1]", "channel[2]"]);
    }

    #[test]
    fn test_meta_ref_equality() {
        let d = device();
        let a = d.get_meta("channel[1]").unwrap();
        let b = channel("b", 2);
        assert!(meta_eq(&a, &b));
        assert_eq!(a, MetaRef::Sealed(&b));
    }
}
