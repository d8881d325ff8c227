//! Recursive merge of two trees.
//!
//! The fold visits the union of value names and the union of group names of
//! both sides, hidden names included. Values go through
//! [`MergeRule::merge_value`], with an absent side seen as `Null`. A group
//! holding exactly one node on both sides is merged recursively; any other
//! group shape is decided as a whole by [`MergeRule::merge_nodes`].

use std::collections::HashSet;
use std::fmt;

use meta_names::{Name, NameToken};
use meta_values::Value;
use tracing::debug;

use crate::meta::Meta;
use crate::sealed::SealedMeta;

pub trait MergeRule {
    fn merge_value(&self, path: &Name, main: &Value, secondary: &Value) -> Value;

    fn merge_nodes(
        &self,
        path: &Name,
        main: &[SealedMeta],
        secondary: &[SealedMeta],
    ) -> Vec<SealedMeta>;

    fn merge_name(&self, main: &str, _secondary: &str) -> String {
        main.to_string()
    }

    /// Merges `secondary` under `main` into a new detached tree.
    fn merge(&self, main: &dyn Meta, secondary: &dyn Meta) -> SealedMeta {
        debug!(main = %main.name(), secondary = %secondary.name(), "merging trees");
        merge_at(self, &Name::empty(), main, secondary)
    }
}

fn union<'a>(main: Vec<&'a str>, secondary: Vec<&'a str>) -> Vec<&'a str> {
    let mut seen: HashSet<&str> = main.iter().copied().collect();
    let mut out = main;
    for name in secondary {
        if seen.insert(name) {
            out.push(name);
        }
    }
    out
}

fn merge_at<R: MergeRule + ?Sized>(
    rule: &R,
    path: &Name,
    main: &dyn Meta,
    secondary: &dyn Meta,
) -> SealedMeta {
    let null = Value::Null;
    let values: Vec<(String, Value)> = union(main.value_names(true), secondary.value_names(true))
        .into_iter()
        .map(|name| {
            let m = main.local_value(name).unwrap_or(&null);
            let s = secondary.local_value(name).unwrap_or(&null);
            let merged = rule.merge_value(&path.plus_token(NameToken::new(name)), m, s);
            (name.to_string(), merged)
        })
        .collect();

    let groups: Vec<(String, Vec<SealedMeta>)> =
        union(main.node_names(true), secondary.node_names(true))
            .into_iter()
            .map(|name| {
                let child_path = path.plus_token(NameToken::new(name));
                let m = main.local_nodes(name);
                let s = secondary.local_nodes(name);
                let merged = if m.len() == 1 && s.len() == 1 {
                    vec![merge_at(rule, &child_path, &m[0], &s[0])]
                } else {
                    let m: Vec<SealedMeta> = m.iter().map(|n| n.seal()).collect();
                    let s: Vec<SealedMeta> = s.iter().map(|n| n.seal()).collect();
                    rule.merge_nodes(&child_path, &m, &s)
                };
                let merged = merged
                    .into_iter()
                    .map(|n| if n.name() == name { n } else { n.with_name(name) })
                    .collect();
                (name.to_string(), merged)
            })
            .collect();

    SealedMeta::from_parts(
        rule.merge_name(main.name(), secondary.name()),
        values,
        groups,
    )
}

/// Main wins; secondary fills what main lacks.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplaceRule;

impl MergeRule for ReplaceRule {
    fn merge_value(&self, _path: &Name, main: &Value, secondary: &Value) -> Value {
        if main.is_null() {
            secondary.clone()
        } else {
            main.clone()
        }
    }

    fn merge_nodes(
        &self,
        _path: &Name,
        main: &[SealedMeta],
        secondary: &[SealedMeta],
    ) -> Vec<SealedMeta> {
        if main.is_empty() {
            secondary.to_vec()
        } else {
            main.to_vec()
        }
    }
}

/// Concatenates values and groups, main first.
#[derive(Debug, Clone, Copy, Default)]
pub struct JoinRule;

impl MergeRule for JoinRule {
    fn merge_value(&self, _path: &Name, main: &Value, secondary: &Value) -> Value {
        main.clone().append(secondary.clone())
    }

    fn merge_nodes(
        &self,
        _path: &Name,
        main: &[SealedMeta],
        secondary: &[SealedMeta],
    ) -> Vec<SealedMeta> {
        main.iter().chain(secondary).cloned().collect()
    }
}

/// Joins the listed names and keeps main, as is, for every other name.
/// Names are matched against the last token of the merge path.
#[derive(Debug, Clone, Default)]
pub struct CustomRule {
    join_names: HashSet<String>,
}

impl CustomRule {
    pub fn new<I, S>(join_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            join_names: join_names.into_iter().map(Into::into).collect(),
        }
    }

    fn joins(&self, path: &Name) -> bool {
        path.last_token()
            .is_some_and(|t| self.join_names.contains(&t.entry))
    }
}

impl MergeRule for CustomRule {
    fn merge_value(&self, path: &Name, main: &Value, secondary: &Value) -> Value {
        if self.joins(path) {
            JoinRule.merge_value(path, main, secondary)
        } else {
            main.clone()
        }
    }

    fn merge_nodes(
        &self,
        path: &Name,
        main: &[SealedMeta],
        secondary: &[SealedMeta],
    ) -> Vec<SealedMeta> {
        if self.joins(path) {
            JoinRule.merge_nodes(path, main, secondary)
        } else {
            main.to_vec()
        }
    }
}

/// A rule built from two closures.
pub struct FnRule<V, N> {
    values: V,
    nodes: N,
}

impl<V, N> FnRule<V, N>
where
    V: Fn(&Name, &Value, &Value) -> Value,
    N: Fn(&Name, &[SealedMeta], &[SealedMeta]) -> Vec<SealedMeta>,
{
    pub fn new(values: V, nodes: N) -> Self {
        Self { values, nodes }
    }
}

impl<V, N> MergeRule for FnRule<V, N>
where
    V: Fn(&Name, &Value, &Value) -> Value,
    N: Fn(&Name, &[SealedMeta], &[SealedMeta]) -> Vec<SealedMeta>,
{
    fn merge_value(&self, path: &Name, main: &Value, secondary: &Value) -> Value {
        (self.values)(path, main, secondary)
    }

    fn merge_nodes(
        &self,
        path: &Name,
        main: &[SealedMeta],
        secondary: &[SealedMeta],
    ) -> Vec<SealedMeta> {
        (self.nodes)(path, main, secondary)
    }
}

impl<V, N> fmt::Debug for FnRule<V, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnRule")
    }
}

/// Hidden value naming the rule a document wants to be merged with.
pub const MERGE_RULE_KEY: &str = "@mergeRule";

/// `join`, matched exactly, selects [`JoinRule`]; anything else, or
/// nothing, [`ReplaceRule`].
pub fn rule_for(meta: &dyn Meta) -> Box<dyn MergeRule> {
    match meta.local_value(MERGE_RULE_KEY).and_then(Value::as_str) {
        Some("join") => Box::new(JoinRule),
        _ => Box::new(ReplaceRule),
    }
}

pub fn merge_replace(main: &dyn Meta, secondary: &dyn Meta) -> SealedMeta {
    ReplaceRule.merge(main, secondary)
}

pub fn merge_join(main: &dyn Meta, secondary: &dyn Meta) -> SealedMeta {
    JoinRule.merge(main, secondary)
}

/// Folds `layers` into one tree; earlier layers are the main side.
pub fn merge_all<'a, I>(rule: &dyn MergeRule, layers: I) -> SealedMeta
where
    I: IntoIterator<Item = &'a dyn Meta>,
{
    let mut layers = layers.into_iter();
    let Some(first) = layers.next() else {
        return SealedMeta::default();
    };
    layers.fold(first.seal(), |acc, layer| rule.merge(&acc, layer))
}
