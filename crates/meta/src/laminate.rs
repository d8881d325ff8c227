use std::collections::HashSet;

use meta_values::Value;

use crate::error::Result;
use crate::meta::{Meta, MetaRef};
use crate::sealed::SealedMeta;

/// Read-only stack of trees; earlier layers shadow later ones.
///
/// A value is read from the first layer that holds it and a group from the
/// first layer where it is not empty. Groups are never merged across
/// layers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Laminate {
    layers: Vec<SealedMeta>,
}

impl Laminate {
    pub fn new<I: IntoIterator<Item = SealedMeta>>(layers: I) -> Self {
        Self {
            layers: layers.into_iter().filter(|l| !l.is_empty()).collect(),
        }
    }

    pub fn from_metas<'a, I>(layers: I) -> Self
    where
        I: IntoIterator<Item = &'a dyn Meta>,
    {
        Self::new(layers.into_iter().map(|m| m.seal()))
    }

    /// A copy with `layer` on top.
    pub fn with_first_layer(&self, layer: SealedMeta) -> Self {
        Self::new(std::iter::once(layer).chain(self.layers.iter().cloned()))
    }

    /// A copy with `layer` at the bottom.
    pub fn with_layer(&self, layer: SealedMeta) -> Self {
        Self::new(self.layers.iter().cloned().chain(std::iter::once(layer)))
    }

    pub fn layers(&self) -> &[SealedMeta] {
        &self.layers
    }

    /// The laminate of the first node at `path` in every layer.
    pub fn child(&self, path: &str) -> Result<Laminate> {
        let mut children = Vec::new();
        for layer in &self.layers {
            if let Some(node) = layer.opt_meta(path)? {
                children.push(node.seal());
            }
        }
        Ok(Self::new(children))
    }

    /// Folds the value at `path` of every layer that holds one, top first.
    pub fn collect_value<T, F>(&self, path: &str, init: T, mut f: F) -> Result<T>
    where
        F: FnMut(T, &Value) -> T,
    {
        let mut acc = init;
        for layer in &self.layers {
            if let Some(value) = layer.opt_value(path)? {
                acc = f(acc, value);
            }
        }
        Ok(acc)
    }

    fn distinct<'a>(names: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
        let mut seen = HashSet::new();
        names.filter(|n| seen.insert(*n)).collect()
    }
}

impl Meta for Laminate {
    fn name(&self) -> &str {
        self.layers.first().map_or("", |l| l.name())
    }

    fn value_names(&self, include_hidden: bool) -> Vec<&str> {
        Self::distinct(
            self.layers
                .iter()
                .flat_map(|l| l.value_names(include_hidden)),
        )
    }

    fn node_names(&self, include_hidden: bool) -> Vec<&str> {
        Self::distinct(
            self.layers
                .iter()
                .flat_map(|l| l.node_names(include_hidden)),
        )
    }

    fn local_value(&self, name: &str) -> Option<&Value> {
        self.layers.iter().find_map(|l| l.value(name))
    }

    fn local_nodes(&self, name: &str) -> Vec<MetaRef<'_>> {
        self.layers
            .iter()
            .map(|l| l.nodes(name))
            .find(|g| !g.is_empty())
            .map(|g| g.iter().map(MetaRef::Sealed).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(values: &[(&str, i32)], groups: Vec<(&str, Vec<SealedMeta>)>) -> SealedMeta {
        SealedMeta::from_parts(
            "layer",
            values.iter().map(|(k, v)| (k.to_string(), Value::from(*v))),
            groups.into_iter().map(|(k, g)| (k.to_string(), g)),
        )
    }

    #[test]
    fn test_first_layer_wins() {
        let top = layer(&[("a", 1)], vec![]);
        let bottom = layer(&[("a", 2), ("b", 3)], vec![]);
        let lam = Laminate::new([top, bottom]);
        assert_eq!(lam.get_value("a").unwrap(), &Value::from(1));
        assert_eq!(lam.get_value("b").unwrap(), &Value::from(3));
        assert_eq!(lam.value_names(false), ["a", "b"]);
    }

    #[test]
    fn test_groups_are_not_merged() {
        let g1 = layer(&[("v", 1)], vec![]);
        let g2 = layer(&[("v", 2)], vec![]);
        let lam = Laminate::new([
            layer(&[], vec![("g", vec![g1.clone()])]),
            layer(&[], vec![("g", vec![g2.clone(), g2])]),
        ]);
        assert_eq!(lam.meta_list("g").unwrap().len(), 1);
        let child = lam.child("g").unwrap();
        assert_eq!(child.layers().len(), 2);
        assert_eq!(child.get_value("v").unwrap(), &Value::from(1));
    }

    #[test]
    fn test_empty_layers_dropped_and_collect() {
        let lam = Laminate::new([SealedMeta::empty("x"), layer(&[("n", 2)], vec![])])
            .with_first_layer(layer(&[("n", 5)], vec![]))
            .with_layer(layer(&[("n", 7)], vec![]));
        assert_eq!(lam.layers().len(), 3);
        let sum = lam
            .collect_value("n", 0, |acc, v| acc + v.as_i64().unwrap_or(0))
            .unwrap();
        assert_eq!(sum, 14);
        assert_eq!(lam.seal().value("n"), Some(&Value::from(5)));
    }
}
