//! `${path|default}` placeholders in string values.
//!
//! A placeholder is replaced with the value found at `path` in the first
//! provider that has one, or with `default` when none does. A placeholder
//! with neither stays as written. The substituted text is parsed back into
//! the closest value type, so `"${port}"` can become a number.

use std::sync::OnceLock;

use meta_values::Value;
use regex::{Captures, Regex};

use crate::meta::Meta;
use crate::sealed::SealedMeta;

fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$\{(?P<path>[^|}]*)(?:\|(?P<default>[^}]*))?\}")
            .expect("placeholder regex is valid")
    })
}

fn lookup(path: &str, providers: &[&dyn Meta]) -> Option<String> {
    providers
        .iter()
        .find_map(|p| p.opt_value(path).ok().flatten().map(Value::to_string))
}

/// Substitutes the placeholders of a string value. Lists are transformed
/// item by item; other values come back unchanged, as does everything when
/// `providers` is empty.
///
/// ```
/// use meta_tree::{transform_value, MetaTree, Value};
///
/// let mut env = MetaTree::new("env");
/// env.root_mut().set_value("host", "db.local").unwrap();
///
/// let url = transform_value(&Value::from("tcp://${host}:${port|5432}"), &[&env]);
/// assert_eq!(url, Value::from("tcp://db.local:5432"));
/// ```
pub fn transform_value(value: &Value, providers: &[&dyn Meta]) -> Value {
    if providers.is_empty() {
        return value.clone();
    }
    match value {
        Value::String(text) if text.contains('$') => {
            let mut replaced = false;
            let out = placeholder().replace_all(text, |caps: &Captures<'_>| {
                let found = lookup(&caps["path"], providers)
                    .or_else(|| caps.name("default").map(|d| d.as_str().to_string()));
                match found {
                    Some(text) => {
                        replaced = true;
                        text
                    }
                    None => caps[0].to_string(),
                }
            });
            if replaced {
                Value::parse(&out)
            } else {
                value.clone()
            }
        }
        Value::List(items) => Value::list(items.iter().map(|v| transform_value(v, providers))),
        other => other.clone(),
    }
}

/// Copy of `meta` with [`transform_value`] applied to every value.
pub fn substitute_values(meta: &dyn Meta, providers: &[&dyn Meta]) -> SealedMeta {
    let values = meta.value_names(true).into_iter().filter_map(|name| {
        meta.local_value(name)
            .map(|v| (name.to_string(), transform_value(v, providers)))
    });
    let nodes = meta.node_names(true).into_iter().map(|name| {
        let group = meta
            .local_nodes(name)
            .iter()
            .map(|child| substitute_values(child, providers))
            .collect();
        (name.to_string(), group)
    });
    SealedMeta::from_parts(meta.name(), values, nodes)
}
