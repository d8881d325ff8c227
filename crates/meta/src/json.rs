//! JSON stream adapter.
//!
//! Objects map to nodes, arrays of objects to groups and arrays of scalars
//! to list values. JSON strings are read with [`Value::parse`], so
//! `"2024-01-01T00:00:00Z"` becomes a timestamp; strings that would parse
//! as something else are written back quoted. A group of one is written as
//! a plain object. Decimals are written as strings and come back as
//! floats or integers when the text allows it.
//!
//! When a node has a value and a group of the same name the group is
//! written and the value is lost. The root name is not part of the
//! document; readers take it from [`JsonFormat::with_root_name`].

use std::io::{Read, Write};

use meta_names::is_valid_element_name;
use meta_values::{Number, Value};
use serde_json::{Map, Value as Json};

use crate::codec::{read_input, MetaReader, MetaWriter};
use crate::error::{MetaError, Result};
use crate::meta::Meta;
use crate::sealed::SealedMeta;

#[derive(Debug, Clone, Default)]
pub struct JsonFormat {
    pretty: bool,
    root_name: String,
}

impl JsonFormat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    pub fn with_root_name(mut self, name: impl Into<String>) -> Self {
        self.root_name = name.into();
        self
    }

    pub fn to_json(&self, meta: &dyn Meta) -> Json {
        node_to_json(meta)
    }

    /// Builds a tree from a JSON object.
    pub fn from_json(&self, json: &Json) -> Result<SealedMeta> {
        match json {
            Json::Object(map) => object_to_meta(&self.root_name, map),
            other => Err(MetaError::Parse(format!(
                "expected a JSON object at the root, found {}",
                kind(other)
            ))),
        }
    }
}

fn kind(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "a boolean",
        Json::Number(_) => "a number",
        Json::String(_) => "a string",
        Json::Array(_) => "an array",
        Json::Object(_) => "an object",
    }
}

fn node_to_json(meta: &dyn Meta) -> Json {
    let mut map = Map::new();
    for name in meta.value_names(true) {
        if let Some(value) = meta.local_value(name) {
            map.insert(name.to_string(), value_to_json(value));
        }
    }
    for name in meta.node_names(true) {
        let group = meta.local_nodes(name);
        let json = match group.as_slice() {
            [] => continue,
            [single] => node_to_json(single),
            many => Json::Array(many.iter().map(|n| node_to_json(n)).collect()),
        };
        map.insert(name.to_string(), json);
    }
    Json::Object(map)
}

fn value_to_json(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Boolean(b) => Json::Bool(*b),
        Value::Number(Number::Integer(n)) => Json::from(*n),
        Value::Number(Number::Float(f)) => serde_json::Number::from_f64(*f)
            .map(Json::Number)
            .unwrap_or_else(|| Json::String(f.to_string())),
        Value::Number(Number::Decimal(d)) => Json::String(d.to_string()),
        Value::String(s) => {
            if Value::parse(s) == *value {
                Json::String(s.clone())
            } else {
                Json::String(format!("\"{s}\""))
            }
        }
        Value::Timestamp(t) => Json::String(t.to_string()),
        Value::List(items) => Json::Array(items.iter().map(value_to_json).collect()),
    }
}

fn scalar_to_value(json: &Json) -> Result<Value> {
    Ok(match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Boolean(*b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Value::from(i),
            None => Value::from(n.as_f64().unwrap_or(f64::NAN)),
        },
        Json::String(s) => Value::parse(s),
        Json::Array(items) => items
            .iter()
            .map(scalar_to_value)
            .collect::<Result<Vec<_>>>()
            .map(Value::list)?,
        Json::Object(_) => {
            return Err(MetaError::Parse(
                "objects cannot be mixed with scalars in an array".to_string(),
            ))
        }
    })
}

fn object_to_meta(name: &str, map: &Map<String, Json>) -> Result<SealedMeta> {
    let mut values = Vec::new();
    let mut groups = Vec::new();
    for (key, json) in map {
        if !is_valid_element_name(key) {
            return Err(MetaError::InvalidName(key.clone()));
        }
        match json {
            Json::Object(child) => groups.push((key.clone(), vec![object_to_meta(key, child)?])),
            Json::Array(items) if items.iter().any(Json::is_object) => {
                let members = items
                    .iter()
                    .map(|item| match item {
                        Json::Object(child) => object_to_meta(key, child),
                        other => Err(MetaError::Parse(format!(
                            "array {key:?} mixes objects with {}",
                            kind(other)
                        ))),
                    })
                    .collect::<Result<Vec<_>>>()?;
                groups.push((key.clone(), members));
            }
            scalar => values.push((key.clone(), scalar_to_value(scalar)?)),
        }
    }
    Ok(SealedMeta::from_parts(name, values, groups))
}

impl MetaReader for JsonFormat {
    fn read(&self, input: &mut dyn Read, length: Option<usize>) -> Result<SealedMeta> {
        let bytes = read_input(input, length)?;
        let json: Json =
            serde_json::from_slice(&bytes).map_err(|e| MetaError::Parse(e.to_string()))?;
        self.from_json(&json)
    }
}

impl MetaWriter for JsonFormat {
    fn write(&self, out: &mut dyn Write, meta: &dyn Meta) -> Result<()> {
        let json = self.to_json(meta);
        let text = if self.pretty {
            serde_json::to_string_pretty(&json)
        } else {
            serde_json::to_string(&json)
        }
        .map_err(|e| MetaError::Parse(e.to_string()))?;
        out.write_all(text.as_bytes())?;
        Ok(())
    }
}
