use std::fmt;

use crate::{Decimal, Number, Timestamp};

/// The scalar kind of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Null,
    Boolean,
    Number,
    String,
    Timestamp,
}

/// A leaf datum of the meta tree.
///
/// `List` holds two or more scalars. Build one with [`Value::list`] so that
/// empty and single-element inputs collapse to `Null` and the element; a
/// hand-built `List` is brought to that shape by [`Value::normalize`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Value {
    #[default]
    Null,
    Boolean(bool),
    Number(Number),
    String(String),
    Timestamp(Timestamp),
    List(Vec<Value>),
}

impl Value {
    /// Collapses an iterator into a value: `Null` for none, the item for
    /// one, `List` otherwise. Nested lists are flattened at any depth.
    pub fn list<I: IntoIterator<Item = Value>>(items: I) -> Value {
        let mut flat = Vec::new();
        flatten_into(&mut flat, items);
        match flat.len() {
            0 => Value::Null,
            1 => flat.pop().unwrap_or_default(),
            _ => Value::List(flat),
        }
    }

    /// Brings a hand-built `List` to the shape [`Value::list`] produces.
    /// Scalars are returned unchanged.
    ///
    /// ```
    /// use meta_values::Value;
    ///
    /// assert_eq!(Value::List(vec![Value::from(1)]).normalize(), Value::from(1));
    /// assert_eq!(Value::List(Vec::new()).normalize(), Value::Null);
    /// ```
    pub fn normalize(self) -> Value {
        match self {
            Value::List(items) => Value::list(items),
            scalar => scalar,
        }
    }

    /// The value seen as a list: `[]` for `Null`, the items of a `List`,
    /// `[self]` for any scalar.
    pub fn to_list(&self) -> Vec<Value> {
        match self {
            Value::Null => Vec::new(),
            Value::List(items) => items.clone(),
            other => vec![other.clone()],
        }
    }

    /// Appends `other` after `self`, list-wise.
    ///
    /// ```
    /// use meta_values::Value;
    ///
    /// let v = Value::from(1).append(Value::from(2));
    /// assert_eq!(v, Value::list([Value::from(1), Value::from(2)]));
    /// ```
    pub fn append(self, other: Value) -> Value {
        Value::list(self.into_list().into_iter().chain(other.into_list()))
    }

    fn into_list(self) -> Vec<Value> {
        match self {
            Value::Null => Vec::new(),
            Value::List(items) => items,
            other => vec![other],
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Value::List(_))
    }

    /// Type of a scalar, or of the first element of a list.
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Null => ValueType::Null,
            Value::Boolean(_) => ValueType::Boolean,
            Value::Number(_) => ValueType::Number,
            Value::String(_) => ValueType::String,
            Value::Timestamp(_) => ValueType::Timestamp,
            Value::List(items) => items.first().map_or(ValueType::Null, Value::value_type),
        }
    }

    /// The first element of a list, or the value itself.
    fn scalar(&self) -> &Value {
        match self {
            Value::List(items) => items.first().unwrap_or(&Value::Null),
            other => other,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.scalar() {
            Value::Boolean(b) => Some(*b),
            Value::String(s) if s.eq_ignore_ascii_case("true") => Some(true),
            Value::String(s) if s.eq_ignore_ascii_case("false") => Some(false),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<Number> {
        match self.scalar() {
            Value::Number(n) => Some(*n),
            Value::String(s) => match Value::parse(s) {
                Value::Number(n) => Some(n),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_number().and_then(|n| n.as_i64())
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_number().map(|n| n.to_f64())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self.scalar() {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<Timestamp> {
        match self.scalar() {
            Value::Timestamp(t) => Some(*t),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

fn flatten_into<I: IntoIterator<Item = Value>>(flat: &mut Vec<Value>, items: I) {
    for item in items {
        match item {
            Value::List(inner) => flatten_into(flat, inner),
            other => flat.push(other),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => f.write_str(s),
            Value::Timestamp(t) => write!(f, "{t}"),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(value.into())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(value.into())
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Number(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value.into())
    }
}

impl From<Number> for Value {
    fn from(value: Number) -> Self {
        Value::Number(value)
    }
}

impl From<Decimal> for Value {
    fn from(value: Decimal) -> Self {
        Value::Number(value.into())
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Timestamp> for Value {
    fn from(value: Timestamp) -> Self {
        Value::Timestamp(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::list(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl FromIterator<Value> for Value {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Value::list(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_collapses() {
        assert_eq!(Value::list(Vec::new()), Value::Null);
        assert_eq!(Value::list([Value::from(1)]), Value::from(1));
        assert!(Value::list([Value::from(1), Value::from(2)]).is_list());
    }

    #[test]
    fn test_list_flattens_nested() {
        let inner = Value::list([Value::from("a"), Value::from("b")]);
        let v = Value::list([inner, Value::from("c")]);
        assert_eq!(v.to_list().len(), 3);
    }

    #[test]
    fn test_normalize_hand_built_lists() {
        assert_eq!(Value::List(Vec::new()).normalize(), Value::Null);
        assert_eq!(Value::List(vec![Value::from(1)]).normalize(), Value::from(1));
        let nested = Value::List(vec![
            Value::List(vec![Value::from(1), Value::List(vec![Value::from(2)])]),
            Value::from(3),
        ]);
        assert_eq!(
            nested.normalize(),
            Value::List(vec![Value::from(1), Value::from(2), Value::from(3)])
        );
        assert_eq!(Value::from("x").normalize(), Value::from("x"));
    }

    #[test]
    fn test_to_list() {
        assert!(Value::Null.to_list().is_empty());
        assert_eq!(Value::from(true).to_list(), vec![Value::from(true)]);
    }

    #[test]
    fn test_append_preserves_order() {
        let v = Value::from("a")
            .append(Value::from("b"))
            .append(Value::Null)
            .append(Value::from("c"));
        assert_eq!(v.to_string(), "[a, b, c]");
    }

    #[test]
    fn test_value_type_of_list_is_first_element() {
        let v: Value = [Value::from(1.5), Value::from("x")].into_iter().collect();
        assert_eq!(v.value_type(), ValueType::Number);
        assert_eq!(Value::Null.value_type(), ValueType::Null);
    }

    #[test]
    fn test_accessors() {
        assert_eq!(Value::from("TRUE").as_bool(), Some(true));
        assert_eq!(Value::from("12").as_i64(), Some(12));
        assert_eq!(Value::from(2.5).as_f64(), Some(2.5));
        assert_eq!(Value::from(2.5).as_i64(), None);
        assert_eq!(Value::from("x").as_str(), Some("x"));
        assert_eq!(Value::from(1).as_str(), None);
        assert_eq!(
            Value::from("1970-01-01T00:00:01Z").as_timestamp(),
            Some(Timestamp::from_unix_seconds(1))
        );
    }

    #[test]
    fn test_option_into_value() {
        assert_eq!(Value::from(None::<i32>), Value::Null);
        assert_eq!(Value::from(Some("a")), Value::from("a"));
    }
}
