//! Closest-match conversion of text into a [`Value`].

use std::sync::OnceLock;

use crate::{Number, Timestamp, Value};

fn float_regex() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| {
        regex::Regex::new(r"^[+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?$")
            .expect("float regex is valid")
    })
}

/// Splits list contents on commas that are outside quotes and brackets.
fn split_items(body: &str) -> Vec<&str> {
    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut quoted = false;
    let mut start = 0;
    for (i, c) in body.char_indices() {
        match c {
            '"' => quoted = !quoted,
            '[' if !quoted => depth += 1,
            ']' if !quoted => depth = depth.saturating_sub(1),
            ',' if !quoted && depth == 0 => {
                items.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    items.push(&body[start..]);
    items
}

impl Value {
    /// Reads text as the most specific value it can represent.
    ///
    /// In order: empty text is `Null`; `"quoted"` text is a string without
    /// the quotes; then integer, float, timestamp, boolean; `[a, b]` is a
    /// list of parsed items; anything else stays a string.
    pub fn parse(text: &str) -> Value {
        if text.is_empty() {
            return Value::Null;
        }
        if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
            return Value::String(text[1..text.len() - 1].to_string());
        }
        if let Ok(i) = text.parse::<i64>() {
            return Value::Number(Number::Integer(i));
        }
        if float_regex().is_match(text) {
            if let Ok(f) = text.parse::<f64>() {
                return Value::Number(Number::Float(f));
            }
        }
        if let Ok(t) = text.parse::<Timestamp>() {
            return Value::Timestamp(t);
        }
        if text.eq_ignore_ascii_case("true") {
            return Value::Boolean(true);
        }
        if text.eq_ignore_ascii_case("false") {
            return Value::Boolean(false);
        }
        if text.len() >= 2 && text.starts_with('[') && text.ends_with(']') {
            let body = text[1..text.len() - 1].trim();
            if body.is_empty() {
                return Value::Null;
            }
            return Value::list(split_items(body).into_iter().map(|s| Value::parse(s.trim())));
        }
        Value::String(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_null() {
        assert_eq!(Value::parse(""), Value::Null);
    }

    #[test]
    fn test_quoted_string_keeps_digits() {
        assert_eq!(Value::parse("\"12\""), Value::from("12"));
        assert_eq!(Value::parse("\"\""), Value::from(""));
    }

    #[test]
    fn test_numbers() {
        assert_eq!(Value::parse("-7"), Value::from(-7i64));
        assert_eq!(Value::parse("2.5"), Value::from(2.5));
        assert_eq!(Value::parse("1e3"), Value::from(1000.0));
        assert_eq!(Value::parse("inf"), Value::from("inf"));
        assert_eq!(Value::parse("NaN"), Value::from("NaN"));
    }

    #[test]
    fn test_timestamp() {
        assert_eq!(
            Value::parse("1970-01-01T00:00:00Z"),
            Value::Timestamp(Timestamp::UNIX_EPOCH)
        );
    }

    #[test]
    fn test_booleans() {
        assert_eq!(Value::parse("true"), Value::from(true));
        assert_eq!(Value::parse("False"), Value::from(false));
    }

    #[test]
    fn test_list() {
        let v = Value::parse("[1, \"a,b\", [2, 3]]");
        assert_eq!(
            v.to_list(),
            vec![Value::from(1), Value::from("a,b"), Value::from(2), Value::from(3)]
        );
        assert_eq!(Value::parse("[]"), Value::Null);
        assert_eq!(Value::parse("[x]"), Value::from("x"));
    }

    #[test]
    fn test_fallback_string() {
        assert_eq!(Value::parse("hello world"), Value::from("hello world"));
        assert_eq!(Value::parse("\""), Value::from("\""));
    }
}
