//! Leaf values of the meta tree.
//!
//! A [`Value`] is a closed sum of `Null`, `Boolean`, `Number`, `String`
//! and `Timestamp`, plus `List` for several values accumulated under one
//! name. Values are immutable and compare structurally.
//!
//! # Example
//!
//! ```
//! use meta_values::{Number, Value};
//!
//! assert_eq!(Value::parse("42"), Value::Number(Number::Integer(42)));
//! assert_eq!(Value::parse("\"42\""), Value::from("42"));
//! assert_eq!(Value::parse("[1, 2]").to_list().len(), 2);
//! assert!(Value::parse("").is_null());
//! ```

use thiserror::Error;

mod number;
mod parse;
mod timestamp;
mod value;

pub use number::{Decimal, Number};
pub use timestamp::Timestamp;
pub use value::{Value, ValueType};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueError {
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
    #[error("invalid decimal: {0}")]
    InvalidDecimal(String),
}
