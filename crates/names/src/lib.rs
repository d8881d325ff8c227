//! Path names for the meta tree.
//!
//! A [`Name`] is a sequence of tokens separated by `.`. Each token has an
//! entry and an optional bracketed query: an index (`channel[2]`) or a
//! conjunction of `key=value` predicates (`channel[letter=a, gain=2]`).
//! A backslash escapes the next character, so `a\.b` is a single entry.
//!
//! # Example
//!
//! ```
//! use meta_names::{Name, Query};
//!
//! let name: Name = "device.channel[letter=a].gain".parse().unwrap();
//! assert_eq!(name.len(), 3);
//! assert!(matches!(name.tokens()[1].query, Some(Query::Filter(_))));
//! assert_eq!(name.rest().to_string(), "channel[letter=a].gain");
//! assert_eq!(name.ignore_query().to_string(), "device.channel.gain");
//! ```

use thiserror::Error;

mod parser;
mod types;

pub use parser::NameParser;
pub use types::{Name, NameToken, Predicate, Query};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NameError {
    #[error("empty segment at offset {0}")]
    EmptySegment(usize),
    #[error("unterminated query starting at offset {0}")]
    UnterminatedQuery(usize),
    #[error("unexpected character {ch:?} at offset {pos}")]
    UnexpectedChar { ch: char, pos: usize },
    #[error("dangling escape at end of input")]
    DanglingEscape,
    #[error("empty query at offset {0}")]
    EmptyQuery(usize),
    #[error("predicate {0:?} has an empty key")]
    EmptyKey(String),
    #[error("predicate {0:?} is missing '='")]
    MissingEquals(String),
}

/// Characters with structural meaning in paths.
pub const RESERVED_CHARS: [char; 3] = ['[', ']', '$'];

/// Returns `true` if `entry` may be used as a value or node name.
///
/// ```
/// use meta_names::is_valid_element_name;
///
/// assert!(is_valid_element_name("gain"));
/// assert!(!is_valid_element_name("gain[0]"));
/// assert!(!is_valid_element_name("$var"));
/// ```
pub fn is_valid_element_name(entry: &str) -> bool {
    !entry.contains(RESERVED_CHARS)
}

/// Hidden names start with `@` and are skipped by default enumeration.
pub fn is_hidden(entry: &str) -> bool {
    entry.starts_with('@')
}

/// Escapes characters that would otherwise split or open a query.
pub fn escape_entry(entry: &str) -> String {
    escape_with(entry, &['.', '[', ']'])
}

pub(crate) fn escape_with(text: &str, special: &[char]) -> String {
    if !text.contains('\\') && !text.contains(special) {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len() + 2);
    for c in text.chars() {
        if c == '\\' || special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
