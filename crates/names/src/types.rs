use std::fmt;
use std::str::FromStr;

use crate::{escape_entry, escape_with, NameError, NameParser};

/// One `key=value` condition of a filter query. The value is kept as raw
/// text; callers decide how to compare it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Predicate {
    pub key: String,
    pub value: String,
}

impl Predicate {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Bracketed selector on a path token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Query {
    Index(usize),
    /// All predicates must hold.
    Filter(Vec<Predicate>),
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::Index(i) => write!(f, "{i}"),
            Query::Filter(predicates) => {
                for (i, p) in predicates.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(
                        f,
                        "{}={}",
                        escape_with(&p.key, &['=', ',', ']']),
                        escape_with(&p.value, &[',', ']'])
                    )?;
                }
                Ok(())
            }
        }
    }
}

/// A single path segment: an entry and an optional query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NameToken {
    pub entry: String,
    pub query: Option<Query>,
}

impl NameToken {
    pub fn new(entry: impl Into<String>) -> Self {
        Self {
            entry: entry.into(),
            query: None,
        }
    }

    pub fn with_index(entry: impl Into<String>, index: usize) -> Self {
        Self {
            entry: entry.into(),
            query: Some(Query::Index(index)),
        }
    }

    pub fn with_query(entry: impl Into<String>, query: Query) -> Self {
        Self {
            entry: entry.into(),
            query: Some(query),
        }
    }

    pub fn has_query(&self) -> bool {
        self.query.is_some()
    }

    pub fn ignore_query(&self) -> NameToken {
        NameToken::new(self.entry.clone())
    }
}

impl fmt::Display for NameToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&escape_entry(&self.entry))?;
        if let Some(query) = &self.query {
            write!(f, "[{query}]")?;
        }
        Ok(())
    }
}

/// A parsed hierarchical path.
///
/// `Display` re-escapes entries, so formatting then parsing yields the
/// same name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Name {
    tokens: Vec<NameToken>,
}

impl Name {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parses path text. Empty text gives the empty name.
    pub fn parse(text: &str) -> Result<Self, NameError> {
        NameParser::parse(text)
    }

    /// A one-token name taken literally, without parsing.
    pub fn single(entry: impl Into<String>) -> Self {
        Self {
            tokens: vec![NameToken::new(entry)],
        }
    }

    pub fn from_tokens(tokens: Vec<NameToken>) -> Self {
        Self { tokens }
    }

    /// Concatenates several names.
    pub fn join<I: IntoIterator<Item = Name>>(names: I) -> Self {
        Self {
            tokens: names.into_iter().flat_map(|n| n.tokens).collect(),
        }
    }

    pub fn tokens(&self) -> &[NameToken] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn head(&self) -> Option<&NameToken> {
        self.tokens.first()
    }

    pub fn last_token(&self) -> Option<&NameToken> {
        self.tokens.last()
    }

    /// Everything after the first token.
    pub fn rest(&self) -> Name {
        Self {
            tokens: self.tokens.iter().skip(1).cloned().collect(),
        }
    }

    /// The first token as a name of its own.
    pub fn first(&self) -> Name {
        Self {
            tokens: self.tokens.first().cloned().into_iter().collect(),
        }
    }

    /// The last token as a name of its own.
    pub fn last(&self) -> Name {
        Self {
            tokens: self.tokens.last().cloned().into_iter().collect(),
        }
    }

    /// Everything before the last token.
    pub fn cut_last(&self) -> Name {
        let n = self.tokens.len().saturating_sub(1);
        Self {
            tokens: self.tokens[..n].to_vec(),
        }
    }

    pub fn plus(&self, other: &Name) -> Name {
        let mut tokens = self.tokens.clone();
        tokens.extend(other.tokens.iter().cloned());
        Self { tokens }
    }

    pub fn plus_token(&self, token: NameToken) -> Name {
        let mut tokens = self.tokens.clone();
        tokens.push(token);
        Self { tokens }
    }

    /// `true` if any token carries a query.
    pub fn has_query(&self) -> bool {
        self.tokens.iter().any(NameToken::has_query)
    }

    pub fn ignore_query(&self) -> Name {
        Self {
            tokens: self.tokens.iter().map(NameToken::ignore_query).collect(),
        }
    }

    /// Text form without escape characters.
    pub fn unescaped(&self) -> String {
        let mut out = String::new();
        for (i, token) in self.tokens.iter().enumerate() {
            if i > 0 {
                out.push('.');
            }
            out.push_str(&token.entry);
            if let Some(query) = &token.query {
                out.push('[');
                match query {
                    Query::Index(n) => out.push_str(&n.to_string()),
                    Query::Filter(predicates) => {
                        let parts: Vec<String> = predicates
                            .iter()
                            .map(|p| format!("{}={}", p.key, p.value))
                            .collect();
                        out.push_str(&parts.join(","));
                    }
                }
                out.push(']');
            }
        }
        out
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, token) in self.tokens.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{token}")?;
        }
        Ok(())
    }
}

impl FromStr for Name {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NameParser::parse(s)
    }
}

impl From<NameToken> for Name {
    fn from(token: NameToken) -> Self {
        Self {
            tokens: vec![token],
        }
    }
}

impl TryFrom<&str> for Name {
    type Error = NameError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        NameParser::parse(value)
    }
}
