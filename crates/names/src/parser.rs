//! Recursive-descent parser for path names.

use crate::types::{Name, NameToken, Predicate, Query};
use crate::NameError;

/// A character read from the input, remembering whether it was escaped.
#[derive(Clone, Copy)]
struct Symbol {
    ch: char,
    escaped: bool,
}

/// Path name parser.
pub struct NameParser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> NameParser<'a> {
    pub fn parse(input: &'a str) -> Result<Name, NameError> {
        let mut parser = Self { input, pos: 0 };
        parser.parse_name()
    }

    fn parse_name(&mut self) -> Result<Name, NameError> {
        let mut tokens = Vec::new();
        if self.is_at_end() {
            return Ok(Name::empty());
        }
        loop {
            tokens.push(self.parse_token()?);
            match self.peek() {
                None => break,
                Some('.') => {
                    self.advance();
                    if self.is_at_end() {
                        return Err(NameError::EmptySegment(self.pos));
                    }
                }
                Some(ch) => return Err(NameError::UnexpectedChar { ch, pos: self.pos }),
            }
        }
        Ok(Name::from_tokens(tokens))
    }

    fn parse_token(&mut self) -> Result<NameToken, NameError> {
        let start = self.pos;
        let mut entry = String::new();
        while let Some(c) = self.peek() {
            match c {
                '.' | '[' => break,
                ']' => return Err(NameError::UnexpectedChar { ch: c, pos: self.pos }),
                '\\' => entry.push(self.escaped()?),
                _ => {
                    entry.push(c);
                    self.advance();
                }
            }
        }
        if entry.is_empty() {
            return Err(NameError::EmptySegment(start));
        }
        let query = if self.peek() == Some('[') {
            Some(self.parse_query()?)
        } else {
            None
        };
        Ok(NameToken { entry, query })
    }

    fn parse_query(&mut self) -> Result<Query, NameError> {
        let start = self.pos;
        self.advance(); // [
        let mut body = Vec::new();
        loop {
            match self.peek() {
                None => return Err(NameError::UnterminatedQuery(start)),
                Some(']') => {
                    self.advance();
                    break;
                }
                Some('\\') => body.push(Symbol {
                    ch: self.escaped()?,
                    escaped: true,
                }),
                Some(ch) => {
                    body.push(Symbol { ch, escaped: false });
                    self.advance();
                }
            }
        }

        let raw: String = body.iter().map(|s| s.ch).collect();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(NameError::EmptyQuery(start));
        }
        if body.iter().all(|s| !s.escaped) {
            if let Ok(index) = trimmed.parse::<usize>() {
                return Ok(Query::Index(index));
            }
        }

        let mut predicates = Vec::new();
        for part in body.split(|s| s.ch == ',' && !s.escaped) {
            predicates.push(Self::parse_predicate(part)?);
        }
        Ok(Query::Filter(predicates))
    }

    fn parse_predicate(part: &[Symbol]) -> Result<Predicate, NameError> {
        let text = || part.iter().map(|s| s.ch).collect::<String>();
        let eq = part
            .iter()
            .position(|s| s.ch == '=' && !s.escaped)
            .ok_or_else(|| NameError::MissingEquals(text()))?;
        let key: String = part[..eq].iter().map(|s| s.ch).collect();
        let value: String = part[eq + 1..].iter().map(|s| s.ch).collect();
        let key = key.trim();
        if key.is_empty() {
            return Err(NameError::EmptyKey(text()));
        }
        Ok(Predicate::new(key, value.trim()))
    }

    /// Consumes a backslash and returns the character it escapes.
    fn escaped(&mut self) -> Result<char, NameError> {
        self.advance();
        let c = self.peek().ok_or(NameError::DanglingEscape)?;
        self.advance();
        Ok(c)
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
        }
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.input.len()
    }
}
