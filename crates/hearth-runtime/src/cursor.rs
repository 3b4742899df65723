//! Positional token extraction for one command line.

#![allow(missing_docs)]

use smol_str::SmolStr;

/// Placeholder that stands in for a space inside human-readable arguments.
pub const SPACE_PLACEHOLDER: char = '#';

/// Sequential reader over the whitespace-delimited tokens of a line.
///
/// Exhaustion is signalled by an empty token, never by an error; handlers that
/// need a fixed arity check for emptiness themselves.
#[derive(Debug, Clone)]
pub struct TokenCursor<'a> {
    rest: &'a str,
}

impl<'a> TokenCursor<'a> {
    #[must_use]
    pub fn new(line: &'a str) -> Self {
        Self { rest: line }
    }

    /// Next token, or `""` once the line is exhausted.
    pub fn next(&mut self) -> &'a str {
        let trimmed = self.rest.trim_start();
        let end = trimmed
            .find(char::is_whitespace)
            .unwrap_or(trimmed.len());
        let (token, rest) = trimmed.split_at(end);
        self.rest = rest;
        token
    }

    /// Next token, or `None` when exhausted.
    pub fn next_opt(&mut self) -> Option<&'a str> {
        let token = self.next();
        (!token.is_empty()).then_some(token)
    }

    /// Untouched remainder of the line with leading whitespace removed.
    #[must_use]
    pub fn remainder(&self) -> &'a str {
        self.rest.trim_start()
    }

    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.remainder().is_empty()
    }
}

/// Restores placeholder characters to spaces for display text.
#[must_use]
pub fn human_text(token: &str) -> SmolStr {
    if token.contains(SPACE_PLACEHOLDER) {
        SmolStr::new(token.replace(SPACE_PLACEHOLDER, " "))
    } else {
        SmolStr::new(token)
    }
}
