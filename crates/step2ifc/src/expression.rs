// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `${Token}` property expressions

/// Piece of a parsed expression
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Token(String),
}

/// Parsed property value template
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Expression {
    pub segments: Vec<Segment>,
}

/// Why an expression could not be parsed
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExpressionError {
    /// `${` without a closing brace
    Unterminated,
    /// `${}` or a token with characters outside `[A-Za-z0-9_.]`
    InvalidToken(String),
}

impl Expression {
    pub fn parse(input: &str) -> Result<Self, ExpressionError> {
        let mut segments = Vec::new();
        let mut rest = input;

        while let Some(start) = rest.find("${") {
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_string()));
            }
            let after = &rest[start + 2..];
            let end = after.find('}').ok_or(ExpressionError::Unterminated)?;
            let token = after[..end].trim();
            let valid = !token.is_empty()
                && token
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
            if !valid {
                return Err(ExpressionError::InvalidToken(after[..end].to_string()));
            }
            segments.push(Segment::Token(token.to_string()));
            rest = &after[end + 1..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self { segments })
    }

    /// Token names in order of appearance
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Token(t) => Some(t.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Substitute every token through `lookup`; the first unresolved token is returned as the error
    pub fn render<F>(&self, lookup: F) -> Result<String, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Token(token) => match lookup(token) {
                    Some(value) => out.push_str(&value),
                    None => return Err(token.clone()),
                },
            }
        }
        Ok(out)
    }
}
