//! Document filters for definitions
//!
//! A definition may be restricted to a subset of documents with a simple
//! field predicate, written as `"<field> == <literal>"` or
//! `"<field> != <literal>"` (for example `type == events`).
//!
//! Literals: integers, floats, `true`/`false`, `null`, double-quoted strings,
//! or any other bare word as a string.
//!
//! For array fields, `==` matches when any element equals the literal and
//! `!=` matches when none does. A missing field never matches `==` and
//! always matches `!=`.

use crate::document::Document;
use crate::error::{Error, Result};
use crate::value::{FieldValue, Scalar};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    /// Field equals literal
    Eq,
    /// Field differs from literal
    Ne,
}

/// A field predicate evaluated before extraction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentFilter {
    field: String,
    op: FilterOp,
    value: Scalar,
}

impl DocumentFilter {
    /// Filter matching documents whose `field` equals `value`
    pub fn eq(field: impl Into<String>, value: impl Into<Scalar>) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Eq,
            value: value.into(),
        }
    }

    /// Filter matching documents whose `field` differs from `value`
    pub fn ne(field: impl Into<String>, value: impl Into<Scalar>) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Ne,
            value: value.into(),
        }
    }

    /// Parse a filter expression
    ///
    /// # Errors
    ///
    /// Returns `InvalidFilter` if the expression has no operator, an empty
    /// field name, or an empty literal.
    pub fn parse(expr: &str) -> Result<Self> {
        // the leftmost operator wins; later ones belong to the literal
        let split = [("==", FilterOp::Eq), ("!=", FilterOp::Ne)]
            .into_iter()
            .filter_map(|(token, op)| expr.find(token).map(|at| (at, token, op)))
            .min_by_key(|(at, _, _)| *at);
        let Some((at, token, op)) = split else {
            return Err(Error::InvalidFilter(format!(
                "expected '<field> == <value>' or '<field> != <value>', got '{}'",
                expr
            )));
        };
        let (field, literal) = (&expr[..at], &expr[at + token.len()..]);

        let field = field.trim();
        if field.is_empty() || field.contains(char::is_whitespace) {
            return Err(Error::InvalidFilter(format!("invalid field name in '{}'", expr)));
        }
        let literal = literal.trim();
        if literal.is_empty() {
            return Err(Error::InvalidFilter(format!("missing value in '{}'", expr)));
        }

        Ok(Self {
            field: field.to_string(),
            op,
            value: parse_literal(literal)?,
        })
    }

    /// Field the predicate reads
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Operator
    pub fn op(&self) -> FilterOp {
        self.op
    }

    /// Literal compared against
    pub fn value(&self) -> &Scalar {
        &self.value
    }

    /// Evaluate the predicate against a document
    pub fn matches(&self, doc: &Document) -> bool {
        let hit = match doc.get(&self.field) {
            Some(FieldValue::Scalar(s)) => *s == self.value,
            Some(FieldValue::Array(items)) => items.contains(&self.value),
            None => false,
        };
        match self.op {
            FilterOp::Eq => hit,
            FilterOp::Ne => !hit,
        }
    }
}

impl FromStr for DocumentFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        DocumentFilter::parse(s)
    }
}

impl fmt::Display for DocumentFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self.op {
            FilterOp::Eq => "==",
            FilterOp::Ne => "!=",
        };
        write!(f, "{} {} {}", self.field, op, self.value)
    }
}

fn parse_literal(literal: &str) -> Result<Scalar> {
    if let Some(inner) = literal.strip_prefix('"') {
        return inner
            .strip_suffix('"')
            .map(|s| Scalar::String(s.to_string()))
            .ok_or_else(|| Error::InvalidFilter(format!("unterminated string {}", literal)));
    }
    match literal {
        "null" => return Ok(Scalar::Null),
        "true" => return Ok(Scalar::Bool(true)),
        "false" => return Ok(Scalar::Bool(false)),
        _ => {}
    }
    if let Ok(i) = literal.parse::<i64>() {
        return Ok(Scalar::Int(i));
    }
    if literal.contains(['.', 'e', 'E']) {
        if let Ok(f) = literal.parse::<f64>() {
            return Ok(Scalar::Float(f));
        }
    }
    Ok(Scalar::String(literal.to_string()))
}
