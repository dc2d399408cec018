//! Field paths: the query language shared by result filtering, parameter
//! templating and column projection.
//!
//! The grammar is the subset of JMESPath needed to describe cloud API
//! responses: sub-expressions, indexes, projections, filters, multiselects,
//! pipes and a handful of functions.

mod eval;
mod lexer;
mod parser;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::PathError;
use parser::Ast;

/// A compiled field path expression.
///
/// Cloning is cheap; the syntax tree is shared.
#[derive(Clone)]
pub struct FieldPath {
    expression: Arc<str>,
    ast: Arc<Ast>,
}

impl FieldPath {
    /// Compile an expression, reporting syntax errors with their byte offset.
    pub fn compile(expression: &str) -> Result<Self, PathError> {
        let ast = parser::parse(expression)?;
        Ok(Self {
            expression: Arc::from(expression),
            ast: Arc::new(ast),
        })
    }

    /// Evaluate against a document. Never fails; shape mismatches yield `null`.
    pub fn search(&self, data: &Value) -> Value {
        eval::evaluate(&self.ast, data).into_owned()
    }

    pub fn as_str(&self) -> &str {
        &self.expression
    }

    /// The field the expression starts from, if it starts with one.
    ///
    /// `resource.Name` and `Tags[0] | Key` lead with a field, `@.Name` and
    /// `[a, b]` do not.
    pub fn leading_field(&self) -> Option<&str> {
        let mut node = self.ast.as_ref();
        loop {
            match node {
                Ast::Field(name) => return Some(name),
                Ast::Subexpression(lhs, _)
                | Ast::Projection(lhs, _)
                | Ast::ValueProjection(lhs, _)
                | Ast::Flatten(lhs)
                | Ast::Pipe(lhs, _)
                | Ast::FilterProjection { lhs, .. } => node = lhs,
                _ => return None,
            }
        }
    }
}

impl fmt::Debug for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FieldPath").field(&self.expression).finish()
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

impl PartialEq for FieldPath {
    fn eq(&self, other: &Self) -> bool {
        self.expression == other.expression
    }
}

impl Eq for FieldPath {}

impl FromStr for FieldPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::compile(s)
    }
}

impl Serialize for FieldPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.expression)
    }
}

impl<'de> Deserialize<'de> for FieldPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let expression = String::deserialize(deserializer)?;
        Self::compile(&expression).map_err(serde::de::Error::custom)
    }
}
