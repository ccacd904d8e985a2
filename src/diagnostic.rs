//! Structured diagnostics returned to callers
//!
//! Diagnostics are data, not errors: a failed compile returns all of them at
//! once so an automated repair loop can fix the payload and retry.

use std::fmt;

use serde::Serialize;

/// Which stage rejected the input
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// No structured document could be extracted
    Decode,
    /// Field-level shape or invariant violation caught before rendering
    Schema,
    /// Rendered text failed to parse or analyze
    Grammar,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    /// Field path, e.g. `program.clauses[2].body[1].left.value`
    pub path: String,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn schema(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Schema, path, message)
    }

    pub fn grammar(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Grammar, path, message)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Accumulating field path used by the validator
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldPath(String);

impl FieldPath {
    pub fn root(name: &str) -> Self {
        Self(name.to_string())
    }

    pub fn field(&self, name: &str) -> Self {
        if self.0.is_empty() {
            Self(name.to_string())
        } else {
            Self(format!("{}.{}", self.0, name))
        }
    }

    pub fn index(&self, i: usize) -> Self {
        Self(format!("{}[{}]", self.0, i))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
