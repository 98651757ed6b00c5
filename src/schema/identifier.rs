//! Validated table and column names.
//!
//! The sqlite3 CLI can bind values but not identifiers, so names are
//! escaped with brackets and concatenated into the command text. Validation
//! is what keeps that concatenation from breaking out of the brackets.

use crate::error::{EngineError, Result};
use serde::{Serialize, Serializer};
use std::fmt;

/// Characters that may not appear in a name once its enclosing brackets are stripped.
const FORBIDDEN_CHARS: [char; 4] = ['[', ']', '"', '\''];

/// A table or column name that is safe to embed as `[name]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier {
    name: String,
}

/// Name of a table or view.
pub type TableName = Identifier;

/// Name of a column.
pub type ColumnName = Identifier;

impl Identifier {
    /// Validates a name.
    ///
    /// One layer of enclosing brackets is accepted and removed, so `[users]`
    /// and `users` are the same identifier. What remains must be non-empty
    /// and free of brackets and quotes.
    pub fn new(raw: impl AsRef<str>) -> Result<Self> {
        let raw = raw.as_ref();
        let name = strip_enclosing_brackets(raw);

        if name.is_empty() {
            return Err(EngineError::validation(format!(
                "Invalid identifier: '{raw}' is empty"
            )));
        }

        if name.contains(FORBIDDEN_CHARS) {
            return Err(EngineError::validation(format!(
                "Invalid identifier: '{name}'"
            )));
        }

        Ok(Self {
            name: name.to_string(),
        })
    }

    /// Returns the bare name.
    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// Returns the bracket-escaped form for concatenation into SQL.
    pub fn escaped(&self) -> String {
        format!("[{}]", self.name)
    }
}

fn strip_enclosing_brackets(raw: &str) -> &str {
    raw.strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .unwrap_or(raw)
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl Serialize for Identifier {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.name)
    }
}

impl TryFrom<&str> for Identifier {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

impl TryFrom<String> for Identifier {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}
