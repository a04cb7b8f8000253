//! Message identifiers and their canonical byte encoding.
//!
//! The `_id` field of a payload is stringified before hashing:
//!   - JSON string  → its UTF-8 text, without quotes
//!   - JSON number  → its source text, digit for digit (`42`, `-7`, `1.5`,
//!     `1e2`, `18446744073709551616`)
//!   - anything else → rejected
//!
//! Numbers are not normalized: `1e2` and `100` are different identifiers.
//! Exact source text relies on serde_json's `arbitrary_precision` feature.
//!
//! The encoding decides which relay instance owns an identifier, so it must
//! never change once a fleet is deployed.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Payload field carrying the identifier.
pub const ID_FIELD: &str = "_id";

/// Canonical text form of a message identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentifierError {
    #[error("identifier must be a string or number, got {0}")]
    UnsupportedType(&'static str),
}

impl Identifier {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// Canonicalize a JSON `_id` value.
    pub fn from_json(value: &Value) -> Result<Self, IdentifierError> {
        match value {
            Value::String(s) => Ok(Self(s.clone())),
            Value::Number(n) => Ok(Self(n.to_string())),
            Value::Null => Err(IdentifierError::UnsupportedType("null")),
            Value::Bool(_) => Err(IdentifierError::UnsupportedType("bool")),
            Value::Array(_) => Err(IdentifierError::UnsupportedType("array")),
            Value::Object(_) => Err(IdentifierError::UnsupportedType("object")),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Bytes fed to the hash engine.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
