//! Component identifiers.
//!
//! Keys appear in log fields and metric labels, so they are restricted to
//! a non-empty run of visible characters without whitespace.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one configured component (a job).
#[derive(Debug, Clone, Eq, Hash, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ComponentKey(String);

impl ComponentKey {
    /// Create a key without validation (tests and programmatic callers).
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ComponentKey {
    type Error = String;

    fn try_from(id: String) -> Result<Self, Self::Error> {
        if id.is_empty() {
            return Err("component key must not be empty".to_string());
        }
        if id.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(format!("component key {id:?} contains whitespace"));
        }
        Ok(Self(id))
    }
}

impl From<ComponentKey> for String {
    fn from(key: ComponentKey) -> Self {
        key.0
    }
}

impl fmt::Display for ComponentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ComponentKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
