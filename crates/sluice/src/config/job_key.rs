//! Job identifier.

use serde::{Deserialize, Serialize};
use sluice_core::ComponentKey;
use std::fmt;

/// Identifier of a validation job in the `jobs:` map.
///
/// Used as the `target` of every log line a job emits and as the `job`
/// metrics label.
#[derive(Debug, Clone, Eq, Hash, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobKey(ComponentKey);

impl JobKey {
    pub fn new(id: impl Into<String>) -> Self {
        Self(ComponentKey::new(id))
    }

    pub fn id(&self) -> &str {
        self.0.id()
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for JobKey {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_map_key() {
        let map: indexmap::IndexMap<JobKey, u32> =
            serde_yaml::from_str("saas: 1\nbox: 2\n").unwrap();
        let keys: Vec<&str> = map.keys().map(JobKey::id).collect();
        assert_eq!(keys, vec!["saas", "box"]);
    }

    #[test]
    fn test_ordering_and_display() {
        assert!(JobKey::new("alpha") < JobKey::new("beta"));
        assert_eq!(JobKey::new("saas").to_string(), "saas");
    }
}
