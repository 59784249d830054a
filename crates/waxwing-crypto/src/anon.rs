//! Anonymous grouping key: a named set of principals without material.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Groups principals under an optional key id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnonKey {
    /// Principals in the group
    #[serde(default)]
    pub principals: BTreeSet<String>,
    /// Identifier of the key this group refers to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyid: Option<String>,
}

impl AnonKey {
    /// Group with the given principals.
    pub fn new(principals: impl IntoIterator<Item = String>) -> Self {
        Self { principals: principals.into_iter().collect(), keyid: None }
    }

    /// Attach a key id.
    #[must_use]
    pub fn with_keyid(mut self, keyid: impl Into<String>) -> Self {
        self.keyid = Some(keyid.into());
        self
    }
}
