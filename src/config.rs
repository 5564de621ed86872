//! Graph configuration.

use serde::{Deserialize, Serialize};

/// Behaviour switches for a [`Graph`](crate::Graph).
///
/// Every field has a default, so a partial JSON document is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Consistency violations (adding a present member, removing an absent
    /// one) are returned as errors instead of being logged and ignored.
    pub strict: bool,
    /// Accept remote payloads that list a member more than once.
    pub allow_duplicate_members: bool,
    /// `resetOnRemoteUpdate` for pairs whose schema says nothing.
    pub reset_on_remote_update: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            strict: cfg!(debug_assertions),
            allow_duplicate_members: true,
            reset_on_remote_update: true,
        }
    }
}

impl GraphConfig {
    /// Defaults with consistency violations as errors.
    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Self::default()
        }
    }

    /// Defaults with consistency violations tolerated.
    pub fn lenient() -> Self {
        Self {
            strict: false,
            ..Self::default()
        }
    }

    /// Parse from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
