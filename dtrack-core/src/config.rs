//! Graph configuration.

use serde::{Deserialize, Serialize};

/// Behaviour switches for a [`Graph`](crate::reactive::Graph).
///
/// Missing fields take their default when deserialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Binding an input marks the node dirty, so the next read pulls the new input.
    pub dirty_on_bind: bool,

    /// Destroying a watched cell dirties its watchers, which then read the
    /// input's default value on their next recomputation.
    pub invalidate_on_drop: bool,

    /// Registry groups to reserve node bookkeeping for up front.
    pub initial_groups: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            dirty_on_bind: true,
            invalidate_on_drop: true,
            initial_groups: 1,
        }
    }
}

impl GraphConfig {
    /// Parse a configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Set whether binding an input marks the node dirty.
    pub fn dirty_on_bind(mut self, enabled: bool) -> Self {
        self.dirty_on_bind = enabled;
        self
    }

    /// Set whether destroying a watched cell dirties its watchers.
    pub fn invalidate_on_drop(mut self, enabled: bool) -> Self {
        self.invalidate_on_drop = enabled;
        self
    }

    /// Set how many registry groups to reserve up front.
    pub fn initial_groups(mut self, groups: usize) -> Self {
        self.initial_groups = groups;
        self
    }
}
