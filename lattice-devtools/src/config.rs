//! Debugger configuration.
//!
//! Every field has a default, so a partial JSON document is enough:
//!
//! ```rust
//! use lattice_devtools::DebuggerConfig;
//!
//! let config = DebuggerConfig::from_json(r#"{"structureIntervalMs": 100}"#).unwrap();
//! assert_eq!(config.structure_interval_ms, 100);
//! assert_eq!(config.dgraph_throttle_ms, 200);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::walker::TreeWalkerMode;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DebuggerConfig {
    pub walker_mode: TreeWalkerMode,
    /// Record rendered elements of components during walks.
    pub gather_components: bool,
    /// Throttle of structure re-walks.
    pub structure_interval_ms: u64,
    /// Throttle of computation update batches.
    pub updates_interval_ms: u64,
    /// Throttle of inspector value batches.
    pub inspector_interval_ms: u64,
    /// Throttle of dependency graph re-extraction.
    pub dgraph_throttle_ms: u64,
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self {
            walker_mode: TreeWalkerMode::Owners,
            gather_components: true,
            structure_interval_ms: 250,
            updates_interval_ms: 16,
            inspector_interval_ms: 16,
            dgraph_throttle_ms: 200,
        }
    }
}

impl DebuggerConfig {
    pub fn from_json(input: &str) -> Result<Self> {
        Ok(serde_json::from_str(input)?)
    }

    pub fn structure_interval(&self) -> Duration {
        Duration::from_millis(self.structure_interval_ms)
    }

    pub fn updates_interval(&self) -> Duration {
        Duration::from_millis(self.updates_interval_ms)
    }

    pub fn inspector_interval(&self) -> Duration {
        Duration::from_millis(self.inspector_interval_ms)
    }

    pub fn dgraph_throttle(&self) -> Duration {
        Duration::from_millis(self.dgraph_throttle_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = DebuggerConfig::default();
        assert_eq!(config.structure_interval(), Duration::from_millis(250));
        assert_eq!(config.updates_interval(), Duration::from_millis(16));
        assert_eq!(config.walker_mode, TreeWalkerMode::Owners);
    }

    #[test]
    fn json_overrides_only_given_fields() {
        let json = r#"{"walkerMode": "components", "gatherComponents": false}"#;
        let config = DebuggerConfig::from_json(json).unwrap();
        assert_eq!(config.walker_mode, TreeWalkerMode::Components);
        assert!(!config.gather_components);
        assert_eq!(config.inspector_interval_ms, 16);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(DebuggerConfig::from_json("{").is_err());
    }
}
