//! Engine configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Keep triggered records in the store instead of deleting them after
    /// dispatch.
    #[serde(default)]
    pub retain_triggered: bool,
}
