//! Editor configuration
//!
//! Loaded from a JSON file at startup; missing files and missing keys fall back
//! to defaults.

use crate::constants::node::DEFAULT_COLOR;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// `env_logger` filter used when `RUST_LOG` is not set
    pub log_filter: String,
    /// Indent JSON graph files
    pub pretty_json: bool,
    /// Author stamped into the metadata of new graphs
    pub author: String,
    /// Color of newly added nodes, RGBA
    pub default_node_color: [u8; 4],
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            log_filter: "info".to_string(),
            pretty_json: true,
            author: String::new(),
            default_node_color: DEFAULT_COLOR,
        }
    }
}

impl EditorConfig {
    /// Load config from a JSON file, falling back to defaults
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(config) => {
                    info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    warn!("Failed to parse {}: {}, using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => {
                info!("No config at {}, using defaults", path.display());
                Self::default()
            }
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}
