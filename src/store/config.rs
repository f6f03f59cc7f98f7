//! Store configuration (`config.toml`).

use serde::{Deserialize, Serialize};

use crate::version::APP_VERSION;

/// Persisted engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Engine metadata.
    pub tohru: Tohru,
    /// Behavior toggles.
    pub options: Options,
}

/// `[tohru]` table: engine metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Tohru {
    /// Version the config was written by; checked for compatibility on load.
    pub version: String,
}

/// `[options]` table: behavior toggles.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Persist backups of objects an apply would otherwise destroy. When
    /// disabled, clobbering requires `--force` and is unrecoverable.
    pub backup: bool,
    /// Automatically sweep unreferenced backup objects after load/unload.
    pub clean: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tohru: Tohru::default(),
            options: Options::default(),
        }
    }
}

impl Default for Tohru {
    fn default() -> Self {
        Self {
            version: APP_VERSION.to_string(),
        }
    }
}

impl Default for Options {
    fn default() -> Self {
        Self {
            backup: true,
            clean: true,
        }
    }
}
