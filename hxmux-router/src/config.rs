//! Router configuration
//!
//! Routes and worker definitions arrive at runtime via `control.init`;
//! this file only covers process-level settings.

use std::path::Path;

use serde::Deserialize;
use tracing::warn;

use hxmux_protocol::DEFAULT_REQUEST_TIMEOUT_MS;
use hxmux_utils::{paths, HxmuxError, Result};

/// Process-level router configuration, loaded from TOML
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RouterConfig {
    /// Default timeout for in-flight native requests, in milliseconds.
    /// `control.init` may override this per initialization.
    pub request_timeout_ms: u64,

    /// Replace a failed worker session on the next routed request instead
    /// of reusing it. Off by default: a crashed worker degrades its route
    /// until re-init, which keeps the failure visible to operators.
    pub recreate_failed_sessions: bool,

    /// Capacity of the dispatch loop's inbound channel
    pub inbound_capacity: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            recreate_failed_sessions: false,
            inbound_capacity: 256,
        }
    }
}

impl RouterConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| HxmuxError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&raw).map_err(|e| HxmuxError::ConfigInvalid {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Load from the default XDG config path, falling back to defaults
    ///
    /// A missing file is normal; an unreadable or invalid file is logged
    /// and ignored so a bad config cannot keep the router from starting.
    pub fn load_default() -> Self {
        let path = paths::config_file();
        if !path.exists() {
            return Self::default();
        }

        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!("Ignoring invalid config {}: {}", path.display(), e);
                Self::default()
            }
        }
    }
}
