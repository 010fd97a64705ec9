// Local configuration for the presence engine.
//
// Global config: `~/.tandem/config.toml`

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tandem_common::tree::TreeSchema;
use tandem_common::types::{LocalIdentity, AWARENESS_PROTOCOL_VERSION};

use crate::dispatcher::debounce::DebounceConfig;
use crate::dispatcher::DispatcherConfig;

/// Root directory for Tandem global state: `~/.tandem/`.
pub fn global_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".tandem"))
}

/// Path to the global config file: `~/.tandem/config.toml`.
pub fn global_config_path() -> Option<PathBuf> {
    global_dir().map(|d| d.join("config.toml"))
}

// ── Global config ──────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GlobalConfig {
    /// Stable user id published in awareness entries.
    pub user_id: Option<String>,
    /// Default display name for this user.
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub presence: PresenceConfig,
    /// Attribute names used to recognise blocks and identity markers.
    pub schema: TreeSchema,
}

impl GlobalConfig {
    /// Load from `~/.tandem/config.toml`. Returns defaults if the file
    /// doesn't exist or can't be parsed.
    pub fn load() -> Self {
        global_config_path().and_then(|p| Self::load_from(&p).ok()).unwrap_or_default()
    }

    /// Load from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        toml::from_str(&contents).map_err(ConfigError::Parse)
    }

    /// Save to `~/.tandem/config.toml`.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = global_config_path().ok_or_else(|| {
            ConfigError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "could not determine home directory",
            ))
        })?;
        self.save_to(&path)
    }

    /// Save to a specific path (creates parent directories).
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::Io)?;
        }
        let contents = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path, contents).map_err(ConfigError::Io)
    }

    /// Local identity from configured values, or `None` without a user id.
    pub fn identity(&self) -> Option<LocalIdentity> {
        let user_id = self.user_id.clone()?;
        Some(LocalIdentity {
            display_name: self.display_name.clone().unwrap_or_else(|| user_id.clone()),
            avatar_url: self.avatar_url.clone().unwrap_or_default(),
            user_id,
        })
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            debounce: self.presence.debounce(),
            protocol_version: self.presence.protocol_version,
            schema: self.schema.clone(),
        }
    }
}

/// Presence publishing settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PresenceConfig {
    /// Cursor publish coalescing window in milliseconds (clamped to 50..=500).
    pub debounce_ms: u64,
    /// Version tag written into every awareness entry.
    pub protocol_version: u32,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self { debounce_ms: 100, protocol_version: AWARENESS_PROTOCOL_VERSION }
    }
}

impl PresenceConfig {
    pub fn debounce(&self) -> DebounceConfig {
        DebounceConfig::with_millis(self.debounce_ms)
    }
}

// ── Errors ─────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Serialize(toml::ser::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "config I/O error: {e}"),
            Self::Parse(e) => write!(f, "config parse error: {e}"),
            Self::Serialize(e) => write!(f, "config serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}
