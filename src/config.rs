//! Configuration system using TOML files.
//!
//! Config is stored in the OS-standard config directory:
//! - Windows: %APPDATA%\queue-minder\config.toml
//! - macOS: ~/Library/Application Support/queue-minder/config.toml
//! - Linux: ~/.config/queue-minder/config.toml
//!
//! Every section falls back to defaults, so a partial file is fine.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Queue storage and controller settings
    pub queue: QueueConfig,

    /// Change notification settings
    pub notifier: NotifierConfig,

    /// Drag-to-reorder settings
    pub drag: DragConfig,
}

/// Queue storage and controller settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// SQLite file holding the persisted queue (None = data dir default)
    pub database_path: Option<PathBuf>,

    /// A durable write running longer than this is logged as slow, in milliseconds
    pub persist_timeout_ms: u64,

    /// Number of mutation requests that may wait for the controller
    pub command_buffer: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            persist_timeout_ms: 2000,
            command_buffer: 64,
        }
    }
}

impl QueueConfig {
    /// Persistence timeout as a [`Duration`].
    pub fn persist_timeout(&self) -> Duration {
        Duration::from_millis(self.persist_timeout_ms.max(1))
    }

    /// Resolve the database file, falling back to the data directory.
    pub fn database_path(&self) -> PathBuf {
        self.database_path.clone().unwrap_or_else(|| {
            data_dir()
                .map(|d| d.join(crate::db::DEFAULT_DB_NAME))
                .unwrap_or_else(|| PathBuf::from(crate::db::DEFAULT_DB_NAME))
        })
    }
}

/// Change notification settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// Pending events held per subscriber before collapsing to a resync
    pub subscriber_capacity: usize,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            subscriber_capacity: 64,
        }
    }
}

/// Default maximum auto-scroll speed while dragging near an edge.
pub const DEFAULT_MAX_SCROLL_SPEED: f32 = 3.0;

/// Default edge zone, as a fraction of the visible list height.
pub const DEFAULT_EDGE_THRESHOLD: f32 = 0.33;

/// Drag-to-reorder settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DragConfig {
    /// Auto-scroll speed when the pointer touches the edge
    pub max_scroll_speed: f32,

    /// Fraction of the visible height (from each edge) where auto-scroll kicks in
    pub edge_threshold: f32,
}

impl Default for DragConfig {
    fn default() -> Self {
        Self {
            max_scroll_speed: DEFAULT_MAX_SCROLL_SPEED,
            edge_threshold: DEFAULT_EDGE_THRESHOLD,
        }
    }
}

impl DragConfig {
    /// Return a copy with out-of-range values replaced.
    ///
    /// The speed must be a positive finite number; the threshold is clamped
    /// into `(0, 0.5]` so the two edge zones never overlap.
    pub fn validated(self) -> Self {
        let max_scroll_speed = if self.max_scroll_speed.is_finite() && self.max_scroll_speed > 0.0
        {
            self.max_scroll_speed
        } else {
            tracing::warn!(
                value = self.max_scroll_speed,
                "Invalid drag max_scroll_speed, using default"
            );
            DEFAULT_MAX_SCROLL_SPEED
        };

        let edge_threshold = if self.edge_threshold.is_finite() && self.edge_threshold > 0.0 {
            self.edge_threshold.min(0.5)
        } else {
            tracing::warn!(
                value = self.edge_threshold,
                "Invalid drag edge_threshold, using default"
            );
            DEFAULT_EDGE_THRESHOLD
        };

        Self {
            max_scroll_speed,
            edge_threshold,
        }
    }
}

// ============================================================================
// Config File Operations
// ============================================================================

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("queue-minder"))
}

/// Get the data directory path (database lives here)
pub fn data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("queue-minder"))
}

/// Get the full path to the config file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Load configuration from disk
///
/// Returns default config if file doesn't exist or can't be parsed.
/// Logs warnings but doesn't fail - we always return a usable config.
pub fn load() -> Config {
    let Some(path) = config_path() else {
        tracing::warn!("Could not determine config directory, using defaults");
        return Config::default();
    };
    load_from(&path)
}

/// Load configuration from a specific file, with the same fallback rules as [`load`].
pub fn load_from(path: &std::path::Path) -> Config {
    if !path.exists() {
        tracing::info!("No config file found at {:?}, using defaults", path);
        return Config::default();
    }

    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str::<Config>(&contents) {
            Ok(mut config) => {
                config.drag = config.drag.validated();
                tracing::info!("Loaded config from {:?}", path);
                config
            }
            Err(e) => {
                tracing::error!("Failed to parse config file {:?}: {}", path, e);
                tracing::warn!("Using default configuration");
                Config::default()
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file {:?}: {}", path, e);
            Config::default()
        }
    }
}

/// Save configuration to disk
///
/// Creates the config directory if it doesn't exist.
pub fn save(config: &Config) -> Result<(), ConfigError> {
    let path = config_path().ok_or(ConfigError::NoConfigDir)?;
    save_to(config, &path)
}

/// Save configuration to a specific file.
pub fn save_to(config: &Config, path: &std::path::Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| ConfigError::CreateDir(dir.to_path_buf(), e))?;
    }

    let contents = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;

    // Write atomically (write to temp, then rename)
    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, &contents).map_err(|e| ConfigError::Write(temp_path.clone(), e))?;
    std::fs::rename(&temp_path, path)
        .map_err(|e| ConfigError::Rename(temp_path, path.to_path_buf(), e))?;

    tracing::info!("Saved config to {:?}", path);
    Ok(())
}

// ============================================================================
// Error Types
// ============================================================================

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to create config directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),

    #[error("Failed to write config to {0}: {1}")]
    Write(PathBuf, std::io::Error),

    #[error("Failed to rename temp file {0} to {1}: {2}")]
    Rename(PathBuf, PathBuf, std::io::Error),
}

impl From<ConfigError> for crate::error::Error {
    fn from(e: ConfigError) -> Self {
        crate::error::Error::config(e.to_string())
    }
}

// ============================================================================
// Tests
// ============================================================================
