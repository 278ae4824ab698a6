//! Application configuration.
//!
//! Settings are read from a JSON `settings.json` file. Every field has a
//! default, so a missing file or a partial file is valid. A handful of
//! deployment values can be overridden from the environment:
//!
//! - `TAPSYNC_CONFIG`: path of the settings file
//! - `TAPSYNC_ROOM`: relay room id
//! - `TAPSYNC_API_BASE`: base URL of the collector API
//! - `TAPSYNC_BIND`: listen address of the collector server
//! - `TAPSYNC_DATA_DIR`: storage root of the collector server

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default settings file name inside the config directory.
pub const SETTINGS_FILE: &str = "settings.json";

/// Errors that can occur while loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid value for {key}: {value}")]
    InvalidOverride { key: &'static str, value: String },
}

/// Click task parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TaskConfig {
    /// Numbers per trial (participant presses 1..=total)
    pub total: u32,
    /// Grid width in cells
    pub cols: u32,
    /// Triggers due while `next_expected > total - carry_margin` are deferred
    /// to the next trial. 0 fires anywhere.
    pub carry_margin: u32,
    /// Number of completed trials kept in the rolling history
    pub history_size: usize,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            total: 10,
            cols: 5,
            carry_margin: 5,
            history_size: 5,
        }
    }
}

/// Trigger scheduler timing (all milliseconds)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SchedulerConfig {
    /// Resolution of the due-check loop
    pub poll_interval_ms: u64,
    /// Delay between sending a trigger and playing the audible cue
    pub cue_delay_ms: u64,
    /// Delay between the cue and the spoken prompt
    pub prompt_delay_ms: u64,
    /// How long before the prompt the clip recorder starts
    pub clip_lead_ms: u64,
    /// Total length of a clip recording
    pub clip_window_ms: u64,
    /// Grace period after the final cue before the session may end
    pub end_grace_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 50,
            cue_delay_ms: 1000,
            prompt_delay_ms: 5000,
            clip_lead_ms: 1000,
            clip_window_ms: 21_000,
            end_grace_ms: 30_000,
        }
    }
}

impl SchedulerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn cue_delay(&self) -> Duration {
        Duration::from_millis(self.cue_delay_ms)
    }

    /// Offset of the clip start, measured from the cue
    pub fn clip_start_after_cue(&self) -> Duration {
        Duration::from_millis(self.prompt_delay_ms.saturating_sub(self.clip_lead_ms))
    }

    pub fn prompt_delay(&self) -> Duration {
        Duration::from_millis(self.prompt_delay_ms)
    }

    pub fn clip_window(&self) -> Duration {
        Duration::from_millis(self.clip_window_ms)
    }

    /// Delay from the final trigger to the end unlock
    pub fn end_unlock_delay(&self) -> Duration {
        Duration::from_millis(self.cue_delay_ms + self.end_grace_ms)
    }
}

/// Event relay client settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RelayConfig {
    /// Room shared by the task device and the screen device
    pub room_id: String,
    /// Base URL of the collector API, e.g. `http://127.0.0.1:8787/api`
    pub api_base: String,
    /// Screen-side poll interval
    pub poll_interval_ms: u64,
    /// Max events fetched per poll
    pub poll_limit: u32,
    /// Per-request timeout
    pub request_timeout_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            room_id: "dev-room".to_string(),
            api_base: "http://127.0.0.1:8787/api".to_string(),
            poll_interval_ms: 250,
            poll_limit: 200,
            request_timeout_ms: 10_000,
        }
    }
}

/// Screen device display timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScreenConfig {
    /// How long one stimulus stays visible
    pub display_ms: u64,
    /// Gap before a queued stimulus is shown
    pub queue_gap_ms: u64,
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self {
            display_ms: 4000,
            queue_gap_ms: 50,
        }
    }
}

/// Audio settings for the task device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AudioConfig {
    /// Capture microphone audio at all
    pub enabled: bool,
    /// Directory holding `<prompt_id>.wav` prompt files
    pub prompt_dir: PathBuf,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            prompt_dir: PathBuf::from("prompts"),
        }
    }
}

/// Collector server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerConfig {
    /// Listen address
    pub bind: String,
    /// Root for `_events`, `audio`, `question_clips`, `tasklog`, `textlog`
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8787".to_string(),
            data_dir: dirs::data_dir()
                .map(|d| d.join("tapsync"))
                .unwrap_or_else(|| PathBuf::from(".").join("tapsync-data")),
        }
    }
}

/// Complete configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppConfig {
    pub task: TaskConfig,
    pub scheduler: SchedulerConfig,
    pub relay: RelayConfig,
    pub screen: ScreenConfig,
    pub audio: AudioConfig,
    pub server: ServerConfig,
}

impl AppConfig {
    /// Load configuration from the default location, then apply environment
    /// overrides. A missing settings file yields defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = settings_path();
        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            crate::debug!("No settings file at {}, using defaults", path.display());
            Self::default()
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Parse a settings file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `TAPSYNC_*` environment overrides
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(room) = std::env::var("TAPSYNC_ROOM") {
            if room.trim().is_empty() {
                return Err(ConfigError::InvalidOverride {
                    key: "TAPSYNC_ROOM",
                    value: room,
                });
            }
            self.relay.room_id = room;
        }
        if let Ok(base) = std::env::var("TAPSYNC_API_BASE") {
            if !base.starts_with("http://") && !base.starts_with("https://") {
                return Err(ConfigError::InvalidOverride {
                    key: "TAPSYNC_API_BASE",
                    value: base,
                });
            }
            self.relay.api_base = base.trim_end_matches('/').to_string();
        }
        if let Ok(bind) = std::env::var("TAPSYNC_BIND") {
            if bind.parse::<std::net::SocketAddr>().is_err() {
                return Err(ConfigError::InvalidOverride {
                    key: "TAPSYNC_BIND",
                    value: bind,
                });
            }
            self.server.bind = bind;
        }
        if let Ok(dir) = std::env::var("TAPSYNC_DATA_DIR") {
            self.server.data_dir = PathBuf::from(dir);
        }
        Ok(())
    }
}

/// Resolve the settings file path
pub fn settings_path() -> PathBuf {
    if let Ok(path) = std::env::var("TAPSYNC_CONFIG") {
        return PathBuf::from(path);
    }
    dirs::config_dir()
        .map(|d| d.join("tapsync"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join(SETTINGS_FILE)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
