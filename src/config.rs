//! Player configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const CONFIG_DIR: &str = "mplayer-slave";
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("Failed to read config: {0}")]
  Io(#[from] std::io::Error),

  #[error("Failed to parse config: {0}")]
  Parse(#[from] serde_json::Error),

  #[error("Invalid config: {0}")]
  Invalid(String),
}

/// How to launch and talk to the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerConfig {
  /// Custom MPlayer executable path (None = auto-detect).
  #[serde(default)]
  pub executable: Option<String>,

  /// Command-line arguments. Must keep the engine in slave and idle mode.
  #[serde(default = "default_args")]
  pub args: Vec<String>,

  /// Volume (0-100) applied once the engine is ready.
  #[serde(default)]
  pub volume: Option<f64>,

  /// How often a pending query checks for answers.
  #[serde(default = "default_poll_interval_ms")]
  pub poll_interval_ms: u64,

  /// How long a query may wait for its answers.
  #[serde(default = "default_query_timeout_ms")]
  pub query_timeout_ms: u64,

  /// Bound on ready/play/pause/resume waits (None = wait forever).
  #[serde(default = "default_wait_timeout_ms")]
  pub wait_timeout_ms: Option<u64>,

  /// How long to wait after the interrupt before killing the engine.
  #[serde(default = "default_exit_grace_ms")]
  pub exit_grace_ms: u64,
}

fn default_args() -> Vec<String> {
  ["-idle", "-slave", "-msglevel", "statusline=-1", "-novideo"]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_poll_interval_ms() -> u64 {
  100
}

fn default_query_timeout_ms() -> u64 {
  2_000
}

fn default_wait_timeout_ms() -> Option<u64> {
  Some(30_000)
}

fn default_exit_grace_ms() -> u64 {
  5_000
}

impl Default for PlayerConfig {
  fn default() -> Self {
    Self {
      executable: None,
      args: default_args(),
      volume: None,
      poll_interval_ms: default_poll_interval_ms(),
      query_timeout_ms: default_query_timeout_ms(),
      wait_timeout_ms: default_wait_timeout_ms(),
      exit_grace_ms: default_exit_grace_ms(),
    }
  }
}

impl PlayerConfig {
  /// Load and validate a JSON config file.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    let config: Self = serde_json::from_str(&text)?;
    config.validate().map_err(ConfigError::Invalid)?;
    log::info!("Loaded player config from {:?}", path);
    Ok(config)
  }

  /// Validate configuration values.
  pub fn validate(&self) -> Result<(), String> {
    if let Some(exe) = &self.executable {
      if exe.trim().is_empty() {
        return Err("Executable path cannot be empty".to_string());
      }
    }
    if let Some(volume) = self.volume {
      if !(0.0..=100.0).contains(&volume) {
        return Err("Volume must be between 0 and 100".to_string());
      }
    }
    if self.poll_interval_ms == 0 {
      return Err("Poll interval must be at least 1 ms".to_string());
    }
    if self.query_timeout_ms < self.poll_interval_ms {
      return Err("Query timeout must not be shorter than the poll interval".to_string());
    }
    if self.wait_timeout_ms == Some(0) {
      return Err("Wait timeout must be positive (use null to disable)".to_string());
    }
    Ok(())
  }

  pub fn poll_interval(&self) -> Duration {
    Duration::from_millis(self.poll_interval_ms)
  }

  pub fn query_timeout(&self) -> Duration {
    Duration::from_millis(self.query_timeout_ms)
  }

  pub fn wait_timeout(&self) -> Option<Duration> {
    self.wait_timeout_ms.map(Duration::from_millis)
  }

  pub fn exit_grace(&self) -> Duration {
    Duration::from_millis(self.exit_grace_ms)
  }
}

/// Default location of the config file, under the user's config directory.
pub fn default_config_path() -> Option<PathBuf> {
  dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
}
