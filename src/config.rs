//! Configuration management for the control engine
//!
//! TOML persistence for the daemon's tunables: poll cadence, backend
//! deadline, hysteresis margin, escalation bound, fan floor and the
//! snapshot log location.

use crate::error::{AegisError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Seconds between poll cycles
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Per-cycle sensor backend deadline in seconds
    #[serde(default = "default_backend_timeout")]
    pub backend_timeout_secs: u64,
    /// Hysteresis margin in degrees Celsius
    #[serde(default = "default_hysteresis_margin")]
    pub hysteresis_margin_celsius: f64,
    /// Consecutive critical cycles tolerated before forced escalation
    #[serde(default = "default_escalation_bound")]
    pub escalation_bound: u32,
    /// Minimum manual fan duty in percent
    #[serde(default = "default_fan_floor")]
    pub fan_floor_percent: u8,
    /// Drive fans from the thermal assessment each cycle
    #[serde(default = "default_true")]
    pub auto_fan_control: bool,
    /// Append-only snapshot log (one JSON object per line)
    #[serde(default = "default_snapshot_log")]
    pub snapshot_log_path: PathBuf,
    /// Runtime state directory (staged boot parameters)
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
}

// Default value functions
fn default_poll_interval() -> u64 {
    5
}

fn default_backend_timeout() -> u64 {
    3
}

fn default_hysteresis_margin() -> f64 {
    3.0
}

fn default_escalation_bound() -> u32 {
    3
}

fn default_fan_floor() -> u8 {
    20
}

fn default_true() -> bool {
    true
}

fn default_snapshot_log() -> PathBuf {
    PathBuf::from("/tmp/aegisd-snapshots.jsonl")
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("/run/aegisd")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            backend_timeout_secs: default_backend_timeout(),
            hysteresis_margin_celsius: default_hysteresis_margin(),
            escalation_bound: default_escalation_bound(),
            fan_floor_percent: default_fan_floor(),
            auto_fan_control: default_true(),
            snapshot_log_path: default_snapshot_log(),
            state_dir: default_state_dir(),
        }
    }
}

impl Config {
    /// Default configuration directory: `~/.config/aegisd`.
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = std::env::var("HOME")
            .map(|home| PathBuf::from(home).join(".config"))
            .unwrap_or_else(|_| PathBuf::from(".config"));
        Ok(config_dir.join("aegisd"))
    }

    /// Load configuration from the default path, falling back to defaults
    /// when no file exists.
    pub fn load() -> Result<Self> {
        let config_dir = Self::default_path()?;
        let config_file = config_dir.join("config.toml");

        if !config_file.exists() {
            return Ok(Self::default());
        }

        Self::load_from(&config_file)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)
            .map_err(|e| AegisError::Parse(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Save configuration to the default path.
    pub fn save(&self) -> Result<()> {
        let config_dir = Self::default_path()?;
        std::fs::create_dir_all(&config_dir)?;
        self.save_to(&config_dir.join("config.toml"))
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| AegisError::Other(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.backend_timeout_secs.max(1))
    }
}
