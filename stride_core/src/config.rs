//! Configuration file support for Stride.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/stride/config.toml`.

use crate::{Error, Platform, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub animation: AnimationTimings,

    #[serde(default)]
    pub dev: DevConfig,
}

/// Which backend answers step queries
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// The platform health API (or a record file standing in for it)
    HealthConnect,
    /// Fixed placeholder counts for platforms without a health API
    Placeholder,
}

/// Health provider configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_kind")]
    pub kind: ProviderKind,

    /// CSV file of step records backing the provider
    #[serde(default)]
    pub records_csv: Option<PathBuf>,

    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    #[serde(default = "default_placeholder_today")]
    pub placeholder_today: u64,

    #[serde(default = "default_placeholder_yesterday")]
    pub placeholder_yesterday: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: default_provider_kind(),
            records_csv: None,
            fetch_timeout_ms: default_fetch_timeout_ms(),
            placeholder_today: default_placeholder_today(),
            placeholder_yesterday: default_placeholder_yesterday(),
        }
    }
}

impl ProviderConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

/// Background sync configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

impl SyncConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Animation timings, in milliseconds
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnimationTimings {
    pub counter_delay: u64,
    pub counter_duration: u64,
    pub progress_delay: u64,
    pub progress_duration: u64,
    pub level_fill_duration: u64,
    pub level_hold: u64,
    pub level_reset_duration: u64,
    pub level_refill_duration: u64,
    pub flash_duration: u64,
    pub frame_interval: u64,
}

impl Default for AnimationTimings {
    fn default() -> Self {
        Self {
            counter_delay: 300,
            counter_duration: 800,
            progress_delay: 300,
            progress_duration: 500,
            level_fill_duration: 300,
            level_hold: 150,
            level_reset_duration: 200,
            level_refill_duration: 500,
            flash_duration: 300,
            frame_interval: 16,
        }
    }
}

impl AnimationTimings {
    pub fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    /// Sampling cadence for renderers (~60 Hz by default)
    pub fn frame_interval(&self) -> Duration {
        Self::ms(self.frame_interval.max(1))
    }
}

/// Development helpers
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DevConfig {
    /// Synthetic steps added per inflation bump
    #[serde(default = "default_inflate_steps")]
    pub inflate_steps: u64,
}

impl Default for DevConfig {
    fn default() -> Self {
        Self {
            inflate_steps: default_inflate_steps(),
        }
    }
}

// Default value functions
fn default_provider_kind() -> ProviderKind {
    if Platform::current().supports_health_connect() {
        ProviderKind::HealthConnect
    } else {
        ProviderKind::Placeholder
    }
}

fn default_fetch_timeout_ms() -> u64 {
    10_000
}

fn default_placeholder_today() -> u64 {
    8754
}

fn default_placeholder_yesterday() -> u64 {
    7432
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_inflate_steps() -> u64 {
    500
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!(
                "No config file found at {:?}, using defaults",
                config_path
            );
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> Result<PathBuf> {
        let base = match dirs::config_dir() {
            Some(dir) => dir,
            None => {
                let home = std::env::var("HOME").map_err(|_| {
                    Error::Config("HOME environment variable not set".into())
                })?;
                PathBuf::from(home).join(".config")
            }
        };
        Ok(base.join("stride").join("config.toml"))
    }

    /// Reject values that would stall syncing or the animation clock
    pub fn validate(&self) -> Result<()> {
        if self.provider.fetch_timeout_ms == 0 {
            return Err(Error::Config("provider.fetch_timeout_ms must be > 0".into()));
        }
        if self.sync.poll_interval_secs == 0 {
            return Err(Error::Config("sync.poll_interval_secs must be > 0".into()));
        }
        if self.animation.frame_interval == 0 {
            return Err(Error::Config("animation.frame_interval must be > 0".into()));
        }
        Ok(())
    }

    /// Save the current configuration to the default path
    pub fn save(&self) -> Result<()> {
        let config_path = Self::default_config_path()?;
        self.save_to(&config_path)
    }

    /// Save the current configuration to a specific path
    ///
    /// Writes to a temp file in the same directory, then renames over the target.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| Error::Config(format!("config path {:?} has no parent", path)))?;
        std::fs::create_dir_all(parent)?;

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

        let mut temp = NamedTempFile::new_in(parent)?;
        temp.write_all(contents.as_bytes())?;
        temp.as_file().sync_all()?;
        temp.persist(path).map_err(|e| Error::Io(e.error))?;

        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }
}
