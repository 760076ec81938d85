//! Configuration loading and typed config structures for the engine.
//!
//! The configuration lives in `stickian-config.yaml` next to the binary's
//! working directory. Every field has a default, so an empty file (or no
//! file at all) yields a runnable engine.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use uuid::Uuid;

/// Environment variable overriding `world.tick_interval_ms`.
pub const TICK_INTERVAL_ENV: &str = "STICKIAN_TICK_INTERVAL_MS";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The configuration parsed but holds an unusable value.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Explanation of what is wrong.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EngineConfig {
    /// World-level settings (name, timing, seed city).
    #[serde(default)]
    pub world: WorldConfig,

    /// Tick scheduler settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Admission settings.
    #[serde(default)]
    pub ingress: IngressConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Upgrade requests submitted for the seed city at startup.
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
}

impl EngineConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// `STICKIAN_TICK_INTERVAL_MS` overrides `world.tick_interval_ms`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value fails validation.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Self = serde_yml::from_str(&contents)?;
        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string, without environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value fails validation.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// production).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if an override is not a number.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(raw) = lookup(TICK_INTERVAL_ENV) {
            self.world.tick_interval_ms =
                raw.trim().parse().map_err(|err| ConfigError::Invalid {
                    reason: format!("{TICK_INTERVAL_ENV}={raw:?}: {err}"),
                })?;
        }
        Ok(())
    }

    /// Check values that deserialize fine but cannot drive the engine.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a zero tick interval or a zero
    /// catch-up capacity.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.world.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                reason: "world.tick_interval_ms must be at least 1".to_owned(),
            });
        }
        if self.scheduler.catch_up_capacity == 0 {
            return Err(ConfigError::Invalid {
                reason: "scheduler.catch_up_capacity must be at least 1".to_owned(),
            });
        }
        Ok(())
    }

    /// The configured tick period.
    pub const fn tick_period(&self) -> Duration {
        Duration::from_millis(self.world.tick_interval_ms)
    }
}

/// World-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorldConfig {
    /// Human-readable name of this engine instance.
    #[serde(default = "default_world_name")]
    pub name: String,

    /// Real-time milliseconds per tick.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Fixed identifier for the seeded starting city; random if absent.
    #[serde(default)]
    pub seed_city_id: Option<Uuid>,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            name: default_world_name(),
            tick_interval_ms: default_tick_interval_ms(),
            seed_city_id: None,
        }
    }
}

/// Tick scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SchedulerConfig {
    /// Clock firings that may queue while a tick is still processing.
    #[serde(default = "default_catch_up_capacity")]
    pub catch_up_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            catch_up_capacity: default_catch_up_capacity(),
        }
    }
}

/// Admission configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IngressConfig {
    /// Reject stale or unaffordable requests early against stored state.
    #[serde(default = "default_true")]
    pub precheck: bool,
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self { precheck: true }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Startup intents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BootstrapConfig {
    /// Upgrade requests submitted for the seed city once the engine is up.
    #[serde(default)]
    pub intents: Vec<BootstrapIntent>,
}

/// One startup upgrade request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BootstrapIntent {
    /// Building wire name (e.g. `farm`, `city_Hall`).
    pub building: String,
    /// Target level.
    pub level: u32,
}

fn default_world_name() -> String {
    String::from("stickian")
}

const fn default_tick_interval_ms() -> u64 {
    1000
}

const fn default_catch_up_capacity() -> usize {
    1
}

const fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    String::from("info")
}
