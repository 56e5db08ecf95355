//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use crate::services::reducer::ClassificationPolicy;
use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
pub struct ClassificationConfig {
    #[serde(default = "default_high_accuracy_m")]
    pub high_accuracy_m: f32,
    #[serde(default = "default_medium_accuracy_m")]
    pub medium_accuracy_m: f32,
    /// Fixes less accurate than this produce no derived location
    #[serde(default = "default_max_acceptable_accuracy_m")]
    pub max_acceptable_accuracy_m: f32,
    #[serde(default = "default_moving_speed_mps")]
    pub moving_speed_mps: f32,
}

fn default_high_accuracy_m() -> f32 {
    10.0
}

fn default_medium_accuracy_m() -> f32 {
    30.0
}

fn default_max_acceptable_accuracy_m() -> f32 {
    50.0
}

fn default_moving_speed_mps() -> f32 {
    0.5
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            high_accuracy_m: default_high_accuracy_m(),
            medium_accuracy_m: default_medium_accuracy_m(),
            max_acceptable_accuracy_m: default_max_acceptable_accuracy_m(),
            moving_speed_mps: default_moving_speed_mps(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Desired interval between provider updates
    #[serde(default = "default_update_interval_ms")]
    pub update_interval_ms: u64,
    #[serde(default = "default_update_interval_ms")]
    pub min_update_interval_ms: u64,
    /// Maximum batching delay the provider may apply
    #[serde(default = "default_max_update_delay_ms")]
    pub max_update_delay_ms: u64,
    /// JSON Lines file of fixes to replay (synthetic route when unset)
    #[serde(default)]
    pub replay_file: Option<String>,
    #[serde(default = "default_has_permission")]
    pub has_permission: bool,
}

fn default_update_interval_ms() -> u64 {
    8000
}

fn default_max_update_delay_ms() -> u64 {
    10000
}

fn default_has_permission() -> bool {
    true
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            update_interval_ms: default_update_interval_ms(),
            min_update_interval_ms: default_update_interval_ms(),
            max_update_delay_ms: default_max_update_delay_ms(),
            replay_file: None,
            has_permission: default_has_permission(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Latest fix plus burst slots; oldest is dropped on overflow
    #[serde(default = "default_relay_capacity")]
    pub capacity: usize,
}

fn default_relay_capacity() -> usize {
    6
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self { capacity: default_relay_capacity() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Periodic metrics report interval (0 to disable)
    #[serde(default = "default_metrics_interval_secs")]
    pub interval_secs: u64,
}

fn default_metrics_interval_secs() -> u64 {
    10
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval_secs() }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub classification: ClassificationConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    classification: ClassificationPolicy,
    update_interval_ms: u64,
    min_update_interval_ms: u64,
    max_update_delay_ms: u64,
    replay_file: Option<String>,
    has_permission: bool,
    relay_capacity: usize,
    log_level: String,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    /// Determine config file path from args or environment
    pub fn resolve_config_path(args: &[String]) -> String {
        for (i, arg) in args.iter().enumerate() {
            if arg == "--config" {
                if let Some(path) = args.get(i + 1) {
                    return path.clone();
                }
            }
            if let Some(path) = arg.strip_prefix("--config=") {
                return path.to_string();
            }
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        let c = toml_config.classification;
        Self {
            classification: ClassificationPolicy {
                high_accuracy_m: c.high_accuracy_m,
                medium_accuracy_m: c.medium_accuracy_m,
                max_acceptable_accuracy_m: c.max_acceptable_accuracy_m,
                moving_speed_mps: c.moving_speed_mps,
            },
            update_interval_ms: toml_config.source.update_interval_ms,
            min_update_interval_ms: toml_config.source.min_update_interval_ms,
            max_update_delay_ms: toml_config.source.max_update_delay_ms,
            replay_file: toml_config.source.replay_file,
            has_permission: toml_config.source.has_permission,
            relay_capacity: toml_config.relay.capacity.max(1),
            log_level: toml_config.logging.level,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            config_file,
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        let config = Self::from_toml(toml_config, path.display().to_string());
        config.classification.validate()?;
        Ok(config)
    }

    /// Load from an explicit path, falling back to defaults on any error
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{:#}", e), "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }

    pub fn classification(&self) -> &ClassificationPolicy {
        &self.classification
    }

    pub fn update_interval_ms(&self) -> u64 {
        self.update_interval_ms
    }

    pub fn min_update_interval_ms(&self) -> u64 {
        self.min_update_interval_ms
    }

    pub fn max_update_delay_ms(&self) -> u64 {
        self.max_update_delay_ms
    }

    pub fn replay_file(&self) -> Option<&str> {
        self.replay_file.as_deref()
    }

    pub fn has_permission(&self) -> bool {
        self.has_permission
    }

    pub fn relay_capacity(&self) -> usize {
        self.relay_capacity
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Override the replay file (CLI flag)
    pub fn with_replay_file(mut self, path: impl Into<String>) -> Self {
        self.replay_file = Some(path.into());
        self
    }

    /// Override the update interval (CLI flag); the minimum interval follows it down
    pub fn with_update_interval_ms(mut self, ms: u64) -> Self {
        self.update_interval_ms = ms;
        self.min_update_interval_ms = self.min_update_interval_ms.min(ms);
        self
    }
}
