//! Configuration management for the seatlock engine.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/seatlock/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Cooldown applied between trial logins when the feature is switched on
/// (24 hours).
pub const DEFAULT_TRIAL_COOLDOWN_MS: u64 = 86_400_000;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("trial account_id must not be empty")]
    EmptyTrialAccount,

    #[error("trial duration_ms must be greater than 0, got {0}")]
    InvalidTrialDuration(u64),

    #[error("trial reuse_cooldown_ms must be greater than 0 when set, got {0}")]
    InvalidTrialCooldown(u64),

    #[error("poll_interval_ms must be between 1000 and 10000, got {0}")]
    InvalidPollInterval(u64),

    #[error("poll_interval_ms ({poll_ms}) must be below trial duration_ms ({trial_ms})")]
    PollExceedsTrialDuration { poll_ms: u64, trial_ms: u64 },

    #[error("claim_ttl_ms must be greater than 0, got {0}")]
    InvalidClaimTtl(u64),

    #[error("heartbeat_interval_ms ({heartbeat_ms}) must be nonzero and below claim_ttl_ms ({claim_ttl_ms})")]
    InvalidHeartbeat { heartbeat_ms: u64, claim_ttl_ms: u64 },

    #[error("registry url must start with ws:// or wss://, got {0}")]
    InvalidRegistryUrl(String),

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Main configuration structure for the seatlock engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// General engine configuration.
    pub engine: EngineConfig,

    /// Trial account policy.
    pub trial: TrialConfig,

    /// Session supervision intervals and arbitration switches.
    pub session: SessionConfig,

    /// Cross-context registry connection.
    pub registry: RegistryConfig,
}

/// General engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory for engine data (device id, session store, logs).
    pub data_dir: PathBuf,

    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,
}

/// Trial account policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrialConfig {
    /// The reserved trial account id. Logins matching it (after
    /// normalization) get the countdown and last-login-wins arbitration.
    pub account_id: String,

    /// Trial session length in milliseconds.
    pub duration_ms: u64,

    /// Minimum gap between the end of one trial session and the next trial
    /// login, in milliseconds. Absent means no cooldown is enforced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reuse_cooldown_ms: Option<u64>,
}

/// Session supervision configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Fallback validation interval in milliseconds. Registry change
    /// notifications carry conflict detection; this poll backstops them.
    pub poll_interval_ms: u64,

    /// Interval between seat claim heartbeat refreshes, in milliseconds.
    pub heartbeat_interval_ms: u64,

    /// Age past which a claim with no heartbeat counts as abandoned, in
    /// milliseconds.
    pub claim_ttl_ms: u64,

    /// Whether standard (non-trial) accounts also get single-seat
    /// enforcement: a login evicts claims held by other devices. Trial
    /// accounts always enforce regardless of this switch.
    pub enforce_standard_single_seat: bool,
}

/// Cross-context registry connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RegistryConfig {
    /// WebSocket URL of the registry server. Absent means the engine runs
    /// against an in-process registry only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: "info".to_string(),
        }
    }
}

impl Default for TrialConfig {
    fn default() -> Self {
        Self {
            account_id: "trial@seatlock.dev".to_string(),
            duration_ms: 120_000,
            reuse_cooldown_ms: None,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5_000,
            heartbeat_interval_ms: 30_000,
            claim_ttl_ms: 90_000,
            enforce_standard_single_seat: true,
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { url: None }
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("seatlock")
        .join("config.toml")
}

/// Returns the default data directory path.
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("seatlock")
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - SEATLOCK_REGISTRY_URL: Override registry server URL
    /// - SEATLOCK_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    /// - SEATLOCK_DATA_DIR: Override the engine data directory
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("SEATLOCK_REGISTRY_URL") {
            if !url.is_empty() {
                tracing::info!("Overriding registry url from environment: {}", url);
                self.registry.url = Some(url);
            }
        }

        if let Ok(level) = std::env::var("SEATLOCK_LOG_LEVEL") {
            if !level.is_empty() {
                tracing::info!("Overriding log_level from environment: {}", level);
                self.engine.log_level = level;
            }
        }

        if let Ok(dir) = std::env::var("SEATLOCK_DATA_DIR") {
            if !dir.is_empty() {
                tracing::info!("Overriding data_dir from environment: {}", dir);
                self.engine.data_dir = PathBuf::from(dir);
            }
        }
    }

    /// Validate the configuration values.
    ///
    /// Returns an error if any configuration value is outside the valid range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate trial account id
        if self.trial.account_id.trim().is_empty() {
            return Err(ConfigError::EmptyTrialAccount);
        }

        // Validate trial duration: > 0
        if self.trial.duration_ms == 0 {
            return Err(ConfigError::InvalidTrialDuration(self.trial.duration_ms));
        }

        // Validate cooldown when configured: > 0
        if let Some(cooldown) = self.trial.reuse_cooldown_ms {
            if cooldown == 0 {
                return Err(ConfigError::InvalidTrialCooldown(cooldown));
            }
        }

        // Validate poll interval: 1-10 seconds
        let poll = self.session.poll_interval_ms;
        if !(1_000..=10_000).contains(&poll) {
            return Err(ConfigError::InvalidPollInterval(poll));
        }

        // The poll must get at least one chance to run inside a trial window
        if poll >= self.trial.duration_ms {
            return Err(ConfigError::PollExceedsTrialDuration {
                poll_ms: poll,
                trial_ms: self.trial.duration_ms,
            });
        }

        // Validate claim ttl: > 0
        if self.session.claim_ttl_ms == 0 {
            return Err(ConfigError::InvalidClaimTtl(self.session.claim_ttl_ms));
        }

        // Validate heartbeat: nonzero, and a claim must outlive one beat
        let heartbeat = self.session.heartbeat_interval_ms;
        if heartbeat == 0 || heartbeat >= self.session.claim_ttl_ms {
            return Err(ConfigError::InvalidHeartbeat {
                heartbeat_ms: heartbeat,
                claim_ttl_ms: self.session.claim_ttl_ms,
            });
        }

        // Validate registry url format when configured
        if let Some(url) = &self.registry.url {
            if !url.starts_with("ws://") && !url.starts_with("wss://") {
                return Err(ConfigError::InvalidRegistryUrl(url.clone()));
            }
        }

        // Validate log_level is a known value
        let level = self.engine.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.engine.log_level.clone()));
        }

        Ok(())
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    /// If the file exists but is invalid TOML, returns an error with
    /// a helpful message.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    ///
    /// The default path is `~/.config/seatlock/config.toml`.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Save configuration to the default path.
    pub fn save_default(&self) -> Result<()> {
        self.save(default_config_path())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}
