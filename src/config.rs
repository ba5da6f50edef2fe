//! Configuration management with validation and defaults
//!
//! Loaded from an optional TOML file, then overridden by environment
//! variables, then validated.

use crate::errors::{ConfigurationError, RgsResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Complete server configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RgsConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub crash: CrashConfig,
    pub limits: LimitsConfig,
    pub logging: LoggingConfig,
}

/// HTTP listener settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8081,
            allowed_origins: vec!["*".to_string()],
            request_timeout_secs: 30,
        }
    }
}

/// Storage configuration with optimization settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_directory: String,
    pub write_buffer_size_mb: usize,
    pub max_write_buffer_number: usize,
    pub compression_type: CompressionType,
    /// fsync every settlement before acknowledging it
    pub sync_writes: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum CompressionType {
    None,
    Snappy,
    Lz4,
    Zstd,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_directory: "./data/rgs".to_string(),
            write_buffer_size_mb: 16,
            max_write_buffer_number: 2,
            compression_type: CompressionType::Lz4,
            sync_writes: true,
        }
    }
}

/// Crash round schedule
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CrashConfig {
    pub step_duration_ms: u64,
    pub step_increment: f64,
    /// Inclusive bounds of the crash step draw
    pub min_crash_step: i64,
    pub max_crash_step: i64,
}

impl Default for CrashConfig {
    fn default() -> Self {
        Self {
            step_duration_ms: 100,
            step_increment: 0.01,
            // 1.10x to 5.00x
            min_crash_step: 10,
            max_crash_step: 400,
        }
    }
}

impl CrashConfig {
    pub fn step_duration(&self) -> Duration {
        Duration::from_millis(self.step_duration_ms)
    }
}

/// Request limits enforced before any round is touched
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_stake: f64,
    pub max_round_id_len: usize,
    pub default_currency: String,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_stake: 1_000_000.0,
            max_round_id_len: 512,
            default_currency: "USD".to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive, `RUST_LOG` wins when set
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "rgs=info,tower_http=info".to_string(),
        }
    }
}

/// Configuration loader with environment variable support
#[derive(Default)]
pub struct ConfigLoader {
    config_path: Option<String>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Set the configuration file path
    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Load configuration from file and environment variables
    pub fn load(&self) -> RgsResult<RgsConfig> {
        let mut config = match self.config_path {
            Some(ref path) => Self::load_from_file(path)?,
            None => RgsConfig::default(),
        };

        Self::apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(config)
    }

    fn load_from_file(path: &str) -> RgsResult<RgsConfig> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to read {}: {}", path, e)))?;

        toml::from_str(&content)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to parse TOML: {}", e)).into())
    }

    fn apply_env_overrides(config: &mut RgsConfig) -> RgsResult<()> {
        if let Ok(dir) = env::var("RGS_DATA_DIR") {
            if !dir.is_empty() {
                config.storage.data_directory = dir;
            }
        }
        if let Ok(host) = env::var("RGS_HOST") {
            if !host.is_empty() {
                config.server.host = host;
            }
        }
        // PORT (hosting platforms) takes precedence over RGS_PORT
        if let Some(port) = env::var("PORT").ok().or_else(|| env::var("RGS_PORT").ok()) {
            config.server.port = port.parse().map_err(|_| ConfigurationError::InvalidValue {
                field: "server.port".to_string(),
                value: port.clone(),
                reason: "not a valid port number".to_string(),
            })?;
        }
        if let Ok(filter) = env::var("RGS_LOG") {
            if !filter.is_empty() {
                config.logging.filter = filter;
            }
        }
        Ok(())
    }
}

impl RgsConfig {
    pub fn validate(&self) -> RgsResult<()> {
        let crash = &self.crash;
        if crash.step_duration_ms == 0 {
            return Err(invalid("crash.step_duration_ms", &crash.step_duration_ms, "must be > 0"));
        }
        if !(crash.step_increment.is_finite() && crash.step_increment > 0.0) {
            return Err(invalid("crash.step_increment", &crash.step_increment, "must be > 0"));
        }
        if crash.min_crash_step < 1 {
            return Err(invalid("crash.min_crash_step", &crash.min_crash_step, "must be >= 1"));
        }
        if crash.max_crash_step < crash.min_crash_step {
            return Err(invalid(
                "crash.max_crash_step",
                &crash.max_crash_step,
                "must be >= crash.min_crash_step",
            ));
        }
        if !(self.limits.max_stake.is_finite() && self.limits.max_stake > 0.0) {
            return Err(invalid("limits.max_stake", &self.limits.max_stake, "must be > 0"));
        }
        if self.limits.max_round_id_len == 0 {
            return Err(invalid("limits.max_round_id_len", &0, "must be > 0"));
        }
        if self.storage.data_directory.trim().is_empty() {
            return Err(invalid("storage.data_directory", &"", "must not be empty"));
        }
        Ok(())
    }
}

fn invalid(field: &str, value: &dyn std::fmt::Display, reason: &str) -> crate::errors::RgsError {
    ConfigurationError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
    .into()
}
