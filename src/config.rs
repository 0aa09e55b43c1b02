// Configuration File Support
//
// TOML configuration for the hookrelay daemon with environment variable
// overrides. The default file lives in the XDG config directory:
// ~/.config/hookrelay/config.toml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::webhooks::RetryConfig;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Delivery and retry configuration
    pub delivery: DeliveryConfig,

    /// Registration rate limiting
    pub rate_limit: RateLimitConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3001".to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Convert the level string to tracing::Level
    pub fn tracing_level(&self) -> Result<tracing::Level> {
        self.level
            .to_lowercase()
            .parse()
            .map_err(|e| anyhow::anyhow!("Failed to parse log level: {}", e))
    }
}

/// Delivery configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Attempts per delivery chain, including the first
    pub max_retries: u32,

    /// Delay before the first retry; doubles on every further retry
    pub base_delay_ms: u64,

    /// Per-request timeout
    pub request_timeout_secs: u64,

    /// Randomize backoff delays by up to ±20%
    pub jitter: bool,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            request_timeout_secs: 10,
            jitter: false,
        }
    }
}

impl DeliveryConfig {
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::new(self.max_retries, Duration::from_millis(self.base_delay_ms))
            .with_jitter(self.jitter)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Registration rate limit configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Whether POST /api/webhooks is rate limited
    pub enabled: bool,

    /// Bucket capacity per client
    pub registrations_per_window: u32,

    /// Time to refill a full bucket
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            registrations_per_window: 5,
            window_secs: 60,
        }
    }
}

impl Config {
    /// Load configuration from the default XDG config directory
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed, or if
    /// the resulting configuration is invalid.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    ///
    /// A missing file yields the defaults. Environment overrides and
    /// validation apply either way.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_with(path.as_ref(), |key| std::env::var(key).ok())
    }

    fn load_with<F>(path: &Path, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file from {:?}", path))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file from {:?}", path))?;
            tracing::info!("Loaded configuration from {:?}", path);
            config
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            Self::default()
        };

        let config = config.apply_overrides(lookup);
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path
    ///
    /// Returns `~/.config/hookrelay/config.toml` on Linux
    pub fn config_path() -> PathBuf {
        if let Some(proj_dirs) = directories::ProjectDirs::from("dev", "hookrelay", "hookrelay") {
            proj_dirs.config_dir().join("config.toml")
        } else {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home)
                .join(".config")
                .join("hookrelay")
                .join("config.toml")
        }
    }

    /// Apply overrides from a variable lookup
    ///
    /// Recognized variables:
    /// - HOOKRELAY_BIND, PORT
    /// - HOOKRELAY_LOG_LEVEL, HOOKRELAY_LOG_FORMAT
    /// - HOOKRELAY_MAX_RETRIES, HOOKRELAY_BASE_DELAY_MS
    /// - HOOKRELAY_RATE_LIMIT_ENABLED
    ///
    /// Values that fail to parse are ignored.
    fn apply_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind) = lookup("HOOKRELAY_BIND") {
            self.server.bind = bind;
        }
        if let Some(port) = lookup("PORT").and_then(|p| p.parse::<u16>().ok()) {
            let ip = self
                .server
                .bind
                .parse::<SocketAddr>()
                .map(|addr| addr.ip())
                .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
            self.server.bind = SocketAddr::new(ip, port).to_string();
        }

        if let Some(level) = lookup("HOOKRELAY_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("HOOKRELAY_LOG_FORMAT") {
            self.logging.format = format;
        }

        if let Some(retries) = lookup("HOOKRELAY_MAX_RETRIES").and_then(|v| v.parse::<u32>().ok()) {
            if retries > 0 {
                self.delivery.max_retries = retries;
            }
        }
        if let Some(delay) = lookup("HOOKRELAY_BASE_DELAY_MS").and_then(|v| v.parse::<u64>().ok()) {
            self.delivery.base_delay_ms = delay;
        }

        if let Some(enabled) = lookup("HOOKRELAY_RATE_LIMIT_ENABLED") {
            self.rate_limit.enabled = enabled.parse().unwrap_or(self.rate_limit.enabled);
        }

        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.logging.tracing_level().is_err() {
            anyhow::bail!(
                "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                self.logging.level
            );
        }

        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" | "compact" => {}
            _ => anyhow::bail!(
                "Invalid log format: {}. Must be one of: json, pretty, compact",
                self.logging.format
            ),
        }

        self.bind_addr()?;

        if self.delivery.max_retries == 0 {
            anyhow::bail!("delivery.max_retries must be > 0");
        }
        if self.delivery.request_timeout_secs == 0 {
            anyhow::bail!("delivery.request_timeout_secs must be > 0");
        }

        if self.rate_limit.registrations_per_window == 0 {
            anyhow::bail!("rate_limit.registrations_per_window must be > 0");
        }
        if self.rate_limit.window_secs == 0 {
            anyhow::bail!("rate_limit.window_secs must be > 0");
        }

        Ok(())
    }

    /// Parsed listen address
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.server
            .bind
            .parse()
            .with_context(|| format!("Invalid bind address: {}", self.server.bind))
    }
}
