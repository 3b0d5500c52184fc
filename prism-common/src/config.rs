//! Configuration management for the Prism gateway.
//!
//! Configuration lives in a single JSON file at `~/.prism/config.json`.
//!
//! # Configuration Priority
//!
//! 1. Explicit config file values
//! 2. Environment variables (PRISM_* prefix, plus HF_TOKEN)
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `PRISM_PORT` → gateway.port
//! - `PRISM_BIND_ADDRESS` → network.bind
//! - `PRISM_INFERENCE_URL` → gateway.inference_url
//! - `PRISM_LOG_LEVEL` → observability.log_level
//! - `PRISM_LOG_FORMAT` → observability.log_format
//! - `HF_TOKEN` → secrets.hf_token

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".prism"),
        |dirs| dirs.home_dir().join(".prism"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Global network configuration.
///
/// Default is `127.0.0.1` (local only). Set to `0.0.0.0` for remote access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_bind_address")]
    pub bind: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind: default_bind_address(),
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".into()
}

/// Gateway service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Port the HTTP server listens on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Base URL of the Hugging Face Inference router.
    #[serde(default = "default_inference_url")]
    pub inference_url: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            inference_url: default_inference_url(),
        }
    }
}

fn default_port() -> u16 {
    4001
}

fn default_inference_url() -> String {
    "https://router.huggingface.co".into()
}

/// Sensitive credentials.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SecretsConfig {
    /// Hugging Face access token, sent as a bearer token on every
    /// inference call.
    #[serde(default)]
    pub hf_token: Option<String>,
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Base log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Output format: "json" or "pretty".
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

/// Root configuration for the Prism gateway.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub secrets: SecretsConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the default path, with env overrides applied.
    pub fn load() -> Result<Self> {
        let path = config_path();
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            tracing::debug!("Config file not found, using defaults");
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific path (no env overrides).
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(port) = std::env::var("PRISM_PORT") {
            if let Ok(p) = port.parse() {
                self.gateway.port = p;
            }
        }
        if let Ok(bind) = std::env::var("PRISM_BIND_ADDRESS") {
            self.network.bind = bind;
        }
        if let Ok(url) = std::env::var("PRISM_INFERENCE_URL") {
            self.gateway.inference_url = url;
        }
        if let Ok(level) = std::env::var("PRISM_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Ok(format) = std::env::var("PRISM_LOG_FORMAT") {
            self.observability.log_format = format;
        }
        if let Ok(token) = std::env::var("HF_TOKEN") {
            self.secrets.hf_token = Some(token);
        }
    }

    /// Get the effective bind address.
    pub fn bind_address(&self) -> &str {
        &self.network.bind
    }

    /// Get the Hugging Face token, if configured.
    pub fn hf_token(&self) -> Option<&str> {
        self.secrets.hf_token.as_deref()
    }
}
