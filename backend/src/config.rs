//! Configuration for the canvas backend.

use config::{Config as ConfigLoader, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Main configuration structure for the backend.
///
/// Inference server profiles are immutable after load; requests pick one by
/// name instead of mutating shared state.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub cors: CorsConfig,
    pub logging: LoggingConfig,
    pub database: DatabaseConfig,
    pub relay: RelayConfig,
    /// Named inference server profiles (e.g. "local", "remote").
    #[serde(default)]
    pub profiles: HashMap<String, ServerProfile>,
    #[serde(default = "default_profile_name")]
    pub default_profile: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    /// Allowed origins, comma-separated, or "*" for any.
    #[serde(default = "default_origins")]
    pub origins: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database path, or ":memory:".
    #[serde(default = "default_database_path")]
    pub path: String,
}

/// Settings for the streaming batch relay.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Upper bound on `batchCount` for a single request.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    /// `max_tokens` sent upstream when the caller does not specify one.
    #[serde(default = "default_max_completion_tokens")]
    pub max_completion_tokens: u32,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_batch_size: default_max_batch_size(),
            max_completion_tokens: default_max_completion_tokens(),
        }
    }
}

/// One vLLM-compatible inference server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerProfile {
    pub base_url: String,
    /// Model identifier sent upstream (vLLM expects the model path it was
    /// launched with).
    pub model: String,
    /// Stop tokens for the model's chat template.
    #[serde(default)]
    pub stop: Vec<String>,
}

impl ServerProfile {
    fn default_local() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            model: "llama-3.3-70b-instruct".to_string(),
            stop: vec!["<|eot_id|>".to_string(), "<|begin_of_text|>".to_string()],
        }
    }
}

// Default values
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3000
}
fn default_origins() -> String {
    "http://localhost:5173".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_database_path() -> String {
    "./data/canvas.db".to_string()
}
fn default_max_batch_size() -> usize {
    40
}
fn default_max_completion_tokens() -> u32 {
    2500
}
fn default_profile_name() -> String {
    "local".to_string()
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Configuration sources (in order of precedence):
    /// 1. Environment variables (CANVAS__SECTION__KEY format)
    /// 2. config.toml file (if present)
    /// 3. Built-in defaults
    pub fn load() -> Result<Self, ConfigError> {
        let loader = ConfigLoader::builder()
            // Set defaults
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port() as i64)?
            .set_default("cors.origins", default_origins())?
            .set_default("logging.level", default_log_level())?
            .set_default("database.path", default_database_path())?
            .set_default("relay.max_batch_size", default_max_batch_size() as i64)?
            .set_default(
                "relay.max_completion_tokens",
                default_max_completion_tokens() as i64,
            )?
            // Load from config.toml if exists
            .add_source(File::with_name("config").required(false))
            // Override with environment variables (CANVAS__SECTION__KEY format)
            .add_source(
                Environment::with_prefix("CANVAS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: Config = loader.try_deserialize()?;
        if config.profiles.is_empty() {
            config
                .profiles
                .insert(default_profile_name(), ServerProfile::default_local());
        }
        Ok(config)
    }

    /// Look up a server profile by name, falling back to the default profile.
    pub fn profile(&self, name: Option<&str>) -> Option<&ServerProfile> {
        self.profiles.get(name.unwrap_or(&self.default_profile))
    }
}
