//! Configuration management
//!
//! This module handles loading, validation, and management of the Otsenka
//! configuration. Configuration is stored in TOML format at
//! ~/.otsenka/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Log level
//! - **llm**: GigaChat endpoints, model name and sampling parameters
//! - **server**: HTTP listener address
//! - **storage**: Upload directories and the roster file
//! - **bot**: Telegram bot token
//!
//! # Path Expansion
//!
//! Storage paths support ~ expansion to the user's home directory. Relative
//! paths are kept as-is and resolve against the working directory, which
//! matches how the upload folders are usually deployed next to the binary.
//!
//! # Secrets
//!
//! The GigaChat authorization key and the Telegram token may be left out of
//! the file and provided through the `GIGACHAT_CREDENTIALS` and
//! `TELEGRAM_BOT_TOKEN` environment variables instead.
//!
//! # Examples
//!
//! ```no_run
//! use otsenka_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load configuration from default location
//! let config = Config::load_or_create()?;
//!
//! println!("Model: {}", config.llm.model);
//! println!("Listening on: {}", config.server.bind_addr());
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Errors from loading or validating configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Main configuration structure
///
/// This structure represents the complete Otsenka configuration loaded from
/// ~/.otsenka/config.toml. Every section may be omitted; missing values fall
/// back to the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Core engine settings
    #[serde(default)]
    pub core: CoreConfig,

    /// GigaChat provider configuration
    #[serde(default)]
    pub llm: LLMConfig,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Upload directories and roster location
    #[serde(default)]
    pub storage: StorageConfig,

    /// Telegram bot configuration
    #[serde(default)]
    pub bot: BotConfig,
}

/// Core engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// GigaChat provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    /// Authorization key from the GigaChat developer console, already
    /// base64-encoded. Falls back to the GIGACHAT_CREDENTIALS variable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<String>,

    /// OAuth token endpoint
    #[serde(default = "default_auth_url")]
    pub auth_url: String,

    /// Base URL for the chat API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// OAuth scope (personal, B2B or corporate)
    #[serde(default = "default_scope")]
    pub scope: String,

    /// Model name
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature (0.0-2.0)
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Completion length cap
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Skip TLS verification; the production endpoints sit behind a
    /// certificate chain that is not in the webpki root store
    #[serde(default = "default_true")]
    pub accept_invalid_certs: bool,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen host
    #[serde(default = "default_host")]
    pub host: String,

    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl ServerConfig {
    /// Socket address string for the HTTP listener
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Upload directories and roster location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for uploaded methodology documents (supports ~ expansion)
    #[serde(default = "default_method_dir")]
    pub method_dir: PathBuf,

    /// Directory for uploaded lab reports (supports ~ expansion)
    #[serde(default = "default_labs_dir")]
    pub labs_dir: PathBuf,

    /// CSV file with registered students (supports ~ expansion)
    #[serde(default = "default_roster_path")]
    pub roster_path: PathBuf,
}

/// Telegram bot configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BotConfig {
    /// Bot token; falls back to the TELEGRAM_BOT_TOKEN variable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl LLMConfig {
    /// The authorization key, from the config file or the environment
    pub fn resolve_credentials(&self) -> Option<String> {
        self.credentials
            .clone()
            .or_else(|| std::env::var("GIGACHAT_CREDENTIALS").ok())
    }
}

impl BotConfig {
    /// The bot token, from the config file or the environment
    pub fn resolve_token(&self) -> Option<String> {
        self.token
            .clone()
            .or_else(|| std::env::var("TELEGRAM_BOT_TOKEN").ok())
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_auth_url() -> String {
    "https://ngw.devices.sberbank.ru:9443/api/v2/oauth".to_string()
}

fn default_base_url() -> String {
    "https://gigachat.devices.sberbank.ru/api/v1".to_string()
}

fn default_scope() -> String {
    "GIGACHAT_API_PERS".to_string()
}

fn default_model() -> String {
    "GigaChat".to_string()
}

fn default_temperature() -> f64 {
    0.5
}

fn default_max_tokens() -> u32 {
    2000
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_method_dir() -> PathBuf {
    PathBuf::from("static/method")
}

fn default_labs_dir() -> PathBuf {
    PathBuf::from("static/labs")
}

fn default_roster_path() -> PathBuf {
    PathBuf::from("users.csv")
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            credentials: None,
            auth_url: default_auth_url(),
            base_url: default_base_url(),
            scope: default_scope(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            accept_invalid_certs: true,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            method_dir: default_method_dir(),
            labs_dir: default_labs_dir(),
            roster_path: default_roster_path(),
        }
    }
}

impl Config {
    /// Load configuration from the default location (~/.otsenka/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default
    /// configuration. Validates the configuration after loading and returns
    /// descriptive errors if validation fails.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, ConfigError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| ConfigError::Config(format!("Failed to read config file: {}", e)))?;

        let mut config: Config = toml::from_str(&contents)
            .map_err(|e| ConfigError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                ConfigError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let mut config = Self::default_config();
        config.validate_and_process()?;

        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| ConfigError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| ConfigError::Config(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Created default configuration at {}", path.display());
        Ok(config)
    }

    /// Get the default configuration file path (~/.otsenka/config.toml)
    fn default_config_path() -> Result<PathBuf, ConfigError> {
        let home = dirs::home_dir()
            .ok_or_else(|| ConfigError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".otsenka").join("config.toml"))
    }

    /// Create a default configuration
    fn default_config() -> Self {
        Self {
            core: CoreConfig::default(),
            llm: LLMConfig::default(),
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            bot: BotConfig::default(),
        }
    }

    /// Validate and process configuration
    ///
    /// This method:
    /// - Validates the log level and sampling parameters
    /// - Expands ~ in storage paths
    fn validate_and_process(&mut self) -> Result<(), ConfigError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(ConfigError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::Config(
                "temperature must be between 0.0 and 2.0".to_string(),
            ));
        }

        if self.llm.max_tokens == 0 {
            return Err(ConfigError::Config(
                "max_tokens must be greater than zero".to_string(),
            ));
        }

        self.storage.method_dir = expand_path(&self.storage.method_dir)?;
        self.storage.labs_dir = expand_path(&self.storage.labs_dir)?;
        self.storage.roster_path = expand_path(&self.storage.roster_path)?;

        Ok(())
    }
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, ConfigError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| ConfigError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| ConfigError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| ConfigError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_creation() {
        let config = Config::default_config();

        assert_eq!(config.core.log_level, "info");
        assert_eq!(config.llm.model, "GigaChat");
        assert_eq!(config.llm.scope, "GIGACHAT_API_PERS");
        assert_eq!(config.llm.temperature, 0.5);
        assert_eq!(config.llm.max_tokens, 2000);
        assert_eq!(config.server.bind_addr(), "127.0.0.1:5000");
        assert_eq!(config.storage.method_dir, PathBuf::from("static/method"));
        assert_eq!(config.storage.roster_path, PathBuf::from("users.csv"));
        assert!(config.bot.token.is_none());
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let path = PathBuf::from("~/test");
        let expanded = expand_path(&path).unwrap();

        let home = dirs::home_dir().unwrap();
        assert_eq!(expanded, home.join("test"));
    }

    #[test]
    fn test_expand_path_without_tilde() {
        let path = PathBuf::from("/absolute/path");
        let expanded = expand_path(&path).unwrap();

        assert_eq!(expanded, path);
    }

    #[test]
    fn test_expand_path_tilde_only() {
        let path = PathBuf::from("~");
        let expanded = expand_path(&path).unwrap();

        let home = dirs::home_dir().unwrap();
        assert_eq!(expanded, home);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default_config();
        let toml_string = toml::to_string(&config).unwrap();

        let deserialized: Config = toml::from_str(&toml_string).unwrap();
        assert_eq!(config.core.log_level, deserialized.core.log_level);
        assert_eq!(config.llm.auth_url, deserialized.llm.auth_url);
        assert_eq!(config.server.port, deserialized.server.port);
    }

    #[test]
    fn test_partial_config_falls_back_to_defaults() {
        let config: Config = toml::from_str(
            r#"
            [llm]
            credentials = "dGVzdDp0ZXN0"
            temperature = 0.1

            [server]
            port = 8080
            "#,
        )
        .unwrap();

        assert_eq!(config.llm.credentials.as_deref(), Some("dGVzdDp0ZXN0"));
        assert_eq!(config.llm.temperature, 0.1);
        assert_eq!(config.llm.model, "GigaChat");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.storage.labs_dir, PathBuf::from("static/labs"));
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        let mut config = Config::default_config();
        config.core.log_level = "verbose".to_string();
        assert!(config.validate_and_process().is_err());
    }

    #[test]
    fn test_invalid_temperature_rejected() {
        let mut config = Config::default_config();
        config.llm.temperature = 3.0;
        assert!(config.validate_and_process().is_err());

        config.llm.temperature = -0.1;
        assert!(config.validate_and_process().is_err());
    }

    #[test]
    fn test_load_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[core]\nlog_level = \"debug\"\n").unwrap();

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.core.log_level, "debug");
        assert_eq!(config.llm.model, "GigaChat");
    }

    #[test]
    fn test_resolve_credentials_prefers_config() {
        let mut llm = LLMConfig::default();
        llm.credentials = Some("from-config".to_string());
        assert_eq!(llm.resolve_credentials().as_deref(), Some("from-config"));
    }
}
