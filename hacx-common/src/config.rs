//! Configuration management for the relay bot.
//!
//! # Configuration Priority
//!
//! 1. Default values
//! 2. Optional JSON file named by `HACX_CONFIG`
//! 3. Environment variables
//!
//! # Environment Variable Mapping
//!
//! - `TELEGRAM_BOT_TOKEN` → telegram.bot_token
//! - `API_PROVIDER` → provider.name
//! - `API_KEY` → provider.api_key
//! - `PORT` → server.port
//! - `HACX_BIND_ADDRESS` → server.host
//! - `HACX_DATA_PATH` → storage.data_path
//! - `HACX_LOG_LEVEL` → observability.log_level
//! - `HACX_LOG_FORMAT` → observability.log_format

use crate::error::{Error, Result, ResultExt};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable naming an optional JSON config file.
pub const CONFIG_PATH_ENV: &str = "HACX_CONFIG";

// ============================================================================
// Provider Table
// ============================================================================

/// A completion endpoint known by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderPreset {
    pub name: &'static str,
    pub base_url: &'static str,
    pub model: &'static str,
}

/// Static provider table selectable through `API_PROVIDER`.
pub const PROVIDERS: &[ProviderPreset] = &[
    ProviderPreset {
        name: "openrouter",
        base_url: "https://openrouter.ai/api/v1",
        model: "deepseek/deepseek-chat-v3-0324:free",
    },
    ProviderPreset {
        name: "deepseek",
        base_url: "https://api.deepseek.com",
        model: "deepseek-chat",
    },
];

impl ProviderPreset {
    /// Look up a provider by its exact name.
    pub fn lookup(name: &str) -> Option<&'static Self> {
        PROVIDERS.iter().find(|p| p.name == name)
    }

    /// Names of every known provider, for error messages.
    pub fn names() -> Vec<&'static str> {
        PROVIDERS.iter().map(|p| p.name).collect()
    }
}

/// Fully resolved completion endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEndpoint {
    pub name: String,
    pub base_url: String,
    pub model: String,
    pub api_key: String,
}

// ============================================================================
// Sections
// ============================================================================

/// Telegram transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TelegramConfig {
    /// Bot API token
    #[serde(default)]
    pub bot_token: Option<String>,
}

/// Completion provider selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider name, must exist in [`PROVIDERS`]
    #[serde(default = "default_provider")]
    pub name: String,

    /// Bearer credential for the completion API
    #[serde(default)]
    pub api_key: Option<String>,

    /// Override the preset base URL (useful for tests and local mocks)
    #[serde(default)]
    pub base_url: Option<String>,

    /// Override the preset model name
    #[serde(default)]
    pub model: Option<String>,
}

fn default_provider() -> String {
    "openrouter".into()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: default_provider(),
            api_key: None,
            base_url: None,
            model: None,
        }
    }
}

/// Liveness HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Raw `PORT` value that failed to parse; reported by validation.
    #[serde(skip)]
    pub(crate) invalid_port: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            invalid_port: None,
        }
    }
}

/// Session snapshot location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_path")]
    pub data_path: PathBuf,
}

fn default_data_path() -> PathBuf {
    PathBuf::from("data.json")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_path: default_data_path(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

// ============================================================================
// Root
// ============================================================================

/// Root configuration for the relay bot.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,

    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from `HACX_CONFIG` (if set) and the process environment.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::load_from(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific JSON file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context(format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {e}", path.display())))
    }

    /// Load, apply environment overrides and validate.
    ///
    /// Any validation failure is reported as [`Error::Config`].
    pub fn load_and_validate() -> Result<Self> {
        let config = Self::load()?;
        config
            .validate()
            .map_err(|e| Error::Config(e.to_string()))?;
        Ok(config)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup.
    ///
    /// Empty values are treated as unset.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = get("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = Some(token);
        }
        if let Some(name) = get("API_PROVIDER") {
            self.provider.name = name;
        }
        if let Some(key) = get("API_KEY") {
            self.provider.api_key = Some(key);
        }
        if let Some(port) = get("PORT") {
            match port.trim().parse() {
                Ok(p) => {
                    self.server.port = p;
                    self.server.invalid_port = None;
                }
                Err(_) => self.server.invalid_port = Some(port),
            }
        }
        if let Some(host) = get("HACX_BIND_ADDRESS") {
            self.server.host = host;
        }
        if let Some(path) = get("HACX_DATA_PATH") {
            self.storage.data_path = PathBuf::from(path);
        }
        if let Some(level) = get("HACX_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(format) = get("HACX_LOG_FORMAT") {
            self.observability.log_format = format;
        }
    }

    /// The Telegram bot token, if configured.
    pub fn telegram_bot_token(&self) -> Option<&str> {
        self.telegram.bot_token.as_deref()
    }

    /// Resolve the configured provider against the static table.
    pub fn provider_endpoint(&self) -> Result<ProviderEndpoint> {
        let preset = ProviderPreset::lookup(&self.provider.name).ok_or_else(|| {
            Error::Config(format!(
                "Unsupported API_PROVIDER: {} (expected one of: {})",
                self.provider.name,
                ProviderPreset::names().join(", ")
            ))
        })?;

        let api_key = self
            .provider
            .api_key
            .clone()
            .ok_or_else(|| Error::Config("API_KEY is not defined".into()))?;

        Ok(ProviderEndpoint {
            name: preset.name.to_string(),
            base_url: self
                .provider
                .base_url
                .clone()
                .unwrap_or_else(|| preset.base_url.to_string()),
            model: self
                .provider
                .model
                .clone()
                .unwrap_or_else(|| preset.model.to_string()),
            api_key,
        })
    }

    /// Socket address string for the liveness server.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.provider.name, "openrouter");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.storage.data_path, PathBuf::from("data.json"));
        assert_eq!(config.observability.log_level, "info");
        assert!(config.telegram_bot_token().is_none());
    }

    #[test]
    fn test_env_overrides() {
        let vars = env(&[
            ("TELEGRAM_BOT_TOKEN", "123:abc"),
            ("API_PROVIDER", "deepseek"),
            ("API_KEY", "sk-test"),
            ("PORT", "8080"),
            ("HACX_DATA_PATH", "/tmp/sessions.json"),
        ]);
        let mut config = Config::default();
        config.apply_overrides(|k| vars.get(k).cloned());

        assert_eq!(config.telegram_bot_token(), Some("123:abc"));
        assert_eq!(config.provider.name, "deepseek");
        assert_eq!(config.provider.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.storage.data_path, PathBuf::from("/tmp/sessions.json"));
    }

    #[test]
    fn test_empty_env_values_are_ignored() {
        let vars = env(&[("API_PROVIDER", "  "), ("PORT", " ")]);
        let mut config = Config::default();
        config.apply_overrides(|k| vars.get(k).cloned());

        assert_eq!(config.provider.name, "openrouter");
        assert_eq!(config.server.port, 3000);
        assert!(config.server.invalid_port.is_none());
    }

    #[test]
    fn test_unparsable_port_is_kept_for_validation() {
        let vars = env(&[("PORT", "not-a-port")]);
        let mut config = Config::default();
        config.apply_overrides(|k| vars.get(k).cloned());

        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.invalid_port.as_deref(), Some("not-a-port"));
    }

    #[test]
    fn test_provider_endpoint_from_preset() {
        let mut config = Config::default();
        config.provider.api_key = Some("key".into());

        let endpoint = config.provider_endpoint().unwrap();
        assert_eq!(endpoint.name, "openrouter");
        assert_eq!(endpoint.base_url, "https://openrouter.ai/api/v1");
        assert_eq!(endpoint.model, "deepseek/deepseek-chat-v3-0324:free");
        assert_eq!(endpoint.api_key, "key");
    }

    #[test]
    fn test_provider_endpoint_overrides() {
        let mut config = Config::default();
        config.provider.name = "deepseek".into();
        config.provider.api_key = Some("key".into());
        config.provider.base_url = Some("http://127.0.0.1:9999".into());

        let endpoint = config.provider_endpoint().unwrap();
        assert_eq!(endpoint.base_url, "http://127.0.0.1:9999");
        assert_eq!(endpoint.model, "deepseek-chat");
    }

    #[test]
    fn test_unknown_provider_is_config_error() {
        let mut config = Config::default();
        config.provider.name = "nope".into();
        config.provider.api_key = Some("key".into());

        let err = config.provider_endpoint().unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("Unsupported API_PROVIDER: nope"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"provider": {"name": "deepseek"}, "server": {"port": 4000}}"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.provider.name, "deepseek");
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.server.host, "0.0.0.0");
    }

    #[test]
    fn test_load_from_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{not json").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_lookup_presets() {
        assert!(ProviderPreset::lookup("openrouter").is_some());
        assert!(ProviderPreset::lookup("deepseek").is_some());
        assert!(ProviderPreset::lookup("OpenRouter").is_none());
        assert_eq!(ProviderPreset::names(), vec!["openrouter", "deepseek"]);
    }
}
