//! Configuration loading, validation, and management for Relay.
//!
//! Loads configuration from `~/.relay/config.json` with environment
//! variable overrides:
//! - `RELAY_PROVIDER` — selects the LLM provider
//! - `RELAY_MODEL` — selects the model
//! - `RELAY_BASE_URL` — provider base URL
//! - `RELAY_<PROVIDER>_API_KEY` — per-provider API keys
//! - `RELAY_DISABLED_MIDDLEWARES` — comma-separated interceptor ids

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.relay/config.json`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// LLM provider ("ollama", "openai", "openrouter", "anthropic")
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model name
    #[serde(default = "default_model")]
    pub model: String,

    /// Provider base URL override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// API key (environment variables take precedence)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Directory scanned for script skills. `~/` expands to the home dir.
    #[serde(default = "default_scripts_dir")]
    pub scripts_dir: String,

    /// Per-middleware settings
    #[serde(default)]
    pub middlewares: Vec<MiddlewareConfig>,
}

fn default_provider() -> String {
    "ollama".into()
}
fn default_model() -> String {
    "llama3.2".into()
}
fn default_scripts_dir() -> String {
    "~/.relay/scripts".into()
}
fn default_true() -> bool {
    true
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &redact(&self.api_key))
            .field("scripts_dir", &self.scripts_dir)
            .field("middlewares", &self.middlewares)
            .finish()
    }
}

/// Per-middleware configuration entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiddlewareConfig {
    /// The interceptor id (e.g. "greeting", "local-cache")
    pub id: String,

    /// Disabled interceptors end up on the disable-list
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Environment variables exported for this interceptor
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env_vars: HashMap<String, String>,
}

impl AppConfig {
    /// Load configuration from the default path (`~/.relay/config.json`),
    /// then apply environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from(&Self::config_path())?;

        if let Ok(provider) = std::env::var("RELAY_PROVIDER") {
            if !provider.is_empty() {
                config.provider = provider;
            }
        }
        if let Ok(model) = std::env::var("RELAY_MODEL") {
            if !model.is_empty() {
                config.model = model;
            }
        }
        if let Ok(url) = std::env::var("RELAY_BASE_URL") {
            if !url.is_empty() {
                config.base_url = Some(url);
            }
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = serde_json::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Export middleware settings into the process environment.
    ///
    /// Each enabled entry's `env_vars` are set; disabled ids are joined into
    /// `RELAY_DISABLED_MIDDLEWARES` for the chain builder.
    pub fn apply_middleware_settings(&self) {
        let mut disabled = Vec::new();
        for mw in &self.middlewares {
            if !mw.enabled {
                disabled.push(mw.id.clone());
            }
            for (key, value) in &mw.env_vars {
                if !value.is_empty() {
                    std::env::set_var(key, value);
                }
            }
        }
        if !disabled.is_empty() {
            std::env::set_var("RELAY_DISABLED_MIDDLEWARES", disabled.join(","));
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".relay")
    }

    /// Full path of the configuration file.
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.json")
    }

    /// Middleware debug log path, relative to the working directory.
    pub fn middleware_log_path() -> PathBuf {
        PathBuf::from("logs").join("middleware.debug.jsonl")
    }

    /// The scripts directory with `~/` expanded.
    pub fn resolved_scripts_dir(&self) -> PathBuf {
        expand_home(&self.scripts_dir)
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.provider.trim().is_empty() {
            return Err(ConfigError::ValidationError("provider must not be empty".into()));
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::ValidationError("model must not be empty".into()));
        }
        for mw in &self.middlewares {
            if mw.id.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "middleware entries need a non-empty id".into(),
                ));
            }
        }
        Ok(())
    }

    /// Generate a default config JSON string (for the `onboard` command).
    pub fn default_json() -> String {
        serde_json::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            api_key: None,
            scripts_dir: default_scripts_dir(),
            middlewares: vec![],
        }
    }
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        dirs_home().join(rest)
    } else {
        PathBuf::from(path)
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.provider, "ollama");
        assert_eq!(config.model, "llama3.2");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrip_json() {
        let config = AppConfig::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.provider, config.provider);
        assert_eq!(parsed.scripts_dir, config.scripts_dir);
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.json")).unwrap();
        assert_eq!(config.provider, "ollama");
    }

    #[test]
    fn parse_full_config() {
        let json = r#"{
            "provider": "anthropic",
            "model": "claude-sonnet-4-0",
            "base_url": "https://proxy.internal",
            "api_key": "sk-ant-xyz",
            "scripts_dir": "~/tools",
            "middlewares": [
                {"id": "greeting", "enabled": false},
                {"id": "weather", "env_vars": {"WEATHER_UNITS": "metric"}}
            ]
        }"#;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, json).unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.provider, "anthropic");
        assert_eq!(config.base_url.as_deref(), Some("https://proxy.internal"));
        assert_eq!(config.middlewares.len(), 2);
        assert!(!config.middlewares[0].enabled);
        assert!(config.middlewares[1].enabled);
        assert_eq!(
            config.middlewares[1].env_vars.get("WEATHER_UNITS").map(String::as_str),
            Some("metric")
        );
    }

    #[test]
    fn invalid_json_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn empty_model_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"provider": "ollama", "model": "  "}"#).unwrap();

        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn expand_home_prefix() {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        assert_eq!(expand_home("~/x/y"), PathBuf::from(home).join("x/y"));
        assert_eq!(expand_home("/abs/path"), PathBuf::from("/abs/path"));
        assert_eq!(expand_home("relative"), PathBuf::from("relative"));
    }

    #[test]
    fn debug_output_redacts_api_key() {
        let config = AppConfig {
            api_key: Some("sk-secret".into()),
            ..AppConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn default_json_is_parseable() {
        let json = AppConfig::default_json();
        let parsed: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.provider, "ollama");
    }
}
