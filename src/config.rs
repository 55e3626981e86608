use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable consulted when the config file carries no key.
pub const API_KEY_ENV: &str = "GROQ_API_KEY";

pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";
pub const DEFAULT_TEMPERATURE: f32 = 0.2;

/// Faults in how the client was set up, as opposed to faults while talking
/// to the provider.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error(
        "Groq API key not found. Please set GROQ_API_KEY in the config file or environment variables."
    )]
    MissingApiKey,

    #[error("unknown model '{0}'")]
    UnknownModel(String),

    #[error("temperature {0} is outside the range 0.0 to 1.0")]
    TemperatureOutOfRange(f32),

    #[error("no models configured")]
    NoModels,

    #[error("invalid message role '{0}'")]
    InvalidRole(String),

    #[error("message content is missing")]
    MissingContent,

    #[error("system messages can only be set when the conversation is reset")]
    SystemMessageAppend,

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// API key for Groq; falls back to `GROQ_API_KEY`
    pub api_key: Option<String>,

    /// Base URL of the OpenAI-compatible endpoint
    pub base_url: String,

    /// Model selected at startup
    pub default_model: String,

    /// Models offered by the selector
    pub models: Vec<String>,

    /// Initial sampling temperature
    pub temperature: f32,

    /// Directive placed at the head of every transcript
    pub system_prompt: String,

    /// Seconds to wait for the TCP/TLS handshake
    pub connect_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            default_model: "llama-3.3-70b-versatile".to_string(),
            models: vec![
                "llama-3.3-70b-versatile".to_string(),
                "mistral-saba-24b".to_string(),
                "gemma-7b".to_string(),
            ],
            temperature: DEFAULT_TEMPERATURE,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            connect_timeout_secs: 10,
        }
    }
}

impl Config {
    /// Directory holding the config file and the log file.
    pub fn home_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not find home directory")?;
        Ok(home.join(".groqbot"))
    }

    /// Default location of the config file.
    pub fn default_path() -> Result<PathBuf> {
        Ok(Self::home_dir()?.join("config.toml"))
    }

    /// Load configuration from `path`, or from the default location.
    ///
    /// A missing file is not an error: defaults are used instead.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_path()?,
        };

        let config = if config_path.exists() {
            let content = fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config file {}", config_path.display()))?;
            Self::from_toml(&content)
                .with_context(|| format!("Failed to parse config file {}", config_path.display()))?
        } else {
            tracing::debug!(path = %config_path.display(), "no config file, using defaults");
            Config::default()
        };

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Check the invariants the rest of the client relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.models.is_empty() {
            return Err(ConfigError::NoModels);
        }
        if !self.models.iter().any(|m| m == &self.default_model) {
            return Err(ConfigError::UnknownModel(self.default_model.clone()));
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(ConfigError::TemperatureOutOfRange(self.temperature));
        }
        Ok(())
    }

    /// Get API key from config or environment
    pub fn api_key(&self) -> Result<String, ConfigError> {
        self.resolve_api_key(std::env::var(API_KEY_ENV).ok())
    }

    /// Resolve the key with the config file taking precedence over `env_value`.
    /// Blank keys count as absent.
    pub fn resolve_api_key(&self, env_value: Option<String>) -> Result<String, ConfigError> {
        self.api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| env_value.filter(|key| !key.trim().is_empty()))
            .ok_or(ConfigError::MissingApiKey)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.system_prompt, "You are a helpful assistant.");
        assert_eq!(config.models.len(), 3);
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let config = Config::from_toml("temperature = 0.5\n").unwrap();
        assert_eq!(config.temperature, 0.5);
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.default_model, "llama-3.3-70b-versatile");
    }

    #[test]
    fn rejects_default_model_outside_list() {
        let config = Config {
            default_model: "gpt-4o".to_string(),
            ..Config::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::UnknownModel("gpt-4o".to_string()))
        );
    }

    #[test]
    fn rejects_out_of_range_temperature() {
        let config = Config {
            temperature: 1.5,
            ..Config::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::TemperatureOutOfRange(1.5)));
    }

    #[test]
    fn config_key_wins_over_environment() {
        let config = Config {
            api_key: Some("from-file".to_string()),
            ..Config::default()
        };
        assert_eq!(
            config.resolve_api_key(Some("from-env".to_string())).unwrap(),
            "from-file"
        );
    }

    #[test]
    fn blank_keys_are_missing() {
        let config = Config {
            api_key: Some("   ".to_string()),
            ..Config::default()
        };
        assert_eq!(
            config.resolve_api_key(Some(String::new())),
            Err(ConfigError::MissingApiKey)
        );
        assert_eq!(
            config.resolve_api_key(Some("gsk_123".to_string())).unwrap(),
            "gsk_123"
        );
    }

    #[test]
    fn missing_file_uses_defaults() {
        let path = std::env::temp_dir().join("groqbot-config-that-does-not-exist.toml");
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.temperature, DEFAULT_TEMPERATURE);
    }
}
