use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

pub const TELEGRAM_TOKEN_VAR: &str = "TELEGRAM_BOT_TOKEN";
pub const OPENAI_KEY_VAR: &str = "OPENAI_API_KEY";

/// Startup validation failures. Any of these halts the process before the
/// relay loop is entered.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),
}

/// Credentials read from the process environment.
#[derive(Clone)]
pub struct Credentials {
    pub telegram_token: String,
    pub openai_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("telegram_token", &redact(&self.telegram_token))
            .field("openai_key", &redact(&self.openai_key))
            .finish()
    }
}

impl Credentials {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve both credentials through `lookup`. Empty values count as missing.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::MissingVar(name))
        };

        Ok(Self {
            telegram_token: require(TELEGRAM_TOKEN_VAR)?,
            openai_key: require(OPENAI_KEY_VAR)?,
        })
    }
}

/// Log-safe preview of a secret: a short prefix followed by `...`.
pub fn redact(secret: &str) -> String {
    const VISIBLE: usize = 4;
    let count = secret.chars().count();
    if count <= VISIBLE * 2 {
        return "***".to_string();
    }
    let prefix: String = secret.chars().take(VISIBLE).collect();
    format!("{}...", prefix)
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: default_base_url(),
            max_tokens: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    /// Long-poll timeout passed to getUpdates
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u32,
    /// Pause before polling again after a failed getUpdates
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            poll_timeout_secs: default_poll_timeout(),
            retry_delay_secs: default_retry_delay(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RelayConfig {
    #[serde(default = "default_error_reply")]
    pub error_reply: String,
    #[serde(default = "default_empty_reply")]
    pub empty_reply: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            error_reply: default_error_reply(),
            empty_reply: default_empty_reply(),
        }
    }
}

/// Non-secret settings, optionally read from a TOML file.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub relay: RelayConfig,
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_poll_timeout() -> u32 {
    60
}

fn default_retry_delay() -> u64 {
    3
}

fn default_error_reply() -> String {
    "Произошла ошибка при обращении к ChatGPT.".to_string()
}

fn default_empty_reply() -> String {
    "OpenAI не вернул ответ".to_string()
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(content)?;
        Ok(settings)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub credentials: Credentials,
    pub settings: Settings,
}

impl Config {
    /// Resolve the full configuration. `path` is an explicitly named settings
    /// file and must exist; otherwise `config.toml` is used when present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let credentials = Credentials::from_env()?;

        let settings = match path {
            Some(p) => Settings::load(p)?,
            None => {
                let fallback = Path::new("config.toml");
                if fallback.exists() {
                    Settings::load(fallback)?
                } else {
                    Settings::default()
                }
            }
        };

        Ok(Self {
            credentials,
            settings,
        })
    }
}
