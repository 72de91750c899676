//! ChatRelay configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::DEFAULT_MAX_MESSAGES;
use crate::extract::DEFAULT_MAX_PREVIEW;

/// Main ChatRelay configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// LLM provider configuration
    pub llm: LlmConfig,

    /// Storage configuration
    pub storage: StorageConfig,

    /// Session actor settings
    pub session: SessionConfig,

    /// Chat flow settings
    pub chat: ChatConfig,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

impl Config {
    /// Validate configuration before calling the model
    ///
    /// Checks that the API key environment variable is set so the first chat
    /// request fails fast with a clear message.
    pub fn validate(&self) -> Result<()> {
        if std::env::var(&self.llm.api_key_env).is_err() {
            return Err(eyre::eyre!(
                "LLM API key not found. Set the {} environment variable.",
                self.llm.api_key_env
            ));
        }
        if self.session.max_messages == 0 {
            return Err(eyre::eyre!("session.max-messages must be at least 1"));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .chatrelay.yml
        let local_config = PathBuf::from(".chatrelay.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/chatrelay/chatrelay.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("chatrelay").join("chatrelay.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read just the log level, before logging is set up
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        Self::load(config_path).ok().and_then(|c| c.log_level)
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name (currently only "openai"-compatible endpoints)
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Maximum tokens per response
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: "https://api.openai.com".to_string(),
            max_tokens: 1024,
            timeout_ms: 60_000,
        }
    }
}

impl LlmConfig {
    /// Read the API key from the configured environment variable
    pub fn api_key(&self) -> Result<String> {
        std::env::var(&self.api_key_env).context(format!("Environment variable {} not set", self.api_key_env))
    }
}

/// Which storage backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Sqlite,
    Memory,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend: sqlite (durable) or memory (lost on exit)
    pub backend: StorageBackend,

    /// SQLite database file
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        // Use XDG data directory (~/.local/share/chatrelay on Linux)
        let path = dirs::data_dir()
            .map(|d| d.join("chatrelay"))
            .unwrap_or_else(|| PathBuf::from(".chatrelay"))
            .join("sessions.db");

        Self {
            backend: StorageBackend::Sqlite,
            path,
        }
    }
}

/// Session actor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Retention bound for each session's message log
    #[serde(rename = "max-messages")]
    pub max_messages: usize,

    /// Stop actors idle this long (0 = never)
    #[serde(rename = "idle-timeout-ms")]
    pub idle_timeout_ms: u64,

    /// Commands that may queue for one actor before senders wait
    #[serde(rename = "mailbox-size")]
    pub mailbox_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_messages: DEFAULT_MAX_MESSAGES,
            idle_timeout_ms: 300_000,
            mailbox_size: 64,
        }
    }
}

/// Chat flow settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// System prompt for ordinary chat turns
    #[serde(rename = "system-prompt")]
    pub system_prompt: String,

    /// System prompt for plan generation
    #[serde(rename = "plan-prompt")]
    pub plan_prompt: String,

    /// Characters of raw model output shown when plan extraction fails
    #[serde(rename = "max-raw-preview")]
    pub max_raw_preview: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            plan_prompt: DEFAULT_PLAN_PROMPT.to_string(),
            max_raw_preview: DEFAULT_MAX_PREVIEW,
        }
    }
}

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful, concise assistant.";

const DEFAULT_PLAN_PROMPT: &str = "Turn the user's goal into a short actionable checklist. \
Respond with ONLY a JSON object of the form \
{\"title\": string, \"steps\": [{\"id\": string, \"text\": string}]} \
and no other text.";
