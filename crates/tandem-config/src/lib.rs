use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON5 parse error: {0}")]
    Json5(#[from] json5::Error),
    #[error("Config directory not found")]
    NoDirFound,
}

/// Generative backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible API (e.g. a local Ollama).
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    /// Model ID to request.
    #[serde(default = "default_llm_model")]
    pub model: String,
    /// Bearer token; many local backends accept anything here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Hard timeout on each generation request, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Cap on tool-call/follow-up rounds within one generated turn.
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,
}

fn default_llm_base_url() -> String {
    "http://localhost:11434/v1".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_max_tool_rounds() -> usize {
    8
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            api_key: None,
            request_timeout_secs: default_request_timeout_secs(),
            max_tool_rounds: default_max_tool_rounds(),
        }
    }
}

/// Outbound delivery configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// URL the engine POSTs `{recipient, text}` payloads to. The chat
    /// transport sits behind this edge.
    #[serde(default = "default_webhook_url")]
    pub webhook_url: String,
}

fn default_webhook_url() -> String {
    "http://127.0.0.1:8081/deliver".to_string()
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            webhook_url: default_webhook_url(),
        }
    }
}

/// Top-level tandem configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TandemConfig {
    /// SQLite database location.
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    /// Dispatch loop poll interval, in seconds. Sub-minute precision is
    /// explicitly not a goal.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// How many recent conversation entries a fired action sees.
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
}

fn default_database_path() -> PathBuf {
    config_dir()
        .map(|d| d.join("tandem.db"))
        .unwrap_or_else(|_| PathBuf::from("tandem.db"))
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_history_window() -> usize {
    5
}

impl Default for TandemConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            poll_interval_secs: default_poll_interval_secs(),
            history_window: default_history_window(),
            llm: LlmConfig::default(),
            delivery: DeliveryConfig::default(),
        }
    }
}

/// Resolve the tandem config directory (~/.tandem/).
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|h| h.join(".tandem"))
        .ok_or(ConfigError::NoDirFound)
}

/// Resolve the config file path (~/.tandem/config.json5).
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.json5"))
}

/// Load configuration from the default path, falling back to defaults.
pub fn load_config() -> Result<TandemConfig, ConfigError> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let path = config_file_path()?;
    load_config_from(&path)
}

/// Load configuration from a specific path, falling back to defaults if not
/// found. Environment variables override file values for the handful of
/// settings operators usually inject at deploy time.
pub fn load_config_from(path: &Path) -> Result<TandemConfig, ConfigError> {
    let mut config = if path.exists() {
        let content = std::fs::read_to_string(path)?;
        json5::from_str(&content)?
    } else {
        tracing::debug!("Config file not found at {}, using defaults", path.display());
        TandemConfig::default()
    };

    if let Ok(url) = std::env::var("TANDEM_LLM_BASE_URL") {
        config.llm.base_url = url;
    }
    if let Ok(key) = std::env::var("TANDEM_LLM_API_KEY") {
        config.llm.api_key = Some(key);
    }
    if let Ok(url) = std::env::var("TANDEM_WEBHOOK_URL") {
        config.delivery.webhook_url = url;
    }
    if let Ok(db) = std::env::var("TANDEM_DB_PATH") {
        config.database_path = PathBuf::from(db);
    }

    Ok(config)
}
