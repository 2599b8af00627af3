//! Configuration loading, validation, and management for Spendwise.
//!
//! Loads configuration from `~/.spendwise/config.toml` (or an explicit path)
//! with environment variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.spendwise/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// LLM provider name ("gemini", "openai", "openrouter", "ollama", ...)
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model name
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per model response; unset leaves it to the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Turn controller and memory policy
    #[serde(default)]
    pub assistant: AssistantConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Users and their bearer tokens
    #[serde(default)]
    pub users: Vec<UserConfig>,
}

fn default_provider() -> String {
    "gemini".into()
}
fn default_model() -> String {
    "gemini-1.5-flash".into()
}
fn default_temperature() -> f32 {
    0.3
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("database", &self.database)
            .field("gateway", &self.gateway)
            .field("assistant", &self.assistant)
            .field("providers", &self.providers)
            .field("users", &self.users)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// sqlx connection URL, or "memory" for the in-process backend
    #[serde(default = "default_database_url")]
    pub url: String,
}

fn default_database_url() -> String {
    "sqlite://spendwise.db".into()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Maximum request body size in bytes
    #[serde(default = "default_body_limit")]
    pub body_limit: usize,
}

fn default_port() -> u16 {
    8000
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_body_limit() -> usize {
    64 * 1024
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            body_limit: default_body_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    /// Compact history once retained messages exceed this count
    #[serde(default = "default_summary_threshold")]
    pub summary_threshold: usize,

    /// Messages kept after compaction
    #[serde(default = "default_retained_tail")]
    pub retained_tail: usize,

    /// Cap on model round-trips in a single turn
    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: usize,

    /// Replaces the built-in persona prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona: Option<String>,
}

fn default_summary_threshold() -> usize {
    6
}
fn default_retained_tail() -> usize {
    2
}
fn default_max_tool_iterations() -> usize {
    25
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            summary_threshold: default_summary_threshold(),
            retained_tail: default_retained_tail(),
            max_tool_iterations: default_max_tool_iterations(),
            persona: None,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .finish()
    }
}

/// A user allowed to call the gateway.
#[derive(Clone, Serialize, Deserialize)]
pub struct UserConfig {
    pub id: i64,
    pub username: String,
    /// Bearer token presented in `Authorization`
    pub token: String,
}

impl std::fmt::Debug for UserConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserConfig")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.spendwise/config.toml).
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(None)
    }

    /// Load from `path` when given, else the default path, then apply
    /// environment overrides:
    /// - `SPENDWISE_API_KEY`, `GOOGLE_API_KEY`, `OPENAI_API_KEY` (first wins,
    ///   only if the file sets no key)
    /// - `SPENDWISE_PROVIDER`
    /// - `SPENDWISE_MODEL`
    /// - `SPENDWISE_DATABASE_URL`
    pub fn load_with(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_dir().join("config.toml"),
        };
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path, without env overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if self.api_key.is_none() {
            self.api_key = env_var("SPENDWISE_API_KEY")
                .or_else(|| env_var("GOOGLE_API_KEY"))
                .or_else(|| env_var("OPENAI_API_KEY"));
        }
        if let Some(provider) = env_var("SPENDWISE_PROVIDER") {
            self.provider = provider;
        }
        if let Some(model) = env_var("SPENDWISE_MODEL") {
            self.model = model;
        }
        if let Some(url) = env_var("SPENDWISE_DATABASE_URL") {
            self.database.url = url;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".spendwise")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.assistant.summary_threshold <= self.assistant.retained_tail {
            return Err(ConfigError::ValidationError(
                "assistant.summary_threshold must be greater than assistant.retained_tail".into(),
            ));
        }

        if self.assistant.max_tool_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "assistant.max_tool_iterations must be at least 1".into(),
            ));
        }

        let mut ids = HashSet::new();
        let mut tokens = HashSet::new();
        for user in &self.users {
            if user.token.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "user {} has an empty token",
                    user.id
                )));
            }
            if !ids.insert(user.id) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate user id {}",
                    user.id
                )));
            }
            if !tokens.insert(user.token.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "user {} reuses another user's token",
                    user.id
                )));
            }
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Resolve a bearer token to the configured user.
    pub fn user_for_token(&self, token: &str) -> Option<&UserConfig> {
        self.users.iter().find(|u| u.token == token)
    }

    /// Generate a default config TOML string (for the `init` command).
    pub fn default_toml() -> String {
        let config = Self {
            users: vec![UserConfig {
                id: 1,
                username: "demo".into(),
                token: "change-me".into(),
            }],
            ..Self::default()
        };
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            provider: default_provider(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: None,
            database: DatabaseConfig::default(),
            gateway: GatewayConfig::default(),
            assistant: AssistantConfig::default(),
            providers: HashMap::new(),
            users: vec![],
        }
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
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
