//! Configuration loading, validation, and management for memloop.
//!
//! Loads configuration from `~/.memloop/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.memloop/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Anthropic API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default)]
    pub provider: ProviderConfig,

    /// Model and loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Context assembly budget and history window
    #[serde(default)]
    pub context: ContextConfig,

    /// Memory backend and retrieval settings
    #[serde(default)]
    pub memory: MemoryConfig,
}

/// Redact a secret string for Debug output.
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
            .field("agent", &self.agent)
            .field("context", &self.context)
            .field("memory", &self.memory)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_base_url() -> String {
    "https://api.anthropic.com".into()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens per model response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Maximum model invocations per user message
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Dispatch the tool calls of one response concurrently
    #[serde(default)]
    pub parallel_tools: bool,
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_max_iterations() -> u32 {
    10
}
fn default_system_prompt() -> String {
    concat!(
        "You are a helpful assistant with access to tools. ",
        "Use a tool whenever it gives a more reliable answer than guessing, ",
        "and answer concisely once you have what you need."
    )
    .into()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            max_iterations: default_max_iterations(),
            system_prompt: default_system_prompt(),
            parallel_tools: false,
        }
    }
}

/// How a context budget is measured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetUnit {
    #[default]
    Chars,
    /// Estimated with a chars/4 heuristic
    Tokens,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Overall size limit of the assembled request
    #[serde(default = "default_context_budget")]
    pub budget: usize,

    #[serde(default)]
    pub unit: BudgetUnit,

    /// Number of most recent turns considered for history
    #[serde(default = "default_history_window")]
    pub history_window: usize,
}

fn default_context_budget() -> usize {
    8000
}
fn default_history_window() -> usize {
    20
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            budget: default_context_budget(),
            unit: BudgetUnit::default(),
            history_window: default_history_window(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// "sqlite" or "in_memory"
    #[serde(default = "default_memory_backend")]
    pub backend: String,

    /// Database file; defaults to `~/.memloop/memloop.sqlite`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Maximum snippets scanned per retrieval
    #[serde(default = "default_lookback")]
    pub lookback: usize,

    /// Character budget of the memory block
    #[serde(default = "default_memory_budget")]
    pub budget_chars: usize,

    /// Snippets scoring below this are never injected
    #[serde(default)]
    pub min_score: f32,

    /// Store a summary snippet after every completed exchange
    #[serde(default)]
    pub auto_save: bool,
}

fn default_memory_backend() -> String {
    "sqlite".into()
}
fn default_lookback() -> usize {
    200
}
fn default_memory_budget() -> usize {
    1200
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
            path: None,
            lookback: default_lookback(),
            budget_chars: default_memory_budget(),
            min_score: 0.0,
            auto_save: false,
        }
    }
}

impl MemoryConfig {
    /// Resolved database path.
    pub fn database_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("memloop.sqlite"))
    }
}

const KNOWN_BACKENDS: &[&str] = &["sqlite", "in_memory"];

impl AppConfig {
    /// Load configuration from the default path (~/.memloop/config.toml).
    ///
    /// Environment overrides (highest priority):
    /// - `MEMLOOP_API_KEY`, then `ANTHROPIC_API_KEY`
    /// - `MEMLOOP_MODEL`
    /// - `MEMLOOP_MAX_ITERATIONS`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
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

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`, then re-validate.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("MEMLOOP_API_KEY").or_else(|| lookup("ANTHROPIC_API_KEY")) {
            self.api_key = Some(key);
        }
        if let Some(model) = lookup("MEMLOOP_MODEL") {
            self.agent.model = model;
        }
        if let Some(raw) = lookup("MEMLOOP_MAX_ITERATIONS") {
            self.agent.max_iterations = raw.parse().map_err(|_| {
                ConfigError::ValidationError(format!("MEMLOOP_MAX_ITERATIONS is not a number: '{raw}'"))
            })?;
        }
        self.validate()
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".memloop")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.agent.temperature) {
            return Err(ConfigError::ValidationError(
                "agent.temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError("agent.max_iterations must be at least 1".into()));
        }
        if self.context.budget == 0 {
            return Err(ConfigError::ValidationError("context.budget must be > 0".into()));
        }
        if self.context.history_window == 0 {
            return Err(ConfigError::ValidationError("context.history_window must be at least 1".into()));
        }
        if self.memory.lookback == 0 {
            return Err(ConfigError::ValidationError("memory.lookback must be at least 1".into()));
        }
        if !self.memory.min_score.is_finite() {
            return Err(ConfigError::ValidationError("memory.min_score must be finite".into()));
        }
        if !KNOWN_BACKENDS.contains(&self.memory.backend.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "memory.backend '{}' is not one of {}",
                self.memory.backend,
                KNOWN_BACKENDS.join(", ")
            )));
        }
        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for `config init`).
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            provider: ProviderConfig::default(),
            agent: AgentConfig::default(),
            context: ContextConfig::default(),
            memory: MemoryConfig::default(),
        }
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

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}
