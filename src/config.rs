use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable prefix for layered overrides (`GEMINI_PROXY__GEMINI__MODELS=...`)
pub const ENV_PREFIX: &str = "GEMINI_PROXY";

/// Plain credential variable, takes precedence over the config file
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeminiConfig {
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Models the proxy may fall back to, in order
    #[serde(default = "default_models")]
    pub models: Vec<String>,

    /// Tried first; must be one of `models`
    #[serde(default)]
    pub default_model: Option<String>,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            timeout_seconds: default_timeout_seconds(),
            models: default_models(),
            default_model: None,
        }
    }
}

impl GeminiConfig {
    /// Ordered fallback chain: the default model first, then the rest of
    /// `models` in the order they were configured.
    pub fn candidate_models(&self) -> Vec<String> {
        let mut candidates = Vec::with_capacity(self.models.len());
        if let Some(default) = &self.default_model {
            candidates.push(default.clone());
        }
        for model in &self.models {
            if !candidates.contains(model) {
                candidates.push(model.clone());
            }
        }
        candidates
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// SQLite URL (e.g. "sqlite:./data/metrics.db")
    #[serde(default = "default_database_url")]
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Delete log rows older than this many days (disabled when unset)
    #[serde(default)]
    pub retention_days: Option<u32>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            retention_days: None,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_timeout_seconds() -> u64 {
    60
}

fn default_models() -> Vec<String> {
    vec!["gemini-1.5-flash".to_string(), "gemini-1.5-pro".to_string()]
}

fn default_database_url() -> String {
    "sqlite:./metrics.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

/// Load configuration from an optional TOML file, layered under environment variables
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let config = config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("gemini.models")
                .try_parsing(true),
        )
        .set_override_option("gemini.api_key", std::env::var(API_KEY_ENV).ok())?
        .build()?;

    let cfg: Config = config.try_deserialize()?;
    validate_config(&cfg)?;

    Ok(cfg)
}

pub fn validate_config(cfg: &Config) -> anyhow::Result<()> {
    if cfg.gemini.api_key.trim().is_empty() {
        anyhow::bail!(
            "Gemini API key is not configured (set {} or gemini.api_key)",
            API_KEY_ENV
        );
    }

    if cfg.gemini.models.is_empty() {
        anyhow::bail!("At least one model must be configured");
    }

    if cfg.gemini.models.iter().any(|m| m.trim().is_empty()) {
        anyhow::bail!("Model names cannot be empty");
    }

    if let Some(default_model) = &cfg.gemini.default_model {
        if !cfg.gemini.models.contains(default_model) {
            anyhow::bail!(
                "Default model '{}' is not in the configured models list",
                default_model
            );
        }
    }

    if cfg.gemini.base_url.trim().is_empty() {
        anyhow::bail!("Gemini base URL cannot be empty");
    }

    if cfg.database.max_connections == 0 {
        anyhow::bail!("Database pool needs at least one connection");
    }

    Ok(())
}

#[cfg(test)]
pub(crate) fn create_test_config() -> Config {
    Config {
        server: ServerConfig::default(),
        gemini: GeminiConfig {
            api_key: "test-gemini-key".to_string(),
            base_url: default_base_url(),
            timeout_seconds: 30,
            models: vec!["gemini-1.5-flash".to_string(), "gemini-1.5-pro".to_string()],
            default_model: Some("gemini-1.5-flash".to_string()),
        },
        database: DatabaseConfig::default(),
    }
}
