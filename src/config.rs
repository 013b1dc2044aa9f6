use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub news: NewsConfig,
    #[serde(default)]
    pub prompts: PromptConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AiConfig {
    #[serde(default = "default_ai_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Base URL override (OpenAI-compatible gateway or Ollama host).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_ai_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Cleaning requests issued concurrently per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Pause between cleaning batches, to stay under provider rate limits.
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
    /// Dollars per 1k prompt tokens.
    #[serde(default)]
    pub input_cost_per_1k: f64,
    /// Dollars per 1k completion tokens.
    #[serde(default)]
    pub output_cost_per_1k: f64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: default_ai_provider(),
            model: None,
            url: None,
            timeout_secs: default_ai_timeout_secs(),
            max_retries: default_max_retries(),
            batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay_ms(),
            input_cost_per_1k: 0.0,
            output_cost_per_1k: 0.0,
        }
    }
}

fn default_ai_provider() -> String {
    "disabled".to_string()
}
fn default_ai_timeout_secs() -> u64 {
    60
}
fn default_max_retries() -> u32 {
    3
}
fn default_batch_size() -> usize {
    5
}
fn default_batch_delay_ms() -> u64 {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct NewsConfig {
    #[serde(default = "default_news_provider")]
    pub provider: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_lookback_days")]
    pub lookback_days: i64,
    #[serde(default = "default_news_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            provider: default_news_provider(),
            url: None,
            page_size: default_page_size(),
            lookback_days: default_lookback_days(),
            timeout_secs: default_news_timeout_secs(),
        }
    }
}

fn default_news_provider() -> String {
    "disabled".to_string()
}
fn default_page_size() -> u32 {
    10
}
fn default_lookback_days() -> i64 {
    180
}
fn default_news_timeout_secs() -> u64 {
    30
}

/// Optional replacements for the built-in system prompts.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct PromptConfig {
    pub cleaning_system: Option<String>,
    pub enrichment_system: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

impl AiConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

impl NewsConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

impl Config {
    /// Config with every collaborator disabled, backed by `db_path`.
    pub fn minimal(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig {
                path: db_path.into(),
            },
            ai: AiConfig::default(),
            news: NewsConfig::default(),
            prompts: PromptConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate_config(&config)?;
    Ok(config)
}

/// Ten years of news is the widest search window accepted.
pub const MAX_LOOKBACK_DAYS: i64 = 3650;

pub fn validate_config(config: &Config) -> Result<()> {
    if config.ai.batch_size == 0 {
        anyhow::bail!("ai.batch_size must be > 0");
    }

    match config.ai.provider.as_str() {
        "disabled" => {}
        "openai" | "ollama" => {
            if config.ai.model.is_none() {
                anyhow::bail!(
                    "ai.model must be specified when provider is '{}'",
                    config.ai.provider
                );
            }
        }
        other => anyhow::bail!(
            "Unknown AI provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    if !(1..=100).contains(&config.news.page_size) {
        anyhow::bail!("news.page_size must be in [1, 100]");
    }

    if !(1..=MAX_LOOKBACK_DAYS).contains(&config.news.lookback_days) {
        anyhow::bail!("news.lookback_days must be in [1, {}]", MAX_LOOKBACK_DAYS);
    }

    match config.news.provider.as_str() {
        "disabled" | "newsapi" => {}
        other => anyhow::bail!(
            "Unknown news provider: '{}'. Must be disabled or newsapi.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_toml_uses_defaults() {
        let config: Config = toml::from_str("[db]\npath = \"x.sqlite\"\n").unwrap();
        assert_eq!(config.ai.provider, "disabled");
        assert_eq!(config.ai.batch_size, 5);
        assert_eq!(config.news.lookback_days, 180);
        assert_eq!(config.server.bind, "127.0.0.1:8080");
        validate_config(&config).unwrap();
    }

    #[test]
    fn test_model_required_for_openai() {
        let config: Config =
            toml::from_str("[db]\npath = \"x\"\n[ai]\nprovider = \"openai\"\n").unwrap();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("ai.model"));
    }

    #[test]
    fn test_unknown_providers_rejected() {
        let config: Config =
            toml::from_str("[db]\npath = \"x\"\n[news]\nprovider = \"bing\"\n").unwrap();
        assert!(validate_config(&config).is_err());

        let config: Config =
            toml::from_str("[db]\npath = \"x\"\n[ai]\nprovider = \"gemini\"\nmodel = \"m\"\n")
                .unwrap();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_lookback_days_range() {
        for days in [0, -30, 3651, i64::MAX] {
            let mut config = Config::minimal("x.sqlite");
            config.news.lookback_days = days;
            let err = validate_config(&config).unwrap_err();
            assert!(err.to_string().contains("news.lookback_days"), "days = {}", days);
        }

        let mut config = Config::minimal("x.sqlite");
        config.news.lookback_days = MAX_LOOKBACK_DAYS;
        validate_config(&config).unwrap();
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let mut config = Config::minimal("x.sqlite");
        config.ai.batch_size = 0;
        assert!(validate_config(&config).is_err());
    }
}
