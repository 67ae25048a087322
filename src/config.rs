use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub llm: LlmConfig,
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub repair: RepairConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// OpenAI-compatible API root, e.g. "https://api.openai.com/v1"
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Supports ${ENV_VAR} substitution
    pub api_key: String,
    /// Model used when the caller doesn't pick one
    pub model: String,
    /// Models offered to the user. Anything else is a free-text override.
    #[serde(default)]
    pub models: Vec<String>,
    /// Request timeout; the transport default applies when unset
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// HTTP(S) proxy URL
    #[serde(default)]
    pub proxy: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChainConfig {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Overrides the profile's minimum-step floor
    #[serde(default)]
    pub min_steps: Option<u32>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    /// 1 keeps the delay fixed; larger values grow it after each failure
    #[serde(default = "default_multiplier")]
    pub multiplier: u32,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RepairStrategy {
    /// Ask the LLM to fix the broken JSON
    Llm,
    /// Local trailing-comma cleanup only
    Lenient,
    None,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RepairConfig {
    #[serde(default = "default_repair_strategy")]
    pub strategy: RepairStrategy,
    #[serde(default = "default_repair_model")]
    pub model: String,
    #[serde(default = "default_repair_temperature")]
    pub temperature: f32,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_profile() -> String {
    "reflective".to_string()
}

fn default_max_steps() -> u32 {
    10
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_attempts() -> u32 {
    3
}

fn default_delay_ms() -> u64 {
    1000
}

fn default_multiplier() -> u32 {
    1
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_repair_strategy() -> RepairStrategy {
    RepairStrategy::Llm
}

fn default_repair_model() -> String {
    "gpt-4o-2024-08-06".to_string()
}

fn default_repair_temperature() -> f32 {
    1.0
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            max_steps: default_max_steps(),
            temperature: default_temperature(),
            min_steps: None,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_delay_ms(),
            multiplier: default_multiplier(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            strategy: default_repair_strategy(),
            model: default_repair_model(),
            temperature: default_repair_temperature(),
        }
    }
}

impl RetryConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl LlmConfig {
    /// Picks the model for a run.
    ///
    /// `None` selects the configured default. A name outside the
    /// `models` list is still honoured as a free-text override.
    pub fn resolve_model(&self, requested: Option<&str>) -> String {
        match requested.map(str::trim).filter(|m| !m.is_empty()) {
            None => self.model.clone(),
            Some(name) => {
                if !self.models.is_empty() && !self.models.iter().any(|m| m == name) {
                    warn!("Model {name} is not in the configured model list, using it as an override");
                }
                name.to_string()
            }
        }
    }
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        // Expand environment variables like ${OPENAI_API_KEY}
        let expanded = shellexpand::env(content)?;
        let config: Config = toml::from_str(&expanded)?;
        if config.retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be at least 1");
        }
        Ok(config)
    }
}
