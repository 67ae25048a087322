//! JSON repair strategies, tried once when tolerant extraction fails.
//!
//! - **llm**: sends the broken text to the chat service with a few-shot
//!   prompt whose only job is to emit corrected JSON
//! - **lenient**: local trailing-comma cleanup, no network
//! - **none**: never repairs

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::{RepairConfig, RepairStrategy};
use crate::json::{extract_json, remove_trailing_commas};
use crate::llm::{ChatRequest, LlmClient, Message};

/// Few-shot prompt data, embedded at compile time.
const REPAIR_FIXTURES: &str = include_str!("../prompts/json_repair.toml");

const REPAIR_MAX_TOKENS: u32 = 4096;

/// Turns an undecodable model reply into a JSON object, if it can.
#[async_trait]
pub trait JsonRepair: Send + Sync {
    async fn repair(&self, broken: &str) -> Option<Map<String, Value>>;

    fn name(&self) -> &str;
}

/// Builds the configured strategy.
pub fn from_config(config: &RepairConfig, llm: Arc<dyn LlmClient>) -> Result<Arc<dyn JsonRepair>> {
    Ok(match config.strategy {
        RepairStrategy::Llm => Arc::new(LlmRepair::new(llm, &config.model, config.temperature)?),
        RepairStrategy::Lenient => Arc::new(LenientRepair),
        RepairStrategy::None => Arc::new(NoRepair),
    })
}

// ── Fixtures ─────────────────────────────────────────────

#[derive(Debug, Deserialize, Clone)]
pub struct RepairFixtures {
    pub instructions: String,
    pub examples: Vec<RepairExample>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RepairExample {
    pub input: String,
    pub output: String,
}

impl RepairFixtures {
    pub fn builtin() -> Result<Self> {
        Ok(toml::from_str(REPAIR_FIXTURES)?)
    }

    /// `[system, (user, assistant)*, user(broken)]`
    fn conversation(&self, broken: &str) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.examples.len() * 2 + 2);
        messages.push(Message::system(self.instructions.trim()));
        for example in &self.examples {
            messages.push(Message::user(example.input.as_str()));
            messages.push(Message::assistant(example.output.as_str()));
        }
        messages.push(Message::user(broken));
        messages
    }
}

// ── LlmRepair ────────────────────────────────────────────

pub struct LlmRepair {
    llm: Arc<dyn LlmClient>,
    model: String,
    temperature: f32,
    fixtures: RepairFixtures,
}

impl LlmRepair {
    pub fn new(llm: Arc<dyn LlmClient>, model: &str, temperature: f32) -> Result<Self> {
        Ok(Self::with_fixtures(llm, model, temperature, RepairFixtures::builtin()?))
    }

    pub fn with_fixtures(
        llm: Arc<dyn LlmClient>,
        model: &str,
        temperature: f32,
        fixtures: RepairFixtures,
    ) -> Self {
        Self {
            llm,
            model: model.to_string(),
            temperature,
            fixtures,
        }
    }
}

#[async_trait]
impl JsonRepair for LlmRepair {
    async fn repair(&self, broken: &str) -> Option<Map<String, Value>> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: self.fixtures.conversation(broken),
            max_tokens: REPAIR_MAX_TOKENS,
            temperature: self.temperature,
            json_output: true,
        };

        debug!("Asking {} to repair {} chars of JSON", self.model, broken.len());

        let response = match self.llm.complete(&request).await {
            Ok(response) => response,
            Err(e) => {
                warn!("JSON repair call failed: {e}");
                return None;
            }
        };

        debug!(
            "Repair reply: {} in / {} out tokens",
            response.prompt_tokens, response.completion_tokens
        );

        match extract_json(&response.text) {
            Ok(map) => Some(map),
            Err(e) => {
                warn!("JSON repair returned unusable output: {e}");
                None
            }
        }
    }

    fn name(&self) -> &str {
        "llm"
    }
}

// ── LenientRepair / NoRepair ─────────────────────────────

pub struct LenientRepair;

#[async_trait]
impl JsonRepair for LenientRepair {
    async fn repair(&self, broken: &str) -> Option<Map<String, Value>> {
        extract_json(&remove_trailing_commas(broken)).ok()
    }

    fn name(&self) -> &str {
        "lenient"
    }
}

pub struct NoRepair;

#[async_trait]
impl JsonRepair for NoRepair {
    async fn repair(&self, _broken: &str) -> Option<Map<String, Value>> {
        None
    }

    fn name(&self) -> &str {
        "none"
    }
}
