//! Prompt/behaviour variants of the reasoning loop.
//!
//! - **classic**: plain step-by-step prompt, seeded acknowledgment,
//!   stops on the first `final_answer`, echoes `next_action` back
//! - **reflective**: dynamic CoT prompt with confidence scores, a
//!   minimum-step floor and a self-reflection every third step

use anyhow::Result;

use crate::config::ChainConfig;

const CLASSIC_PROMPT: &str = include_str!("../../prompts/classic.txt");
const REFLECTIVE_PROMPT: &str = include_str!("../../prompts/reflective.txt");

const CLASSIC_ACKNOWLEDGMENT: &str = "Thank you! I will now think step by step following my \
    instructions, starting at the beginning after decomposing the problem.";

pub const PROFILE_NAMES: &[&str] = &["classic", "reflective"];

#[derive(Debug, Clone)]
pub struct ChainProfile {
    pub name: String,
    pub system_prompt: String,
    /// Assistant turn inserted right after the user prompt
    pub seed_acknowledgment: Option<String>,
    /// `final_answer` before this many steps is answered with "keep going"
    pub min_steps: Option<u32>,
    /// Ask for a self-reflection every N steps
    pub reflection_every: Option<u32>,
    /// Send the raw `next_action` value back as the user turn
    pub echo_next_action: bool,
    pub recognizes_confidence: bool,
    pub recognizes_reflect: bool,
}

impl ChainProfile {
    pub fn classic() -> Self {
        Self {
            name: "classic".to_string(),
            system_prompt: CLASSIC_PROMPT.trim().to_string(),
            seed_acknowledgment: Some(CLASSIC_ACKNOWLEDGMENT.to_string()),
            min_steps: None,
            reflection_every: None,
            echo_next_action: true,
            recognizes_confidence: false,
            recognizes_reflect: false,
        }
    }

    pub fn reflective() -> Self {
        Self {
            name: "reflective".to_string(),
            system_prompt: REFLECTIVE_PROMPT.trim().to_string(),
            seed_acknowledgment: None,
            min_steps: Some(5),
            reflection_every: Some(3),
            echo_next_action: false,
            recognizes_confidence: true,
            recognizes_reflect: true,
        }
    }

    pub fn named(name: &str) -> Result<Self> {
        match name {
            "classic" => Ok(Self::classic()),
            "reflective" => Ok(Self::reflective()),
            other => anyhow::bail!(
                "Unknown chain profile '{other}'. Supported: {}",
                PROFILE_NAMES.join(", ")
            ),
        }
    }

    /// Profile from config, with its `min_steps` override applied.
    pub fn from_config(config: &ChainConfig) -> Result<Self> {
        let mut profile = Self::named(&config.profile)?;
        if config.min_steps.is_some() {
            profile.min_steps = config.min_steps;
        }
        Ok(profile)
    }

    /// True when step `step` falls on the reflection cadence.
    pub fn reflection_due(&self, step: u32) -> bool {
        matches!(self.reflection_every, Some(n) if n > 0 && step % n == 0)
    }
}
