use std::time::{Duration, Instant};

use anyhow::Result;
use futures::Stream;
use tracing::{debug, info};
use uuid::Uuid;

use crate::llm::Message;

use super::client::StepClient;
use super::profile::ChainProfile;
use super::step::{ChainEntry, ChainSnapshot, NextAction, ReasoningChain, StepRecord};

/// Token budget of every step request.
pub const STEP_MAX_TOKENS: u32 = 4096;

/// Upper bound for `max_steps`.
pub const MAX_STEPS_LIMIT: u32 = 32;

const CONTINUE_TURN: &str = "Please continue with the next step in your analysis.";
const REFLECT_TURN: &str = "Please perform a detailed self-reflection on your reasoning so far, \
    considering potential biases and alternative viewpoints.";
const FINAL_TURN: &str = "Please provide a comprehensive final answer based on your reasoning \
    above, summarizing key points and addressing any uncertainties. Respond in JSON format with \
    'title' and 'content' keys.";

/// Caller-tunable knobs of one run.
#[derive(Debug, Clone)]
pub struct RunParams {
    pub max_steps: u32,
    pub temperature: f32,
    pub model: String,
}

impl RunParams {
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_STEPS_LIMIT).contains(&self.max_steps) {
            anyhow::bail!("max_steps must be between 1 and {MAX_STEPS_LIMIT}, got {}", self.max_steps);
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            anyhow::bail!("temperature must be between 0.0 and 1.0, got {}", self.temperature);
        }
        if self.model.trim().is_empty() {
            anyhow::bail!("model must not be empty");
        }
        Ok(())
    }
}

/// Runs the step-by-step protocol for one profile.
pub struct ChainDriver {
    client: StepClient,
    profile: ChainProfile,
}

impl ChainDriver {
    pub fn new(client: StepClient, profile: ChainProfile) -> Self {
        Self { client, profile }
    }

    pub fn profile(&self) -> &ChainProfile {
        &self.profile
    }

    /// Starts a run. Nothing is sent until the first [`ReasoningRun::next`].
    pub fn start(&self, prompt: &str, params: RunParams) -> Result<ReasoningRun<'_>> {
        params.validate()?;
        if prompt.trim().is_empty() {
            anyhow::bail!("prompt must not be empty");
        }

        let mut messages = vec![
            Message::system(self.profile.system_prompt.as_str()),
            Message::user(prompt),
        ];
        if let Some(ref ack) = self.profile.seed_acknowledgment {
            messages.push(Message::assistant(ack.as_str()));
        }

        let run_id = Uuid::new_v4();
        info!("[{run_id}] New {} run ({} steps max): {prompt}", self.profile.name, params.max_steps);

        Ok(ReasoningRun {
            driver: self,
            params,
            run_id,
            messages,
            steps: Vec::new(),
            step: 0,
            state: RunState::Stepping,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Stepping,
    Finalizing,
    Done,
}

/// One in-flight reasoning run.
///
/// Each [`next`](Self::next) performs exactly one request and yields the
/// chain so far. The last item is [`ChainSnapshot::Complete`]; after it
/// the run is exhausted and can't be restarted.
pub struct ReasoningRun<'a> {
    driver: &'a ChainDriver,
    params: RunParams,
    run_id: Uuid,
    messages: Vec<Message>,
    steps: Vec<ChainEntry>,
    step: u32,
    state: RunState,
}

impl<'a> ReasoningRun<'a> {
    /// Conversation sent so far.
    #[cfg(test)]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub async fn next(&mut self) -> Option<ChainSnapshot> {
        match self.state {
            RunState::Stepping => {
                self.run_step().await;
                Some(ChainSnapshot::InProgress(self.steps.clone()))
            }
            RunState::Finalizing => {
                let chain = self.finalize().await;
                self.state = RunState::Done;
                Some(ChainSnapshot::Complete(chain))
            }
            RunState::Done => None,
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = ChainSnapshot> + 'a {
        futures::stream::unfold(self, |mut run| async move {
            let snapshot = run.next().await?;
            Some((snapshot, run))
        })
    }

    async fn run_step(&mut self) {
        self.step += 1;
        let n = self.step;
        let profile = &self.driver.profile;
        info!("[{}] Step {n}", self.run_id);

        let started = Instant::now();
        let record = self
            .driver
            .client
            .call(
                &self.messages,
                STEP_MAX_TOKENS,
                self.params.temperature,
                &self.params.model,
                false,
            )
            .await;
        let elapsed = started.elapsed();
        info!("[{}] Step {n} done in {:.2}s", self.run_id, elapsed.as_secs_f64());

        self.steps.push(ChainEntry {
            label: step_label(n, &record.title),
            content: record.content.clone().unwrap_or_default(),
            elapsed,
            confidence: record.confidence().filter(|_| profile.recognizes_confidence),
        });
        self.messages.push(Message::assistant(record.to_json()));

        match self.transition(&record) {
            Some(turn) => self.messages.push(Message::user(turn)),
            None => self.state = RunState::Finalizing,
        }
    }

    /// User turn to send next, or `None` to finalize.
    fn transition(&self, record: &StepRecord) -> Option<String> {
        let profile = &self.driver.profile;
        let n = self.step;
        let max_steps = self.params.max_steps;
        let action = match record.action() {
            NextAction::Reflect if !profile.recognizes_reflect => NextAction::Continue,
            action => action,
        };

        if action == NextAction::FinalAnswer {
            if record.failed {
                info!("[{}] Step {n} failed, finalizing", self.run_id);
                return None;
            }
            let floor = profile.min_steps.map_or(0, |min| min.min(max_steps));
            if n < floor {
                debug!("[{}] Early final answer at step {n}, floor is {floor}", self.run_id);
                return Some(format!(
                    "Please continue your analysis with at least {} more steps before \
                     providing the final answer.",
                    floor - n
                ));
            }
            info!("[{}] Final answer reached", self.run_id);
            return None;
        }

        if n >= max_steps {
            info!("[{}] Reached the {max_steps}-step limit", self.run_id);
            return None;
        }

        if action == NextAction::Reflect || profile.reflection_due(n) {
            return Some(REFLECT_TURN.to_string());
        }

        if profile.echo_next_action {
            if let Some(ref raw) = record.next_action {
                return Some(raw.clone());
            }
        }
        Some(CONTINUE_TURN.to_string())
    }

    async fn finalize(&mut self) -> ReasoningChain {
        self.messages.push(Message::user(FINAL_TURN));

        let started = Instant::now();
        let record = self
            .driver
            .client
            .call(
                &self.messages,
                STEP_MAX_TOKENS,
                self.params.temperature,
                &self.params.model,
                true,
            )
            .await;
        let elapsed = started.elapsed();
        info!("[{}] Final answer in {:.2}s", self.run_id, elapsed.as_secs_f64());

        self.steps.push(ChainEntry {
            label: ChainEntry::FINAL_LABEL.to_string(),
            content: record.answer_text(),
            elapsed,
            confidence: None,
        });

        let total_thinking_time: Duration = self.steps.iter().map(|s| s.elapsed).sum();
        info!(
            "[{}] Total thinking time: {:.2}s over {} steps",
            self.run_id,
            total_thinking_time.as_secs_f64(),
            self.step
        );

        ReasoningChain {
            steps: self.steps.clone(),
            total_thinking_time,
        }
    }
}

fn step_label(n: u32, title: &str) -> String {
    let title = title.trim();
    if title.is_empty() {
        format!("Step {n}")
    } else {
        format!("Step {n}: {title}")
    }
}
