use std::sync::Arc;

use anyhow::Result;
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::backoff::RetryPolicy;
use crate::json::extract_json;
use crate::llm::{ChatRequest, LlmClient, Message};
use crate::repair::JsonRepair;

use super::step::{NextAction, StepRecord};

/// Completion client for reasoning steps.
///
/// Sends the conversation with JSON output requested, decodes the reply
/// into a [`StepRecord`], and retries on any failure. It never returns
/// an error: once the attempt budget is spent it hands back a synthetic
/// `"Error"` record instead.
pub struct StepClient {
    llm: Arc<dyn LlmClient>,
    repair: Arc<dyn JsonRepair>,
    retry: RetryPolicy,
}

impl StepClient {
    pub fn new(llm: Arc<dyn LlmClient>, repair: Arc<dyn JsonRepair>, retry: RetryPolicy) -> Self {
        Self { llm, repair, retry }
    }

    pub async fn call(
        &self,
        messages: &[Message],
        max_tokens: u32,
        temperature: f32,
        model: &str,
        is_final_step: bool,
    ) -> StepRecord {
        let request = ChatRequest {
            model: model.to_string(),
            messages: messages.to_vec(),
            max_tokens,
            temperature,
            json_output: true,
        };
        let max_attempts = self.retry.max_attempts;
        let mut attempt = 0;

        loop {
            attempt += 1;
            info!("Calling {model} (attempt {attempt}/{max_attempts})");

            let err = match self.attempt(&request, is_final_step).await {
                Ok(record) => {
                    debug!("Step decoded: {}", record.title);
                    return record;
                }
                Err(e) => e,
            };

            error!("Call failed (attempt {attempt}/{max_attempts}): {err}");

            if !self.retry.should_retry(attempt) {
                return if is_final_step {
                    error!("Giving up on the final answer after {attempt} attempts");
                    StepRecord::error(
                        format!("Failed to generate final answer after {attempt} attempts. Error: {err}"),
                        None,
                    )
                } else {
                    error!("Giving up on this step after {attempt} attempts");
                    StepRecord::error(
                        format!("Failed to generate step after {attempt} attempts. Error: {err}"),
                        Some(NextAction::FinalAnswer),
                    )
                };
            }

            let delay = self.retry.delay_after(attempt);
            info!("Retrying in {}ms", delay.as_millis());
            tokio::time::sleep(delay).await;
        }
    }

    async fn attempt(&self, request: &ChatRequest, is_final_step: bool) -> Result<StepRecord> {
        let response = self.llm.complete(request).await?;
        info!(
            "Step reply: {} in / {} out tokens",
            response.prompt_tokens, response.completion_tokens
        );
        if response.truncated {
            warn!("Step reply hit the token limit, JSON may be incomplete");
        }

        let object = self.decode(&response.text).await?;
        let record: StepRecord = serde_json::from_value(Value::Object(object))?;

        // The final answer may use `final_answer` instead of `content`
        if !is_final_step && record.content.is_none() {
            anyhow::bail!("step JSON has no `content` field");
        }
        Ok(record)
    }

    /// Tolerant extraction, then one repair pass.
    async fn decode(&self, text: &str) -> Result<Map<String, Value>> {
        match extract_json(text) {
            Ok(object) => Ok(object),
            Err(e) => {
                warn!("Could not decode step JSON ({e}), trying {} repair", self.repair.name());
                match self.repair.repair(text).await {
                    Some(object) => {
                        info!("JSON repaired");
                        Ok(object)
                    }
                    None => Err(e.into()),
                }
            }
        }
    }
}
