//! Scripted in-memory backend for tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use super::{ChatRequest, ChatResponse, LlmClient};

/// Replays a fixed list of replies and records every request.
///
/// `Err` entries are returned as transport failures. When the script
/// runs dry, `fallback` answers every further call (or the call fails if
/// there is none); see [`ScriptedLlm::always`].
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<Result<String, String>>>,
    fallback: Option<Result<String, String>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedLlm {
    pub fn new(replies: Vec<Result<String, String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answers every call with the same reply.
    pub fn always(reply: Result<String, String>) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: Some(reply),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self.replies.lock().unwrap().pop_front();
        let reply = match next.or_else(|| self.fallback.clone()) {
            Some(reply) => reply,
            None => anyhow::bail!("script exhausted"),
        };
        match reply {
            Ok(text) => Ok(ChatResponse {
                text,
                prompt_tokens: 0,
                completion_tokens: 0,
                truncated: false,
            }),
            Err(e) => anyhow::bail!("{e}"),
        }
    }

    fn description(&self) -> String {
        "scripted".to_string()
    }
}
