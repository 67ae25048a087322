//! `LlmClient` trait: abstraction over chat-completion backends.
//!
//! The step client and the LLM-backed JSON repair only see this trait,
//! so tests can swap the HTTP backend for a scripted one.

use anyhow::Result;
use async_trait::async_trait;

use super::{ChatRequest, ChatResponse};

/// Abstraction over chat-completion backends.
///
/// Implementations translate [`ChatRequest`] into their wire format and
/// normalize the reply into [`ChatResponse`]. Transport failures and
/// non-success statuses are returned as errors.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Sends a conversation and returns the assistant text.
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse>;

    /// Human-readable description of the backend, e.g. `"openai (https://api.openai.com/v1)"`.
    fn description(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time verification that `LlmClient` is object-safe.
    #[test]
    fn test_llm_client_is_object_safe() {
        fn _assert_object_safe(_: &dyn LlmClient) {}
    }
}
