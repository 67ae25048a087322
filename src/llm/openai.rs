//! OpenAI-compatible chat completions provider.
//!
//! Calls `POST {base_url}/chat/completions` with Bearer token
//! authentication. Works with any server that speaks the same format
//! (OpenAI, Groq, DashScope, vLLM, Ollama's `/v1` endpoint, ...).

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, Proxy};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::LlmConfig;
use super::client::LlmClient;
use super::{ChatRequest, ChatResponse, Message};

// ── API request types ────────────────────────────────────

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    max_tokens: u32,
    temperature: f32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

// ── API response types ───────────────────────────────────

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

// ── OpenAiClient ─────────────────────────────────────────

/// Client for OpenAI-compatible `/chat/completions` endpoints.
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAiClient {
    /// Creates a client from configuration.
    ///
    /// Fails if the proxy URL is invalid or the TLS backend can't be
    /// initialised.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        if let Some(ref proxy) = config.proxy {
            builder = builder.proxy(Proxy::all(proxy)?);
        }
        // Strip trailing slash for consistent URL construction
        let base_url = config.base_url.trim_end_matches('/').to_string();
        Ok(Self {
            client: builder.build()?,
            api_key: config.api_key.clone(),
            base_url,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let body = CompletionRequest {
            model: &request.model,
            messages: &request.messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream: false,
            response_format: request.json_output.then_some(ResponseFormat {
                format_type: "json_object",
            }),
        };

        debug!(
            "Calling chat completions ({}) with {} messages",
            request.model,
            request.messages.len()
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Chat completion API error ({status}): {body}");
        }

        let resp: CompletionResponse = response.json().await?;
        into_chat_response(resp)
    }

    fn description(&self) -> String {
        format!("openai ({})", self.base_url)
    }
}

/// Normalizes the wire response: first choice text, usage, truncation flag.
fn into_chat_response(resp: CompletionResponse) -> Result<ChatResponse> {
    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("Chat completion returned no choices"))?;

    let text = choice
        .message
        .content
        .ok_or_else(|| anyhow::anyhow!("Chat completion returned an empty message"))?;

    let truncated = matches!(
        choice.finish_reason.as_deref(),
        Some("length" | "max_tokens" | "MAX_TOKENS")
    );

    let (prompt_tokens, completion_tokens) = resp
        .usage
        .map(|u| (u.prompt_tokens, u.completion_tokens))
        .unwrap_or((0, 0));

    debug!("LLM response: {prompt_tokens} in / {completion_tokens} out tokens");
    if truncated {
        warn!("LLM response was cut off at the token limit");
    }

    Ok(ChatResponse {
        text,
        prompt_tokens,
        completion_tokens,
        truncated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::llm_config;

    #[test]
    fn test_endpoint_strips_trailing_slash() {
        let mut config = llm_config();
        config.base_url = "https://api.example.com/v1/".to_string();
        let client = OpenAiClient::new(&config).unwrap();
        assert_eq!(client.endpoint(), "https://api.example.com/v1/chat/completions");
    }

    #[test]
    fn test_description() {
        let client = OpenAiClient::new(&llm_config()).unwrap();
        assert_eq!(client.description(), "openai (http://localhost:8080/v1)");
    }

    #[test]
    fn test_with_proxy_and_timeout() {
        let mut config = llm_config();
        config.proxy = Some("http://127.0.0.1:3128".to_string());
        config.timeout_secs = Some(30);
        assert!(OpenAiClient::new(&config).is_ok());
    }

    // ── Request serialization ────────────────────────────

    #[test]
    fn test_request_serialization_json_mode() {
        let messages = vec![Message::system("sys"), Message::user("hi")];
        let body = CompletionRequest {
            model: "gpt-4o",
            messages: &messages,
            max_tokens: 4096,
            temperature: 0.5,
            stream: false,
            response_format: Some(ResponseFormat {
                format_type: "json_object",
            }),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "gpt-4o");
        assert_eq!(json["max_tokens"], 4096);
        assert_eq!(json["stream"], false);
        assert_eq!(json["response_format"]["type"], "json_object");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
    }

    #[test]
    fn test_request_serialization_omits_response_format() {
        let body = CompletionRequest {
            model: "gpt-4o",
            messages: &[],
            max_tokens: 16,
            temperature: 0.0,
            stream: false,
            response_format: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("response_format").is_none());
    }

    // ── Response parsing ─────────────────────────────────

    #[test]
    fn test_response_parsing() {
        let json = r#"{
            "id": "chatcmpl-1",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "{\"a\": 1}"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 120, "completion_tokens": 30, "total_tokens": 150}
        }"#;
        let resp: CompletionResponse = serde_json::from_str(json).unwrap();
        let out = into_chat_response(resp).unwrap();
        assert_eq!(out.text, r#"{"a": 1}"#);
        assert_eq!(out.prompt_tokens, 120);
        assert_eq!(out.completion_tokens, 30);
        assert!(!out.truncated);
    }

    #[test]
    fn test_response_truncated() {
        let json = r#"{
            "choices": [{"message": {"content": "{\"title\": \"cut"}, "finish_reason": "length"}]
        }"#;
        let resp: CompletionResponse = serde_json::from_str(json).unwrap();
        let out = into_chat_response(resp).unwrap();
        assert!(out.truncated);
        assert_eq!(out.prompt_tokens, 0);
    }

    #[test]
    fn test_response_no_choices_fails() {
        let resp: CompletionResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(into_chat_response(resp).is_err());
    }

    #[test]
    fn test_response_null_content_fails() {
        let resp: CompletionResponse =
            serde_json::from_str(r#"{"choices": [{"message": {"content": null}}]}"#).unwrap();
        let err = into_chat_response(resp).unwrap_err();
        assert!(err.to_string().contains("empty message"));
    }
}
