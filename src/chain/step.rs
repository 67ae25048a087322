use std::time::Duration;

use serde::ser::SerializeTuple;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Continuation signal reported by the model after each step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextAction {
    Continue,
    Reflect,
    FinalAnswer,
}

impl NextAction {
    /// Unknown values read as `Continue`.
    pub fn parse(raw: &str) -> Self {
        let normalized = raw.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "final_answer" => Self::FinalAnswer,
            "reflect" => Self::Reflect,
            _ => Self::Continue,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Continue => "continue",
            Self::Reflect => "reflect",
            Self::FinalAnswer => "final_answer",
        }
    }
}

/// One step as returned by the model.
///
/// Fields the model adds beyond the known ones are kept in `extra` so
/// the record re-serializes as the model wrote it. `confidence` stays
/// there too, in whatever form the model sent; see [`StepRecord::confidence`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct StepRecord {
    #[serde(
        default,
        deserialize_with = "text_or_json",
        skip_serializing_if = "String::is_empty"
    )]
    pub title: String,
    #[serde(
        default,
        deserialize_with = "optional_text_or_json",
        skip_serializing_if = "Option::is_none"
    )]
    pub content: Option<String>,
    /// Raw value; see [`StepRecord::action`]
    #[serde(
        default,
        deserialize_with = "optional_text_or_json",
        skip_serializing_if = "Option::is_none"
    )]
    pub next_action: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
    /// Set on synthetic records; never sent to the model
    #[serde(skip)]
    pub failed: bool,
}

impl StepRecord {
    /// Synthetic record standing in for a step the service never delivered.
    pub fn error(content: String, next_action: Option<NextAction>) -> Self {
        Self {
            title: "Error".to_string(),
            content: Some(content),
            next_action: next_action.map(|a| a.as_str().to_string()),
            failed: true,
            ..Default::default()
        }
    }

    /// A missing signal means keep going.
    pub fn action(&self) -> NextAction {
        self.next_action
            .as_deref()
            .map_or(NextAction::Continue, NextAction::parse)
    }

    /// Self-reported confidence. Accepts `0.8` and `"0.8"`; anything
    /// else reads as absent.
    pub fn confidence(&self) -> Option<f64> {
        match self.extra.get("confidence")? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| self.title.clone())
    }

    /// Answer text of a final step: `content`, else `final_answer`,
    /// else the whole record.
    pub fn answer_text(&self) -> String {
        if let Some(ref content) = self.content {
            return content.clone();
        }
        match self.extra.get("final_answer") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => self.to_json(),
        }
    }
}

fn text_or_json<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(optional_text_or_json(deserializer)?.unwrap_or_default())
}

/// Models sometimes return structured content; keep it as JSON text.
fn optional_text_or_json<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    })
}

/// A displayed chain entry: `(label, content, elapsed)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainEntry {
    pub label: String,
    pub content: String,
    pub elapsed: Duration,
    /// Self-reported confidence, when the profile asks for one
    pub confidence: Option<f64>,
}

impl ChainEntry {
    pub const FINAL_LABEL: &'static str = "Final Answer";

    pub fn is_final(&self) -> bool {
        self.label == Self::FINAL_LABEL
    }
}

/// Serialized as `[label, content, elapsed_seconds]`.
impl Serialize for ChainEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(3)?;
        tuple.serialize_element(&self.label)?;
        tuple.serialize_element(&self.content)?;
        tuple.serialize_element(&self.elapsed.as_secs_f64())?;
        tuple.end()
    }
}

/// A finished chain; serializes to the downloadable trace envelope.
#[derive(Debug, Clone, Serialize)]
pub struct ReasoningChain {
    pub steps: Vec<ChainEntry>,
    #[serde(serialize_with = "as_secs")]
    pub total_thinking_time: Duration,
}

fn as_secs<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(d.as_secs_f64())
}

impl ReasoningChain {
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// What a run yields after each request.
#[derive(Debug, Clone)]
pub enum ChainSnapshot {
    /// Steps so far; no total yet.
    InProgress(Vec<ChainEntry>),
    /// Last snapshot of a run, final answer included.
    Complete(ReasoningChain),
}

impl ChainSnapshot {
    pub fn steps(&self) -> &[ChainEntry] {
        match self {
            Self::InProgress(steps) => steps,
            Self::Complete(chain) => &chain.steps,
        }
    }

    pub fn total_thinking_time(&self) -> Option<Duration> {
        match self {
            Self::InProgress(_) => None,
            Self::Complete(chain) => Some(chain.total_thinking_time),
        }
    }
}
