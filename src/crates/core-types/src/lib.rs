//! Explore shared wire DTOs
//!
//! Request/response shapes of the assistant chat service. Field names follow the
//! service's snake_case JSON; conversions into orchestrator types live in `explore-core`.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

/// Model routing hint understood by the chat service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelPreference {
    /// Low-latency model. Older clients send `flash`.
    #[default]
    #[serde(alias = "flash")]
    Fast,
    /// Slower model for complex reasoning.
    Thinking,
}

impl ModelPreference {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelPreference::Fast => "fast",
            ModelPreference::Thinking => "thinking",
        }
    }
}

/// One prior turn sent as conversation context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

/// Extracted attachment text, as accepted by the chat RPC and returned by the
/// extraction RPC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentFile {
    pub filename: String,
    pub content: String,
    #[serde(default = "default_file_type")]
    pub file_type: String,
}

fn default_file_type() -> String {
    "pdf".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub content: String,
    #[serde(default = "default_source_filename")]
    pub filename: String,
    #[serde(default)]
    pub page_number: Option<u32>,
    #[serde(default)]
    pub relevance_score: Option<f64>,
}

fn default_source_filename() -> String {
    "Unknown".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub query: String,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
    #[serde(default)]
    pub attachments: Vec<AttachmentFile>,
    #[serde(default = "default_include_sources")]
    pub include_sources: bool,
    #[serde(default)]
    pub model_preference: ModelPreference,
}

fn default_include_sources() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub answer: String,
    #[serde(default)]
    pub sources: Vec<SourceDocument>,
    #[serde(default = "Utc::now", deserialize_with = "deserialize_lenient_timestamp")]
    pub timestamp: DateTime<Utc>,
}

/// One `data:` payload of the chat service's event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatStreamEvent {
    /// Server-side progress hint (e.g. "searching").
    Phase { phase: String },
    Result {
        #[serde(default)]
        answer: String,
        #[serde(default)]
        sources: Vec<SourceDocument>,
    },
    Error {
        #[serde(default = "default_stream_error")]
        message: String,
    },
}

fn default_stream_error() -> String {
    "Server error".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub service: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status.eq_ignore_ascii_case("healthy")
    }
}

/// Accepts RFC 3339 as well as the naive ISO timestamps the service emits
/// (interpreted as UTC).
fn deserialize_lenient_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(serde::de::Error::custom)
}
