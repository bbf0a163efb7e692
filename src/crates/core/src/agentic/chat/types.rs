use chrono::{DateTime, Utc};
use explore_core_types::{AttachmentFile, ChatMessage, ChatRole, SourceDocument};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Opaque turn identifier. Never reused within a process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TurnId(String);

impl TurnId {
    pub fn user() -> Self {
        Self(format!("user-{}", uuid::Uuid::new_v4()))
    }

    pub fn assistant() -> Self {
        Self(format!("assistant-{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TurnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TurnId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Pdf,
    Docx,
    Txt,
    Other,
}

impl AttachmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttachmentKind::Pdf => "pdf",
            AttachmentKind::Docx => "docx",
            AttachmentKind::Txt => "txt",
            AttachmentKind::Other => "other",
        }
    }

    pub fn from_file_type(file_type: &str) -> Self {
        match file_type.trim().to_lowercase().as_str() {
            "pdf" => AttachmentKind::Pdf,
            "doc" | "docx" => AttachmentKind::Docx,
            "txt" | "text" => AttachmentKind::Txt,
            _ => AttachmentKind::Other,
        }
    }
}

/// Extracted attachment, immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentRef {
    pub filename: String,
    pub extracted_text: String,
    pub kind: AttachmentKind,
}

impl AttachmentRef {
    pub fn to_wire(&self) -> AttachmentFile {
        AttachmentFile {
            filename: self.filename.clone(),
            content: self.extracted_text.clone(),
            file_type: self.kind.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRef {
    pub content: String,
    pub filename: String,
    #[serde(default)]
    pub page_number: Option<u32>,
    #[serde(default)]
    pub relevance_score: Option<f64>,
}

impl From<SourceDocument> for SourceRef {
    fn from(doc: SourceDocument) -> Self {
        Self {
            content: doc.content,
            filename: doc.filename,
            page_number: doc.page_number,
            relevance_score: doc.relevance_score,
        }
    }
}

/// Reveal state of an assistant reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantReply {
    pub sources: Vec<SourceRef>,
    /// Always a prefix of the owning turn's `content`.
    pub visible_content: String,
    pub is_revealing: bool,
    pub is_cancelled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum TurnKind {
    User { attachments: Vec<AttachmentRef> },
    Assistant(AssistantReply),
}

/// One message in the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    pub id: TurnId,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: TurnKind,
}

impl Turn {
    pub fn user(content: impl Into<String>, attachments: Vec<AttachmentRef>) -> Self {
        Self {
            id: TurnId::user(),
            content: content.into(),
            created_at: Utc::now(),
            kind: TurnKind::User { attachments },
        }
    }

    /// A reply that has not been revealed yet.
    pub fn assistant(
        content: impl Into<String>,
        sources: Vec<SourceRef>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let content = content.into();
        Self {
            id: TurnId::assistant(),
            kind: TurnKind::Assistant(AssistantReply {
                sources,
                visible_content: String::new(),
                is_revealing: !content.is_empty(),
                is_cancelled: false,
            }),
            content,
            created_at,
        }
    }

    pub fn role(&self) -> ChatRole {
        match self.kind {
            TurnKind::User { .. } => ChatRole::User,
            TurnKind::Assistant(_) => ChatRole::Assistant,
        }
    }

    pub fn is_user(&self) -> bool {
        matches!(self.kind, TurnKind::User { .. })
    }

    pub fn visible_content(&self) -> &str {
        match &self.kind {
            TurnKind::User { .. } => &self.content,
            TurnKind::Assistant(reply) => &reply.visible_content,
        }
    }

    pub fn is_revealing(&self) -> bool {
        matches!(&self.kind, TurnKind::Assistant(reply) if reply.is_revealing)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(&self.kind, TurnKind::Assistant(reply) if reply.is_cancelled)
    }

    pub fn attachments(&self) -> &[AttachmentRef] {
        match &self.kind {
            TurnKind::User { attachments } => attachments,
            TurnKind::Assistant(_) => &[],
        }
    }

    pub fn sources(&self) -> &[SourceRef] {
        match &self.kind {
            TurnKind::User { .. } => &[],
            TurnKind::Assistant(reply) => &reply.sources,
        }
    }

    pub fn to_chat_message(&self) -> ChatMessage {
        ChatMessage {
            role: self.role(),
            content: self.content.clone(),
        }
    }
}

/// Progress feedback for the in-flight request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    Thinking,
    Planning,
    Searching,
    Generating,
    Complete,
    Error,
}

impl Phase {
    /// Phases shown while a request is in flight, in display order.
    pub const ANIMATED: [Phase; 4] = [
        Phase::Thinking,
        Phase::Planning,
        Phase::Searching,
        Phase::Generating,
    ];

    pub fn is_loading(&self) -> bool {
        matches!(
            self,
            Phase::Thinking | Phase::Planning | Phase::Searching | Phase::Generating
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Thinking => "thinking",
            Phase::Planning => "planning",
            Phase::Searching => "searching",
            Phase::Generating => "generating",
            Phase::Complete => "complete",
            Phase::Error => "error",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extraction failure recorded for a single file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentError {
    pub filename: String,
    pub message: String,
}

/// Read-only view of the chat panel handed to presentation layers.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatSnapshot {
    pub messages: Arc<Vec<Turn>>,
    pub phase: Phase,
    pub is_loading: bool,
    pub error: Option<String>,
    pub attachments: Vec<AttachmentRef>,
    pub loading_attachment_filenames: Vec<String>,
    pub attachment_errors: Vec<AttachmentError>,
}

impl Default for ChatSnapshot {
    fn default() -> Self {
        Self {
            messages: Arc::new(Vec::new()),
            phase: Phase::Idle,
            is_loading: false,
            error: None,
            attachments: Vec::new(),
            loading_attachment_filenames: Vec::new(),
            attachment_errors: Vec::new(),
        }
    }
}
