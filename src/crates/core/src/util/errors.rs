//! Error types shared across the core library

use thiserror::Error;

pub type ExploreResult<T> = Result<T, ExploreError>;

#[derive(Debug, Error)]
pub enum ExploreError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("{detail}")]
    Http { status: u16, detail: String },

    #[error("Not authenticated: {0}")]
    Auth(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Failed to extract text from {filename}: {message}")]
    Extraction { filename: String, message: String },

    #[error("Unsupported attachment: {0}")]
    UnsupportedAttachment(String),

    #[error("Attachment {filename} is too large: {size} bytes (limit {limit})")]
    AttachmentTooLarge {
        filename: String,
        size: usize,
        limit: usize,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExploreError {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn extraction(filename: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Extraction {
            filename: filename.into(),
            message: msg.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Failures caused by the service or the network rather than by local state.
    pub fn is_transport_class(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Http { .. } | Self::Auth(_) | Self::Serialization(_)
        )
    }

    /// Message shown in the assistant panel.
    pub fn user_message(&self) -> String {
        match self {
            Self::Http { detail, .. } => detail.clone(),
            Self::Auth(_) => "Not authenticated".to_string(),
            Self::Transport(msg) => msg.clone(),
            Self::Extraction { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for ExploreError {
    fn from(error: reqwest::Error) -> Self {
        if let Some(status) = error.status() {
            return Self::Http {
                status: status.as_u16(),
                detail: format!("HTTP {}", status.as_u16()),
            };
        }
        Self::Transport(error.to_string())
    }
}

impl From<toml::de::Error> for ExploreError {
    fn from(error: toml::de::Error) -> Self {
        Self::Config(error.to_string())
    }
}
