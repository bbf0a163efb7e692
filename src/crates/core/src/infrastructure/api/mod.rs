//! Assistant service RPCs
//!
//! The controller only talks to [`AssistantBackend`]; `HttpAssistantBackend` is the
//! reqwest implementation used in production.

pub mod http;
pub mod stream_handler;

pub use http::HttpAssistantBackend;

use crate::util::errors::ExploreResult;
use async_trait::async_trait;
use explore_core_types::{AttachmentFile, ChatRequest, ChatResponse, HealthStatus};
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait AssistantBackend: Send + Sync {
    /// Sends one chat request. Implementations must stop work and return
    /// `ExploreError::Cancelled` once `cancel` fires.
    async fn send_chat(
        &self,
        request: &ChatRequest,
        bearer_token: &str,
        cancel: &CancellationToken,
    ) -> ExploreResult<ChatResponse>;

    /// Server-side text extraction for binary documents (pdf/doc/docx).
    async fn extract_text(
        &self,
        filename: &str,
        bytes: Vec<u8>,
        bearer_token: &str,
    ) -> ExploreResult<AttachmentFile>;

    async fn health(&self) -> ExploreResult<HealthStatus>;
}
