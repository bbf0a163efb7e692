use super::stream_handler::collect_chat_stream;
use super::AssistantBackend;
use crate::service::config::ApiConfig;
use crate::util::errors::{ExploreError, ExploreResult};
use async_trait::async_trait;
use explore_core_types::{AttachmentFile, ChatRequest, ChatResponse, HealthStatus};
use log::{debug, warn};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const CHAT_PATH: &str = "/api/v1/chat/";
const EXTRACT_PATH: &str = "/api/v1/chat/extract-text";
const HEALTH_PATH: &str = "/api/v1/chat/health";
const EVENT_STREAM_MIME_TYPE: &str = "text/event-stream";

/// reqwest client for the assistant chat service.
#[derive(Clone)]
pub struct HttpAssistantBackend {
    client: Client,
    base_url: String,
    stream_idle_timeout: Duration,
}

impl HttpAssistantBackend {
    pub fn new(config: &ApiConfig) -> ExploreResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ExploreError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            stream_idle_timeout: Duration::from_secs(config.request_timeout_secs),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_chat(&self, request: &ChatRequest, bearer_token: &str) -> ExploreResult<ChatResponse> {
        let url = self.url(CHAT_PATH);
        debug!(
            "Posting chat request: url={}, history_len={}, attachments={}",
            url,
            request.history.len(),
            request.attachments.len()
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(bearer_token)
            .header(ACCEPT, format!("{}, application/json", EVENT_STREAM_MIME_TYPE))
            .json(request)
            .send()
            .await?;
        let response = ensure_success(response).await?;

        let is_event_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .map(|ct| ct.as_bytes().starts_with(EVENT_STREAM_MIME_TYPE.as_bytes()))
            .unwrap_or(false);

        if is_event_stream {
            collect_chat_stream(response.bytes_stream(), self.stream_idle_timeout).await
        } else {
            Ok(response.json::<ChatResponse>().await?)
        }
    }
}

#[async_trait]
impl AssistantBackend for HttpAssistantBackend {
    async fn send_chat(
        &self,
        request: &ChatRequest,
        bearer_token: &str,
        cancel: &CancellationToken,
    ) -> ExploreResult<ChatResponse> {
        // Dropping the in-flight future aborts the HTTP request.
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ExploreError::Cancelled),
            result = self.post_chat(request, bearer_token) => result,
        }
    }

    async fn extract_text(
        &self,
        filename: &str,
        bytes: Vec<u8>,
        bearer_token: &str,
    ) -> ExploreResult<AttachmentFile> {
        let url = self.url(EXTRACT_PATH);
        debug!("Uploading attachment for extraction: filename={}, size={}", filename, bytes.len());

        let form = Form::new().part("file", Part::bytes(bytes).file_name(filename.to_string()));
        let response = self
            .client
            .post(&url)
            .bearer_auth(bearer_token)
            .multipart(form)
            .send()
            .await?;
        let response = ensure_success(response).await?;
        Ok(response.json::<AttachmentFile>().await?)
    }

    async fn health(&self) -> ExploreResult<HealthStatus> {
        let response = self.client.get(self.url(HEALTH_PATH)).send().await?;
        let response = ensure_success(response).await?;
        Ok(response.json::<HealthStatus>().await?)
    }
}

/// Maps non-2xx responses to `ExploreError::Http`, preferring the service's `detail`.
async fn ensure_success(response: Response) -> ExploreResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let detail = error_detail(&body).unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
    warn!("Assistant service returned error: status={}, detail={}", status.as_u16(), detail);
    Err(ExploreError::Http {
        status: status.as_u16(),
        detail,
    })
}

fn error_detail(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    match value.get("detail")? {
        Value::String(detail) if detail.is_empty() => None,
        Value::String(detail) => Some(detail.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}
