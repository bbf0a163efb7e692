use crate::util::errors::{ExploreError, ExploreResult};
use chrono::Utc;
use eventsource_stream::Eventsource;
use explore_core_types::{ChatResponse, ChatStreamEvent};
use futures::{Stream, StreamExt};
use log::{debug, trace, warn};
use std::fmt::Display;
use std::time::Duration;
use tokio::time::timeout;

const DONE_MARKER: &str = "[DONE]";

/// Drains the chat service's event stream into the final response.
///
/// `phase` events are informational only; an `error` event fails the request;
/// unparseable payloads are skipped.
pub async fn collect_chat_stream<S, B, E>(byte_stream: S, idle_timeout: Duration) -> ExploreResult<ChatResponse>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    let mut stream = std::pin::pin!(byte_stream.eventsource());
    let mut result: Option<ChatResponse> = None;

    loop {
        let sse = match timeout(idle_timeout, stream.next()).await {
            Ok(Some(Ok(sse))) => sse,
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                return Err(ExploreError::transport(format!("SSE stream error: {}", e)));
            }
            Err(_) => {
                return Err(ExploreError::transport(format!(
                    "SSE stream timeout after {}s",
                    idle_timeout.as_secs()
                )));
            }
        };

        let raw = sse.data;
        trace!("Chat SSE: {:?}", raw);
        if raw.trim() == DONE_MARKER {
            break;
        }

        let event: ChatStreamEvent = match serde_json::from_str(&raw) {
            Ok(event) => event,
            Err(e) => {
                warn!("Skipping unparseable chat SSE payload: error={}, data={}", e, raw);
                continue;
            }
        };

        match event {
            ChatStreamEvent::Phase { phase } => {
                debug!("Chat service phase: phase={}", phase);
            }
            ChatStreamEvent::Result { answer, sources } => {
                result = Some(ChatResponse {
                    answer,
                    sources,
                    timestamp: Utc::now(),
                });
            }
            ChatStreamEvent::Error { message } => {
                return Err(ExploreError::Transport(message));
            }
        }
    }

    result.ok_or_else(|| ExploreError::transport("No result received from server"))
}
