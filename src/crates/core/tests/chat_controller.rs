use async_trait::async_trait;
use chrono::Utc;
use explore_core::agentic::chat::{AttachmentKind, AttachmentUpload, ChatController, ChatSnapshot, Phase, TurnId};
use explore_core::infrastructure::{AssistantBackend, CredentialProvider, StaticCredentialProvider};
use explore_core::service::config::ChatConfig;
use explore_core::{ExploreError, ExploreResult};
use explore_core_types::{
    AttachmentFile, ChatRequest, ChatResponse, ChatRole, HealthStatus, ModelPreference, SourceDocument,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

enum Scripted {
    Answer { text: String, delay: Duration },
    Fail { status: u16, detail: String },
}

#[derive(Default)]
struct FakeBackend {
    replies: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<ChatRequest>>,
    bearer_tokens: Mutex<Vec<String>>,
    cancelled_calls: Mutex<usize>,
    extractions: Mutex<HashMap<String, Result<String, String>>>,
    extract_calls: Mutex<Vec<String>>,
    extract_delay: Duration,
    extract_delays: Mutex<HashMap<String, Duration>>,
}

impl FakeBackend {
    fn with_extract_delay(delay: Duration) -> Self {
        Self {
            extract_delay: delay,
            ..Self::default()
        }
    }

    fn answer(&self, text: &str) {
        self.answer_after(text, Duration::ZERO);
    }

    fn answer_after(&self, text: &str, delay: Duration) {
        self.replies.lock().unwrap().push_back(Scripted::Answer {
            text: text.to_string(),
            delay,
        });
    }

    fn fail(&self, status: u16, detail: &str) {
        self.replies.lock().unwrap().push_back(Scripted::Fail {
            status,
            detail: detail.to_string(),
        });
    }

    fn extraction(&self, filename: &str, result: Result<&str, &str>) {
        self.extractions.lock().unwrap().insert(
            filename.to_string(),
            result.map(str::to_string).map_err(str::to_string),
        );
    }

    fn extraction_after(&self, filename: &str, content: &str, delay: Duration) {
        self.extraction(filename, Ok(content));
        self.extract_delays.lock().unwrap().insert(filename.to_string(), delay);
    }

    fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn cancelled_calls(&self) -> usize {
        *self.cancelled_calls.lock().unwrap()
    }
}

#[async_trait]
impl AssistantBackend for FakeBackend {
    async fn send_chat(
        &self,
        request: &ChatRequest,
        bearer_token: &str,
        cancel: &CancellationToken,
    ) -> ExploreResult<ChatResponse> {
        self.requests.lock().unwrap().push(request.clone());
        self.bearer_tokens.lock().unwrap().push(bearer_token.to_string());
        let scripted = self.replies.lock().unwrap().pop_front().unwrap_or(Scripted::Answer {
            text: "ok".to_string(),
            delay: Duration::ZERO,
        });

        match scripted {
            Scripted::Answer { text, delay } => {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        *self.cancelled_calls.lock().unwrap() += 1;
                        Err(ExploreError::Cancelled)
                    }
                    _ = tokio::time::sleep(delay) => Ok(ChatResponse {
                        answer: text,
                        sources: vec![SourceDocument {
                            content: "Excerpt".to_string(),
                            filename: "handbook.pdf".to_string(),
                            page_number: Some(4),
                            relevance_score: Some(0.82),
                        }],
                        timestamp: Utc::now(),
                    }),
                }
            }
            Scripted::Fail { status, detail } => Err(ExploreError::Http { status, detail }),
        }
    }

    async fn extract_text(
        &self,
        filename: &str,
        _bytes: Vec<u8>,
        _bearer_token: &str,
    ) -> ExploreResult<AttachmentFile> {
        self.extract_calls.lock().unwrap().push(filename.to_string());
        let delay = self
            .extract_delays
            .lock()
            .unwrap()
            .get(filename)
            .copied()
            .unwrap_or(self.extract_delay);
        tokio::time::sleep(delay).await;
        let scripted = self.extractions.lock().unwrap().get(filename).cloned();
        match scripted {
            Some(Ok(content)) => Ok(AttachmentFile {
                filename: filename.to_string(),
                content,
                file_type: "pdf".to_string(),
            }),
            Some(Err(detail)) => Err(ExploreError::Http { status: 400, detail }),
            None => Err(ExploreError::Http {
                status: 404,
                detail: "HTTP 404".to_string(),
            }),
        }
    }

    async fn health(&self) -> ExploreResult<HealthStatus> {
        Ok(HealthStatus {
            status: "healthy".to_string(),
            service: "fake".to_string(),
            timestamp: None,
        })
    }
}

/// Hands out a token only after `delay`.
struct SlowCredentials {
    delay: Duration,
}

#[async_trait]
impl CredentialProvider for SlowCredentials {
    async fn bearer_token(&self) -> ExploreResult<String> {
        tokio::time::sleep(self.delay).await;
        Ok("slow-token".to_string())
    }
}

fn controller_with(backend: Arc<FakeBackend>, credentials: Arc<dyn CredentialProvider>) -> ChatController {
    ChatController::new(ChatConfig::default(), backend, credentials)
}

fn controller(backend: Arc<FakeBackend>) -> ChatController {
    controller_with(
        backend,
        Arc::new(StaticCredentialProvider::new(Some("test-token".to_string()))),
    )
}

/// Distinct phases published until the panel settles back to idle after a reply.
async fn collect_phases_until_settled(mut rx: watch::Receiver<ChatSnapshot>) -> Vec<Phase> {
    let mut phases = vec![rx.borrow_and_update().phase];
    while rx.changed().await.is_ok() {
        let phase = rx.borrow_and_update().phase;
        if phases.last() != Some(&phase) {
            phases.push(phase);
        }
        if phase == Phase::Idle && phases.contains(&Phase::Complete) {
            break;
        }
    }
    phases
}

#[tokio::test(start_paused = true)]
async fn send_walks_every_phase_and_reveals_reply() {
    let backend = Arc::new(FakeBackend::default());
    backend.answer("Hello world");
    let chat = controller(backend.clone());

    let (phases, sent) = tokio::join!(
        collect_phases_until_settled(chat.subscribe()),
        chat.send_message("What is the leave policy?"),
    );
    sent.expect("send");

    assert_eq!(
        phases,
        vec![
            Phase::Idle,
            Phase::Thinking,
            Phase::Planning,
            Phase::Searching,
            Phase::Generating,
            Phase::Complete,
            Phase::Idle,
        ]
    );

    let snapshot = chat.snapshot();
    assert_eq!(snapshot.messages.len(), 2);
    assert!(snapshot.messages[0].is_user());
    assert_eq!(snapshot.messages[0].content, "What is the leave policy?");
    let reply = &snapshot.messages[1];
    assert_eq!(reply.role(), ChatRole::Assistant);
    assert_eq!(reply.content, "Hello world");
    assert_eq!(reply.visible_content(), "Hello world");
    assert!(!reply.is_revealing());
    assert!(!reply.is_cancelled());
    assert_eq!(reply.sources().len(), 1);
    assert_eq!(reply.sources()[0].page_number, Some(4));
    assert!(!snapshot.is_loading);
    assert!(snapshot.error.is_none());

    let requests = backend.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].query, "What is the leave policy?");
    assert!(requests[0].history.is_empty());
    assert!(requests[0].include_sources);
    assert_eq!(requests[0].model_preference, ModelPreference::Fast);
    assert_eq!(backend.bearer_tokens.lock().unwrap().as_slice(), ["test-token".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn phase_is_planning_one_second_in() {
    let backend = Arc::new(FakeBackend::default());
    backend.answer_after("later", Duration::from_secs(10));
    let chat = controller(backend);

    let task = tokio::spawn({
        let chat = chat.clone();
        async move { chat.send_message("hi").await }
    });
    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(chat.phase(), Phase::Planning);
    assert!(chat.is_loading());

    chat.cancel_request();
    task.await.expect("join").expect("send");
}

#[tokio::test(start_paused = true)]
async fn follow_up_sends_prior_turns_as_context() {
    let backend = Arc::new(FakeBackend::default());
    backend.answer("First answer");
    backend.answer("Second answer");
    let chat = controller(backend.clone());

    chat.send_message("first").await.expect("send");
    chat.send_message("second").await.expect("send");

    let requests = backend.requests();
    assert_eq!(requests.len(), 2);
    let history = &requests[1].history;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, ChatRole::User);
    assert_eq!(history[0].content, "first");
    assert_eq!(history[1].role, ChatRole::Assistant);
    assert_eq!(history[1].content, "First answer");
    assert_eq!(chat.snapshot().messages.len(), 4);
}

#[tokio::test(start_paused = true)]
async fn blank_or_concurrent_sends_are_ignored() {
    let backend = Arc::new(FakeBackend::default());
    backend.answer("only");
    let chat = controller(backend.clone());

    chat.send_message("   ").await.expect("blank send");
    assert!(chat.snapshot().messages.is_empty());

    let task = tokio::spawn({
        let chat = chat.clone();
        async move { chat.send_message("first").await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    chat.send_message("second").await.expect("ignored send");
    task.await.expect("join").expect("send");

    assert_eq!(backend.requests().len(), 1);
    let snapshot = chat.snapshot();
    assert_eq!(snapshot.messages.len(), 2);
    assert_eq!(snapshot.messages[0].content, "first");
}

#[tokio::test(start_paused = true)]
async fn cancel_during_animation_drops_the_reply() {
    let backend = Arc::new(FakeBackend::default());
    backend.answer_after("never shown", Duration::from_secs(2));
    let chat = controller(backend.clone());

    let task = tokio::spawn({
        let chat = chat.clone();
        async move { chat.send_message("hi").await }
    });
    tokio::time::sleep(Duration::from_millis(1000)).await;
    chat.cancel_request();
    let after_first = chat.snapshot();
    chat.cancel_request();
    assert_eq!(chat.snapshot(), after_first);

    task.await.expect("join").expect("send");
    tokio::time::sleep(Duration::from_secs(5)).await;

    let snapshot = chat.snapshot();
    assert_eq!(snapshot.phase, Phase::Idle);
    assert_eq!(snapshot.messages.len(), 1);
    assert!(snapshot.messages[0].is_user());
    assert!(snapshot.error.is_none());
    assert_eq!(backend.cancelled_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancel_during_reveal_keeps_partial_reply() {
    let backend = Arc::new(FakeBackend::default());
    let answer = "abcdefghijklmnopqrstuvwxyz";
    backend.answer(answer);
    let chat = controller(backend);

    let task = tokio::spawn({
        let chat = chat.clone();
        async move { chat.send_message("alphabet").await }
    });
    // Animation ends at 3200ms, then one chunk per 20ms tick.
    tokio::time::sleep(Duration::from_millis(3250)).await;
    let mid = chat.snapshot();
    assert_eq!(mid.phase, Phase::Complete);
    assert!(mid.messages[1].is_revealing());

    chat.cancel_request();
    task.await.expect("join").expect("send");

    let snapshot = chat.snapshot();
    assert_eq!(snapshot.phase, Phase::Idle);
    assert_eq!(snapshot.messages.len(), 2);
    let reply = &snapshot.messages[1];
    assert!(reply.is_cancelled());
    assert!(!reply.is_revealing());
    assert!(!reply.visible_content().is_empty());
    assert!(reply.visible_content().len() < answer.len());
    assert!(answer.starts_with(reply.visible_content()));
    assert_eq!(reply.content, answer);
}

#[tokio::test(start_paused = true)]
async fn new_send_during_reveal_supersedes_it() {
    let backend = Arc::new(FakeBackend::default());
    backend.answer("abcdefghijklmnopqrstuvwxyz");
    backend.answer("second");
    let chat = controller(backend.clone());

    let task = tokio::spawn({
        let chat = chat.clone();
        async move { chat.send_message("first").await }
    });
    tokio::time::sleep(Duration::from_millis(3250)).await;
    chat.send_message("next").await.expect("send");
    task.await.expect("join").expect("send");

    let snapshot = chat.snapshot();
    assert_eq!(snapshot.messages.len(), 4);
    assert!(snapshot.messages[1].is_cancelled());
    assert_eq!(snapshot.messages[3].visible_content(), "second");
    assert_eq!(snapshot.phase, Phase::Idle);

    let requests = backend.requests();
    assert_eq!(requests[1].history.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn service_error_sets_error_phase_then_resets() {
    let backend = Arc::new(FakeBackend::default());
    backend.fail(503, "Service unavailable");
    let chat = controller(backend);

    chat.send_message("hi").await.expect("send");
    let snapshot = chat.snapshot();
    assert_eq!(snapshot.phase, Phase::Error);
    assert_eq!(snapshot.error.as_deref(), Some("Service unavailable"));
    assert_eq!(snapshot.messages.len(), 1);

    tokio::time::sleep(Duration::from_millis(2900)).await;
    assert_eq!(chat.phase(), Phase::Error);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(chat.phase(), Phase::Idle);
    assert_eq!(chat.snapshot().messages.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn missing_token_fails_without_network_call() {
    let backend = Arc::new(FakeBackend::default());
    let chat = controller_with(backend.clone(), Arc::new(StaticCredentialProvider::new(None)));

    chat.send_message("hi").await.expect("send");
    let snapshot = chat.snapshot();
    assert_eq!(snapshot.phase, Phase::Error);
    assert_eq!(snapshot.error.as_deref(), Some("Not authenticated"));
    assert!(backend.requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn cancel_while_fetching_token_sends_nothing() {
    let backend = Arc::new(FakeBackend::default());
    let chat = controller_with(
        backend.clone(),
        Arc::new(SlowCredentials {
            delay: Duration::from_millis(500),
        }),
    );

    let task = tokio::spawn({
        let chat = chat.clone();
        async move { chat.send_message("hi").await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    chat.cancel_request();
    task.await.expect("join").expect("send");
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert!(backend.requests().is_empty());
    let snapshot = chat.snapshot();
    assert_eq!(snapshot.phase, Phase::Idle);
    assert_eq!(snapshot.messages.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn stale_error_reset_does_not_clear_newer_error() {
    let backend = Arc::new(FakeBackend::default());
    let chat = controller_with(backend, Arc::new(StaticCredentialProvider::new(None)));

    chat.send_message("first").await.expect("send");
    tokio::time::sleep(Duration::from_millis(2000)).await;
    chat.send_message("second").await.expect("send");
    assert_eq!(chat.phase(), Phase::Error);

    // First reset would fire at 3000ms.
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(chat.phase(), Phase::Error);

    tokio::time::sleep(Duration::from_millis(2000)).await;
    assert_eq!(chat.phase(), Phase::Idle);
}

#[tokio::test(start_paused = true)]
async fn edit_truncates_and_resends() {
    let backend = Arc::new(FakeBackend::default());
    backend.answer("a0");
    backend.answer("a1");
    backend.answer("a1 edited");
    let chat = controller(backend.clone());

    chat.send_message("q0").await.expect("send");
    chat.send_message("q1").await.expect("send");
    let before = chat.snapshot();
    assert_eq!(before.messages.len(), 4);
    let edited_id = before.messages[2].id.clone();

    chat.edit_and_resend(&edited_id, "q1 rephrased").await.expect("edit");

    let after = chat.snapshot();
    assert_eq!(after.messages.len(), 4);
    assert_eq!(after.messages[0], before.messages[0]);
    assert_eq!(after.messages[1], before.messages[1]);
    assert_eq!(after.messages[2].id, edited_id);
    assert_eq!(after.messages[2].content, "q1 rephrased");
    assert_eq!(after.messages[2].created_at, before.messages[2].created_at);
    assert_ne!(after.messages[3].id, before.messages[3].id);
    assert_eq!(after.messages[3].content, "a1 edited");

    let request = backend.requests().pop().expect("request");
    assert_eq!(request.query, "q1 rephrased");
    assert_eq!(request.history.len(), 2);
}

/// Sends `query` and cancels it before the reply lands, leaving a bare user turn.
async fn send_and_cancel(chat: &ChatController, query: &str) {
    let task = tokio::spawn({
        let chat = chat.clone();
        let query = query.to_string();
        async move { chat.send_message(&query).await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    chat.cancel_request();
    task.await.expect("join").expect("send");
}

#[tokio::test(start_paused = true)]
async fn edit_shows_truncated_history_before_the_reply() {
    let backend = Arc::new(FakeBackend::default());
    backend.answer_after("never", Duration::from_secs(10));
    backend.answer("a1");
    backend.answer_after("never", Duration::from_secs(10));
    backend.answer("X answered");
    let chat = controller(backend);

    send_and_cancel(&chat, "t0").await;
    chat.send_message("t1").await.expect("send");
    send_and_cancel(&chat, "t3").await;
    let before = chat.snapshot();
    assert_eq!(before.messages.len(), 4);
    let t1 = before.messages[1].id.clone();

    let task = tokio::spawn({
        let chat = chat.clone();
        let t1 = t1.clone();
        async move { chat.edit_and_resend(&t1, "X").await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    let during = chat.snapshot();
    assert_eq!(during.messages.len(), 2);
    assert_eq!(during.messages[0], before.messages[0]);
    assert_eq!(during.messages[1].id, t1);
    assert_eq!(during.messages[1].content, "X");

    task.await.expect("join").expect("edit");
    let after = chat.snapshot();
    assert_eq!(after.messages.len(), 3);
    assert_eq!(after.messages[2].content, "X answered");
}

#[tokio::test(start_paused = true)]
async fn edit_of_first_turn_drops_everything_after_it() {
    let backend = Arc::new(FakeBackend::default());
    let chat = controller(backend.clone());

    chat.send_message("q0").await.expect("send");
    chat.send_message("q1").await.expect("send");
    let first = chat.snapshot().messages[0].id.clone();

    chat.edit_and_resend(&first, "q0 again").await.expect("edit");
    let snapshot = chat.snapshot();
    assert_eq!(snapshot.messages.len(), 2);
    assert_eq!(snapshot.messages[0].id, first);
    assert!(backend.requests().last().expect("request").history.is_empty());
}

#[tokio::test(start_paused = true)]
async fn edit_rejects_bad_targets() {
    let backend = Arc::new(FakeBackend::default());
    let chat = controller(backend.clone());
    chat.send_message("q0").await.expect("send");
    let snapshot = chat.snapshot();

    let missing = chat.edit_and_resend(&TurnId::from("user-missing"), "x").await;
    assert!(matches!(missing, Err(ExploreError::NotFound(_))));

    let assistant = chat.edit_and_resend(&snapshot.messages[1].id, "x").await;
    assert!(matches!(assistant, Err(ExploreError::Validation(_))));

    let blank = chat.edit_and_resend(&snapshot.messages[0].id, "  ").await;
    assert!(matches!(blank, Err(ExploreError::Validation(_))));

    assert_eq!(chat.snapshot(), snapshot);
    assert_eq!(backend.requests().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn regenerate_replaces_last_reply() {
    let backend = Arc::new(FakeBackend::default());
    backend.answer("first try");
    backend.answer("second try");
    let chat = controller(backend.clone());

    chat.send_message("explain").await.expect("send");
    let before = chat.snapshot();
    chat.regenerate_response().await.expect("regenerate");
    let after = chat.snapshot();

    assert_eq!(after.messages.len(), 2);
    assert_eq!(after.messages[0], before.messages[0]);
    assert_ne!(after.messages[1].id, before.messages[1].id);
    assert_eq!(after.messages[1].content, "second try");

    let requests = backend.requests();
    assert_eq!(requests[1].query, "explain");
    assert!(requests[1].history.is_empty());
}

#[tokio::test(start_paused = true)]
async fn failed_regenerate_keeps_previous_reply() {
    let backend = Arc::new(FakeBackend::default());
    backend.answer("first try");
    backend.fail(503, "Service unavailable");
    let chat = controller(backend);

    chat.send_message("explain").await.expect("send");
    let before = chat.snapshot();
    chat.regenerate_response().await.expect("regenerate");

    let after = chat.snapshot();
    assert_eq!(after.phase, Phase::Error);
    assert_eq!(after.error.as_deref(), Some("Service unavailable"));
    assert_eq!(after.messages, before.messages);
}

#[tokio::test(start_paused = true)]
async fn cancelled_regenerate_keeps_previous_reply() {
    let backend = Arc::new(FakeBackend::default());
    backend.answer("first try");
    backend.answer_after("never", Duration::from_secs(10));
    let chat = controller(backend.clone());

    chat.send_message("explain").await.expect("send");
    let before = chat.snapshot();

    let task = tokio::spawn({
        let chat = chat.clone();
        async move { chat.regenerate_response().await }
    });
    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(chat.snapshot().messages, before.messages);
    chat.cancel_request();
    task.await.expect("join").expect("regenerate");

    let after = chat.snapshot();
    assert_eq!(after.phase, Phase::Idle);
    assert_eq!(after.messages, before.messages);
    assert!(!after.messages[1].is_cancelled());
    assert_eq!(backend.cancelled_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn regenerate_without_user_turn_is_noop() {
    let backend = Arc::new(FakeBackend::default());
    let chat = controller(backend.clone());
    chat.regenerate_response().await.expect("regenerate");
    assert!(backend.requests().is_empty());
    assert_eq!(chat.snapshot(), ChatSnapshot::default());
}

#[tokio::test(start_paused = true)]
async fn clear_chat_cancels_and_empties() {
    let backend = Arc::new(FakeBackend::default());
    backend.answer("done");
    backend.answer_after("never", Duration::from_secs(5));
    let chat = controller(backend.clone());
    chat.send_message("one").await.expect("send");

    let task = tokio::spawn({
        let chat = chat.clone();
        async move { chat.send_message("two").await }
    });
    tokio::time::sleep(Duration::from_millis(500)).await;
    chat.clear_chat();
    task.await.expect("join").expect("send");
    chat.clear_chat();

    let snapshot = chat.snapshot();
    assert!(snapshot.messages.is_empty());
    assert_eq!(snapshot.phase, Phase::Idle);
    assert!(snapshot.attachments.is_empty());
    assert_eq!(backend.cancelled_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn pdf_attachment_is_extracted_remotely_and_sent() {
    let backend = Arc::new(FakeBackend::default());
    backend.extraction("report.pdf", Ok("Quarterly numbers"));
    let chat = controller(backend.clone());

    let attachment = chat
        .add_attachment(AttachmentUpload::new("report.pdf", b"%PDF-1.7".to_vec()))
        .await
        .expect("attach");
    assert_eq!(attachment.kind, AttachmentKind::Pdf);
    assert_eq!(attachment.extracted_text, "Quarterly numbers");
    assert_eq!(chat.snapshot().attachments.len(), 1);

    chat.send_message("Summarize").await.expect("send");

    let request = backend.requests().pop().expect("request");
    assert_eq!(request.attachments.len(), 1);
    assert_eq!(request.attachments[0].filename, "report.pdf");
    assert_eq!(request.attachments[0].content, "Quarterly numbers");
    assert_eq!(request.attachments[0].file_type, "pdf");

    let snapshot = chat.snapshot();
    assert!(snapshot.attachments.is_empty());
    assert_eq!(snapshot.messages[0].attachments().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn text_attachment_is_decoded_locally() {
    let backend = Arc::new(FakeBackend::default());
    let chat = controller(backend.clone());

    let attachment = chat
        .add_attachment(AttachmentUpload::new("notes.txt", "plain words".as_bytes().to_vec()))
        .await
        .expect("attach");
    assert_eq!(attachment.kind, AttachmentKind::Txt);
    assert_eq!(attachment.extracted_text, "plain words");
    assert!(backend.extract_calls.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn text_mime_type_routes_extensionless_upload_locally() {
    let backend = Arc::new(FakeBackend::default());
    let chat = controller(backend.clone());

    let attachment = chat
        .add_attachment(AttachmentUpload::new("README", b"read me".to_vec()).with_mime_type("text/plain"))
        .await
        .expect("attach");
    assert_eq!(attachment.kind, AttachmentKind::Txt);
    assert!(backend.extract_calls.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn concurrent_extractions_land_in_completion_order() {
    let backend = Arc::new(FakeBackend::default());
    backend.extraction_after("slow.pdf", "slow text", Duration::from_millis(500));
    backend.extraction_after("quick.pdf", "quick text", Duration::from_millis(200));
    let chat = controller(backend.clone());

    let slow = tokio::spawn({
        let chat = chat.clone();
        async move { chat.add_attachment(AttachmentUpload::new("slow.pdf", b"%PDF".to_vec())).await }
    });
    let quick = tokio::spawn({
        let chat = chat.clone();
        async move { chat.add_attachment(AttachmentUpload::new("quick.pdf", b"%PDF".to_vec())).await }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    let loading = chat.snapshot().loading_attachment_filenames;
    assert_eq!(loading.len(), 2);
    assert!(loading.contains(&"slow.pdf".to_string()));
    assert!(loading.contains(&"quick.pdf".to_string()));
    assert!(chat.snapshot().attachments.is_empty());

    tokio::time::sleep(Duration::from_millis(200)).await;
    let snapshot = chat.snapshot();
    assert_eq!(snapshot.loading_attachment_filenames, vec!["slow.pdf".to_string()]);
    assert_eq!(snapshot.attachments.len(), 1);
    assert_eq!(snapshot.attachments[0].filename, "quick.pdf");

    // The slow extraction finishes while this request is still animating.
    chat.send_message("Compare them").await.expect("send");
    quick.await.expect("join").expect("quick attach");
    slow.await.expect("join").expect("slow attach");

    let request = backend.requests().pop().expect("request");
    assert_eq!(request.attachments.len(), 1);
    assert_eq!(request.attachments[0].filename, "quick.pdf");
    let snapshot = chat.snapshot();
    assert_eq!(snapshot.messages[0].attachments().len(), 1);
    assert_eq!(snapshot.messages[0].attachments()[0].filename, "quick.pdf");
    assert_eq!(snapshot.attachments.len(), 1);
    assert_eq!(snapshot.attachments[0].filename, "slow.pdf");
}

#[tokio::test(start_paused = true)]
async fn failed_extraction_is_isolated_to_its_file() {
    let backend = Arc::new(FakeBackend::default());
    backend.extraction("broken.pdf", Err("Could not parse PDF"));
    let chat = controller(backend);

    chat.add_attachment(AttachmentUpload::new("notes.txt", b"ok".to_vec()))
        .await
        .expect("attach");
    let result = chat
        .add_attachment(AttachmentUpload::new("broken.pdf", b"%PDF".to_vec()))
        .await;
    assert!(matches!(result, Err(ExploreError::Extraction { .. })));

    let snapshot = chat.snapshot();
    assert_eq!(snapshot.phase, Phase::Idle);
    assert!(snapshot.error.is_none());
    assert_eq!(snapshot.attachments.len(), 1);
    assert!(snapshot.loading_attachment_filenames.is_empty());
    assert_eq!(snapshot.attachment_errors.len(), 1);
    assert_eq!(snapshot.attachment_errors[0].filename, "broken.pdf");
    assert_eq!(snapshot.attachment_errors[0].message, "Could not parse PDF");
}

#[tokio::test(start_paused = true)]
async fn removal_during_extraction_drops_the_result() {
    let backend = Arc::new(FakeBackend::with_extract_delay(Duration::from_millis(500)));
    backend.extraction("slow.pdf", Ok("late text"));
    let chat = controller(backend);

    let task = tokio::spawn({
        let chat = chat.clone();
        async move {
            chat.add_attachment(AttachmentUpload::new("slow.pdf", b"%PDF".to_vec()))
                .await
        }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(chat.snapshot().loading_attachment_filenames, vec!["slow.pdf".to_string()]);

    assert!(chat.remove_attachment("slow.pdf"));
    let result = task.await.expect("join");
    assert!(matches!(result, Err(ExploreError::Cancelled)));

    let snapshot = chat.snapshot();
    assert!(snapshot.attachments.is_empty());
    assert!(snapshot.loading_attachment_filenames.is_empty());
}

#[tokio::test(start_paused = true)]
async fn oversized_attachment_is_rejected_before_upload() {
    let backend = Arc::new(FakeBackend::default());
    let config = ChatConfig {
        max_attachment_bytes: 8,
        ..ChatConfig::default()
    };
    let chat = ChatController::new(
        config,
        backend.clone(),
        Arc::new(StaticCredentialProvider::new(Some("t".to_string()))),
    );

    let result = chat
        .add_attachment(AttachmentUpload::new("big.pdf", vec![0u8; 9]))
        .await;
    assert!(matches!(result, Err(ExploreError::AttachmentTooLarge { size: 9, limit: 8, .. })));
    assert_eq!(chat.snapshot().attachment_errors.len(), 1);
    assert!(backend.extract_calls.lock().unwrap().is_empty());
}
