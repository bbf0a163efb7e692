//! Request lifecycle controller
//!
//! Drives one chat turn: user turn → phase animation joined with the chat RPC →
//! assistant turn → character reveal. All shared state sits in one `ChatState`
//! whose lock is never held across an await; every continuation re-checks that its
//! own request is still the active one before it mutates anything.

use super::attachments::{AttachmentPipeline, AttachmentSet, AttachmentUpload};
use super::history::{HistoryStore, TurnPatch};
use super::phase::{AnimationOutcome, PhaseAnimator};
use super::request::{ActiveRequest, RequestHandle, RequestStage};
use super::reveal::{RevealOutcome, StreamRevealer};
use super::types::{AttachmentRef, ChatSnapshot, Phase, SourceRef, Turn, TurnId};
use crate::infrastructure::api::{AssistantBackend, HttpAssistantBackend};
use crate::infrastructure::auth::CredentialProvider;
use crate::service::config::{ChatConfig, ExploreConfig};
use crate::util::errors::{ExploreError, ExploreResult};
use explore_core_types::{ChatMessage, ChatRequest};
use log::{debug, error, info, warn};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;

#[derive(Debug, Default)]
struct ChatState {
    history: HistoryStore,
    phase: Phase,
    /// Bumped on every phase change; a pending error reset only fires if it is unchanged.
    phase_epoch: u64,
    error: Option<String>,
    attachments: AttachmentSet,
    active: Option<ActiveRequest>,
    next_request_id: u64,
}

impl ChatState {
    fn set_phase(&mut self, phase: Phase) {
        if self.phase != phase {
            debug!("Chat phase changed: from={}, to={}", self.phase, phase);
            self.phase = phase;
            self.phase_epoch += 1;
        }
    }

    fn is_active(&self, handle: &RequestHandle) -> bool {
        !handle.is_cancelled()
            && self
                .active
                .as_ref()
                .map(|active| active.handle.id() == handle.id())
                .unwrap_or(false)
    }

    fn awaiting_reply(&self) -> bool {
        matches!(
            &self.active,
            Some(active) if active.stage == RequestStage::Pending && !active.handle.is_cancelled()
        )
    }

    /// Cancels the active request and settles whatever it left half-revealed.
    fn cancel_active(&mut self) -> bool {
        let Some(active) = self.active.take() else {
            return false;
        };
        active.handle.cancel();
        info!("Chat request cancelled: request_id={}", active.handle.id());
        self.settle_revealing();
        true
    }

    /// Partially revealed replies are kept and marked cancelled; replies with
    /// nothing visible yet are dropped.
    fn settle_revealing(&mut self) {
        let revealing: Vec<(TurnId, bool)> = self
            .history
            .snapshot()
            .iter()
            .filter(|turn| turn.is_revealing())
            .map(|turn| (turn.id.clone(), turn.visible_content().is_empty()))
            .collect();

        for (turn_id, nothing_visible) in revealing {
            let result = if nothing_visible {
                self.history.remove(&turn_id).map(|_| ())
            } else {
                self.history.replace_turn(&turn_id, TurnPatch::Cancelled).map(|_| ())
            };
            if let Err(e) = result {
                warn!("Failed to settle cancelled reply: turn_id={}, error={}", turn_id, e);
            }
        }
    }

    /// Supersedes any previous request and returns the new handle.
    fn begin_request(&mut self, origin_turn_id: TurnId) -> RequestHandle {
        self.cancel_active();
        self.error = None;
        self.set_phase(Phase::Idle);

        self.next_request_id += 1;
        let handle = RequestHandle::new(self.next_request_id, origin_turn_id);
        self.active = Some(ActiveRequest {
            handle: handle.clone(),
            stage: RequestStage::Pending,
        });
        handle
    }

    fn snapshot(&self) -> ChatSnapshot {
        ChatSnapshot {
            messages: self.history.snapshot(),
            phase: self.phase,
            is_loading: self.phase.is_loading(),
            error: self.error.clone(),
            attachments: self.attachments.pending().to_vec(),
            loading_attachment_filenames: self.attachments.in_flight().to_vec(),
            attachment_errors: self.attachments.errors().to_vec(),
        }
    }
}

/// Everything one request needs once its synchronous start has run.
struct RequestPlan {
    handle: RequestHandle,
    query: String,
    context: Vec<ChatMessage>,
    attachments: Vec<AttachmentRef>,
    /// Turns after this one are swapped for the new reply once it lands.
    replaces_after: Option<TurnId>,
}

struct ControllerInner {
    config: ChatConfig,
    backend: Arc<dyn AssistantBackend>,
    credentials: Arc<dyn CredentialProvider>,
    attachment_pipeline: AttachmentPipeline,
    animator: PhaseAnimator,
    state: Mutex<ChatState>,
    snapshots: watch::Sender<ChatSnapshot>,
}

impl ControllerInner {
    fn mutate<R>(&self, f: impl FnOnce(&mut ChatState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let result = f(&mut state);
        let next = state.snapshot();
        drop(state);
        self.snapshots.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        result
    }

    /// Runs `f` only while `handle` is still the live request.
    fn mutate_if_active<R>(&self, handle: &RequestHandle, f: impl FnOnce(&mut ChatState) -> R) -> Option<R> {
        self.mutate(|state| state.is_active(handle).then(|| f(state)))
    }
}

/// Coordinates the assistant panel of one conversation.
///
/// Cheap to clone; clones drive the same conversation. The async operations run
/// their pipeline to the end in the caller's task; spawn them to fire and forget.
#[derive(Clone)]
pub struct ChatController {
    inner: Arc<ControllerInner>,
}

impl ChatController {
    pub fn new(
        config: ChatConfig,
        backend: Arc<dyn AssistantBackend>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        let attachment_pipeline =
            AttachmentPipeline::new(backend.clone(), credentials.clone(), config.max_attachment_bytes);
        let animator = PhaseAnimator::new(config.phase_duration());
        let (snapshots, _) = watch::channel(ChatSnapshot::default());
        Self {
            inner: Arc::new(ControllerInner {
                config,
                backend,
                credentials,
                attachment_pipeline,
                animator,
                state: Mutex::new(ChatState::default()),
                snapshots,
            }),
        }
    }

    /// Controller talking to the configured HTTP service.
    pub fn from_config(config: &ExploreConfig, credentials: Arc<dyn CredentialProvider>) -> ExploreResult<Self> {
        let backend = Arc::new(HttpAssistantBackend::new(&config.api)?);
        Ok(Self::new(config.chat.clone(), backend, credentials))
    }

    pub fn backend(&self) -> Arc<dyn AssistantBackend> {
        self.inner.backend.clone()
    }

    pub fn snapshot(&self) -> ChatSnapshot {
        self.inner.snapshots.borrow().clone()
    }

    /// Receives a fresh snapshot after every state change.
    pub fn subscribe(&self) -> watch::Receiver<ChatSnapshot> {
        self.inner.snapshots.subscribe()
    }

    pub fn phase(&self) -> Phase {
        self.inner.snapshots.borrow().phase
    }

    pub fn is_loading(&self) -> bool {
        self.phase().is_loading()
    }

    /// Sends `query` with the pending attachments. Blank queries and calls made
    /// while a reply is still awaited are ignored.
    pub async fn send_message(&self, query: &str) -> ExploreResult<()> {
        if query.trim().is_empty() {
            return Ok(());
        }

        let plan = self.inner.mutate(|state| -> ExploreResult<Option<RequestPlan>> {
            if state.phase.is_loading() || state.awaiting_reply() {
                debug!("Ignoring send while a request is loading");
                return Ok(None);
            }

            let attachments = state.attachments.take_pending();
            let turn = Turn::user(query, attachments.clone());
            let handle = state.begin_request(turn.id.clone());
            let context = state.history.context_before(state.history.len());
            state.history.append(turn)?;
            Ok(Some(RequestPlan {
                handle,
                query: query.to_string(),
                context,
                attachments,
                replaces_after: None,
            }))
        })?;

        if let Some(plan) = plan {
            self.run_request(plan).await;
        }
        Ok(())
    }

    /// Rewrites a past user turn, drops everything after it and asks again.
    pub async fn edit_and_resend(&self, turn_id: &TurnId, new_content: &str) -> ExploreResult<()> {
        if new_content.trim().is_empty() {
            return Err(ExploreError::validation("Edited message must not be empty"));
        }

        let plan = self.inner.mutate(|state| -> ExploreResult<RequestPlan> {
            let turn = state
                .history
                .get(turn_id)
                .ok_or_else(|| ExploreError::NotFound(format!("Turn not found: {}", turn_id)))?;
            if !turn.is_user() {
                return Err(ExploreError::validation(format!(
                    "Only user turns can be edited: {}",
                    turn_id
                )));
            }

            let handle = state.begin_request(turn_id.clone());
            let mut edited = state.history.truncate_from(turn_id)?;
            edited.content = new_content.to_string();
            let attachments = edited.attachments().to_vec();
            let context = state.history.context_before(state.history.len());
            state.history.append(edited)?;
            info!(
                "Edited turn, history truncated: turn_id={}, history_len={}",
                turn_id,
                state.history.len()
            );
            Ok(RequestPlan {
                handle,
                query: new_content.to_string(),
                context,
                attachments,
                replaces_after: None,
            })
        })?;

        self.run_request(plan).await;
        Ok(())
    }

    /// Asks the last user turn again. The previous reply stays in history until
    /// the new one lands, so a failed or cancelled regeneration loses nothing.
    pub async fn regenerate_response(&self) -> ExploreResult<()> {
        let plan = self.inner.mutate(|state| -> Option<RequestPlan> {
            let Some(user_turn) = state
                .history
                .last_user_index()
                .map(|index| state.history.snapshot()[index].clone())
            else {
                debug!("Nothing to regenerate");
                return None;
            };

            let handle = state.begin_request(user_turn.id.clone());
            // Settling a half-revealed reply may have shifted indices.
            let user_index = state.history.index_of(&user_turn.id)?;
            let context = state.history.context_before(user_index);
            Some(RequestPlan {
                handle,
                query: user_turn.content.clone(),
                context,
                attachments: user_turn.attachments().to_vec(),
                replaces_after: Some(user_turn.id),
            })
        });

        if let Some(plan) = plan {
            self.run_request(plan).await;
        }
        Ok(())
    }

    /// Idempotent.
    pub fn cancel_request(&self) {
        self.inner.mutate(|state| {
            state.cancel_active();
            if state.phase != Phase::Error {
                state.set_phase(Phase::Idle);
            }
        });
    }

    /// Idempotent.
    pub fn clear_chat(&self) {
        self.inner.mutate(|state| {
            state.cancel_active();
            state.history.clear();
            state.attachments.clear();
            state.error = None;
            state.set_phase(Phase::Idle);
        });
        info!("Chat cleared");
    }

    /// Extracts `upload` and adds it to the next outgoing turn.
    ///
    /// Failures are recorded against the file only; the chat phase is untouched.
    pub async fn add_attachment(&self, upload: AttachmentUpload) -> ExploreResult<AttachmentRef> {
        let filename = upload.filename.clone();
        let pipeline = &self.inner.attachment_pipeline;

        if let Err(e) = pipeline.precheck(&upload) {
            if !filename.trim().is_empty() {
                self.inner
                    .mutate(|state| state.attachments.record_error(&filename, e.user_message()));
            }
            return Err(e);
        }

        self.inner.mutate(|state| state.attachments.begin(&filename));
        match pipeline.extract(upload).await {
            Ok(attachment) => {
                let landed = self
                    .inner
                    .mutate(|state| state.attachments.complete(attachment.clone()));
                if landed {
                    debug!(
                        "Attachment ready: filename={}, kind={}, chars={}",
                        attachment.filename,
                        attachment.kind.as_str(),
                        attachment.extracted_text.chars().count()
                    );
                    Ok(attachment)
                } else {
                    debug!("Attachment removed during extraction: filename={}", filename);
                    Err(ExploreError::Cancelled)
                }
            }
            Err(e) => {
                warn!("Attachment extraction failed: filename={}, error={}", filename, e);
                self.inner
                    .mutate(|state| state.attachments.fail(&filename, e.user_message()));
                Err(e)
            }
        }
    }

    /// Drops a pending attachment. Turns already sent keep their copy.
    pub fn remove_attachment(&self, filename: &str) -> bool {
        self.inner.mutate(|state| state.attachments.remove(filename))
    }

    async fn run_request(&self, plan: RequestPlan) {
        let RequestPlan {
            handle,
            query,
            context,
            attachments,
            replaces_after,
        } = plan;
        let inner = &self.inner;
        info!(
            "Chat request started: request_id={}, turn_id={}, history_len={}, attachments={}",
            handle.id(),
            handle.origin_turn_id(),
            context.len(),
            attachments.len()
        );

        // Missing credentials fail before anything goes on the wire.
        let bearer_token = match inner.credentials.bearer_token().await {
            Ok(token) => token,
            Err(e) => {
                self.fail_request(&handle, e);
                return;
            }
        };
        if handle.is_cancelled() {
            debug!("Chat request cancelled before dispatch: request_id={}", handle.id());
            return;
        }

        let request = ChatRequest {
            query,
            history: context,
            attachments: attachments.iter().map(AttachmentRef::to_wire).collect(),
            include_sources: inner.config.include_sources,
            model_preference: inner.config.model_preference,
        };

        let cancel = handle.token();
        let (animation, response) = tokio::join!(
            inner.animator.run(cancel, |phase| {
                inner.mutate_if_active(&handle, |state| state.set_phase(phase));
            }),
            inner.backend.send_chat(&request, &bearer_token, cancel),
        );

        if animation == AnimationOutcome::Cancelled || handle.is_cancelled() {
            debug!("Chat request ended by cancellation: request_id={}", handle.id());
            return;
        }

        let response = match response {
            Ok(response) => response,
            Err(e) if e.is_cancelled() => return,
            Err(e) => {
                self.fail_request(&handle, e);
                return;
            }
        };

        let sources = response.sources.into_iter().map(SourceRef::from).collect();
        let reply = Turn::assistant(response.answer, sources, response.timestamp);
        let reply_id = reply.id.clone();
        let revealer = StreamRevealer::new(reply_id.clone(), reply.content.clone(), inner.config.reveal_cadence());

        let appended = inner.mutate_if_active(&handle, |state| -> ExploreResult<()> {
            if let Some(user_turn_id) = &replaces_after {
                state.history.truncate_after(user_turn_id)?;
            }
            state.history.append(reply)?;
            state.set_phase(Phase::Complete);
            if let Some(active) = state.active.as_mut() {
                active.stage = RequestStage::Revealing;
            }
            Ok(())
        });
        match appended {
            Some(Ok(())) => {}
            Some(Err(e)) => {
                self.fail_request(&handle, e);
                return;
            }
            None => return,
        }

        let outcome = revealer
            .run(cancel, |visible, done| {
                inner.mutate_if_active(&handle, |state| {
                    let patch = TurnPatch::Visible {
                        visible_content: visible.to_string(),
                        is_revealing: !done,
                    };
                    if let Err(e) = state.history.replace_turn(&reply_id, patch) {
                        warn!("Failed to update reveal: turn_id={}, error={}", reply_id, e);
                    }
                    if done {
                        state.active = None;
                        state.set_phase(Phase::Idle);
                    }
                });
            })
            .await;

        match outcome {
            RevealOutcome::Finished => {
                info!("Chat request completed: request_id={}, turn_id={}", handle.id(), reply_id);
            }
            RevealOutcome::Cancelled { revealed_chars } => {
                debug!(
                    "Reveal stopped by cancellation: request_id={}, revealed_chars={}",
                    handle.id(),
                    revealed_chars
                );
            }
        }
    }

    /// Surfaces a failure as the error phase and arms the error auto-reset.
    fn fail_request(&self, handle: &RequestHandle, error: ExploreError) {
        if error.is_transport_class() {
            warn!("Chat request failed: request_id={}, error={}", handle.id(), error);
        } else {
            error!("Chat request failed on local state: request_id={}, error={}", handle.id(), error);
        }
        let message = error.user_message();
        let armed = self.inner.mutate_if_active(handle, |state| {
            state.active = None;
            state.error = Some(message);
            state.set_phase(Phase::Error);
            state.phase_epoch
        });

        let Some(epoch) = armed else {
            return;
        };
        let inner = self.inner.clone();
        let delay = inner.config.error_reset_delay();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.mutate(|state| {
                if state.phase == Phase::Error && state.phase_epoch == epoch {
                    state.set_phase(Phase::Idle);
                }
            });
        });
    }
}
