use super::types::TurnId;
use tokio_util::sync::CancellationToken;

/// Bookkeeping for one in-flight request.
///
/// Clones share the token; the controller keeps exactly one active handle.
#[derive(Debug, Clone)]
pub struct RequestHandle {
    id: u64,
    origin_turn_id: TurnId,
    cancel: CancellationToken,
}

impl RequestHandle {
    pub(crate) fn new(id: u64, origin_turn_id: TurnId) -> Self {
        Self {
            id,
            origin_turn_id,
            cancel: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn origin_turn_id(&self) -> &TurnId {
        &self.origin_turn_id
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

/// Whether the active request is still waiting for its reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RequestStage {
    Pending,
    Revealing,
}

#[derive(Debug, Clone)]
pub(crate) struct ActiveRequest {
    pub handle: RequestHandle,
    pub stage: RequestStage,
}
