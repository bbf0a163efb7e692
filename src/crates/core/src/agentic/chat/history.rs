//! Ordered conversation turns
//!
//! Readers hold `Arc` snapshots; every mutation goes through `Arc::make_mut`, so a
//! snapshot handed out earlier never observes a later change.

use super::types::{Turn, TurnId, TurnKind};
use crate::util::errors::{ExploreError, ExploreResult};
use std::sync::Arc;

pub type HistorySnapshot = Arc<Vec<Turn>>;

/// In-place change applied by [`HistoryStore::replace_turn`].
#[derive(Debug, Clone, PartialEq)]
pub enum TurnPatch {
    /// Reveal progress of an assistant turn. Must be a prefix of its content.
    Visible {
        visible_content: String,
        is_revealing: bool,
    },
    /// Stop revealing and keep whatever is visible.
    Cancelled,
}

#[derive(Debug, Clone, Default)]
pub struct HistoryStore {
    turns: HistorySnapshot,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> HistorySnapshot {
        self.turns.clone()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn get(&self, turn_id: &TurnId) -> Option<&Turn> {
        self.turns.iter().find(|t| &t.id == turn_id)
    }

    pub fn index_of(&self, turn_id: &TurnId) -> Option<usize> {
        self.turns.iter().position(|t| &t.id == turn_id)
    }

    pub fn last_user_index(&self) -> Option<usize> {
        self.turns.iter().rposition(Turn::is_user)
    }

    pub fn append(&mut self, turn: Turn) -> ExploreResult<HistorySnapshot> {
        if self.index_of(&turn.id).is_some() {
            return Err(ExploreError::validation(format!(
                "Turn id already present in history: {}",
                turn.id
            )));
        }
        Arc::make_mut(&mut self.turns).push(turn);
        Ok(self.snapshot())
    }

    /// Keeps every turn up to and including `turn_id`.
    pub fn truncate_after(&mut self, turn_id: &TurnId) -> ExploreResult<HistorySnapshot> {
        let index = self.require_index(turn_id)?;
        if index + 1 < self.turns.len() {
            Arc::make_mut(&mut self.turns).truncate(index + 1);
        }
        Ok(self.snapshot())
    }

    /// Keeps every turn strictly before `turn_id` and returns the turn itself.
    pub fn truncate_from(&mut self, turn_id: &TurnId) -> ExploreResult<Turn> {
        let index = self.require_index(turn_id)?;
        let turns = Arc::make_mut(&mut self.turns);
        let mut removed = turns.split_off(index);
        Ok(removed.swap_remove(0))
    }

    pub fn replace_turn(&mut self, turn_id: &TurnId, patch: TurnPatch) -> ExploreResult<HistorySnapshot> {
        let index = self.require_index(turn_id)?;
        let turn = &mut Arc::make_mut(&mut self.turns)[index];
        let TurnKind::Assistant(reply) = &mut turn.kind else {
            return Err(ExploreError::validation(format!(
                "Only assistant turns can be patched: {}",
                turn_id
            )));
        };

        match patch {
            TurnPatch::Visible {
                visible_content,
                is_revealing,
            } => {
                if !turn.content.starts_with(&visible_content) {
                    return Err(ExploreError::validation(format!(
                        "Visible content is not a prefix of turn content: {}",
                        turn_id
                    )));
                }
                reply.visible_content = visible_content;
                reply.is_revealing = is_revealing && reply.visible_content.len() < turn.content.len();
            }
            TurnPatch::Cancelled => {
                reply.is_revealing = false;
                reply.is_cancelled = true;
            }
        }
        Ok(self.snapshot())
    }

    pub fn remove(&mut self, turn_id: &TurnId) -> ExploreResult<Turn> {
        let index = self.require_index(turn_id)?;
        Ok(Arc::make_mut(&mut self.turns).remove(index))
    }

    pub fn clear(&mut self) {
        if !self.turns.is_empty() {
            self.turns = Arc::new(Vec::new());
        }
    }

    /// Turns before `index`, serialized as request context.
    pub fn context_before(&self, index: usize) -> Vec<explore_core_types::ChatMessage> {
        self.turns
            .iter()
            .take(index)
            .map(Turn::to_chat_message)
            .collect()
    }

    fn require_index(&self, turn_id: &TurnId) -> ExploreResult<usize> {
        self.index_of(turn_id)
            .ok_or_else(|| ExploreError::NotFound(format!("Turn not found: {}", turn_id)))
    }
}
