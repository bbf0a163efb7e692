use super::types::TurnId;
use log::trace;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_REVEAL_CHUNK_CHARS: usize = 3;
pub const DEFAULT_REVEAL_TICK: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevealCadence {
    pub chunk_chars: usize,
    pub tick: Duration,
}

impl Default for RevealCadence {
    fn default() -> Self {
        Self {
            chunk_chars: DEFAULT_REVEAL_CHUNK_CHARS,
            tick: DEFAULT_REVEAL_TICK,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealOutcome {
    Finished,
    Cancelled { revealed_chars: usize },
}

/// Reveals one assistant turn's final text at a fixed cadence.
///
/// Built per turn and consumed by [`StreamRevealer::run`].
#[derive(Debug)]
pub struct StreamRevealer {
    turn_id: TurnId,
    content: String,
    /// Byte offsets of every char boundary after the first, ending at `content.len()`.
    boundaries: Vec<usize>,
    cadence: RevealCadence,
}

impl StreamRevealer {
    pub fn new(turn_id: TurnId, content: impl Into<String>, cadence: RevealCadence) -> Self {
        let content = content.into();
        let boundaries = content
            .char_indices()
            .skip(1)
            .map(|(idx, _)| idx)
            .chain((!content.is_empty()).then_some(content.len()))
            .collect();
        Self {
            turn_id,
            content,
            boundaries,
            cadence: RevealCadence {
                chunk_chars: cadence.chunk_chars.max(1),
                tick: cadence.tick,
            },
        }
    }

    /// Calls `apply(visible_prefix, done)` once per chunk until the whole
    /// content is visible. Already revealed text is never rolled back.
    pub async fn run<F>(self, cancel: &CancellationToken, mut apply: F) -> RevealOutcome
    where
        F: FnMut(&str, bool),
    {
        let total_chars = self.boundaries.len();
        let mut revealed_chars = 0usize;

        while revealed_chars < total_chars {
            if cancel.is_cancelled() {
                return RevealOutcome::Cancelled { revealed_chars };
            }

            revealed_chars = (revealed_chars + self.cadence.chunk_chars).min(total_chars);
            let end = self.boundaries[revealed_chars - 1];
            let done = revealed_chars == total_chars;
            apply(&self.content[..end], done);

            if done {
                break;
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    trace!(
                        "Reveal cancelled: turn_id={}, revealed_chars={}",
                        self.turn_id, revealed_chars
                    );
                    return RevealOutcome::Cancelled { revealed_chars };
                }
                _ = tokio::time::sleep(self.cadence.tick) => {}
            }
        }

        if total_chars == 0 {
            apply("", true);
        }
        RevealOutcome::Finished
    }
}
