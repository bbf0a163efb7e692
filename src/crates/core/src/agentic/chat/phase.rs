use super::types::Phase;
use log::trace;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_PHASE_DURATION: Duration = Duration::from_millis(800);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimationOutcome {
    Completed,
    Cancelled,
}

/// Steps through the in-flight phases while the real request runs.
#[derive(Debug, Clone)]
pub struct PhaseAnimator {
    phases: Vec<Phase>,
    phase_duration: Duration,
}

impl PhaseAnimator {
    pub fn new(phase_duration: Duration) -> Self {
        Self {
            phases: Phase::ANIMATED.to_vec(),
            phase_duration,
        }
    }

    /// Applies each phase in order, holding it for the configured duration.
    ///
    /// The token is checked before every transition and raced against every
    /// wait; once it fires no further phase is applied.
    pub async fn run<F>(&self, cancel: &CancellationToken, mut apply: F) -> AnimationOutcome
    where
        F: FnMut(Phase),
    {
        for phase in &self.phases {
            if cancel.is_cancelled() {
                return AnimationOutcome::Cancelled;
            }
            trace!("Phase transition: phase={}", phase);
            apply(*phase);

            tokio::select! {
                _ = cancel.cancelled() => return AnimationOutcome::Cancelled,
                _ = tokio::time::sleep(self.phase_duration) => {}
            }
        }

        if cancel.is_cancelled() {
            AnimationOutcome::Cancelled
        } else {
            AnimationOutcome::Completed
        }
    }
}

impl Default for PhaseAnimator {
    fn default() -> Self {
        Self::new(DEFAULT_PHASE_DURATION)
    }
}
