//! Assistant chat panel: request lifecycle, phase animation, reveal, attachments, history

pub mod attachments;
pub mod controller;
pub mod history;
pub mod phase;
pub mod request;
pub mod reveal;
pub mod types;

pub use attachments::{classify, AttachmentPipeline, AttachmentSet, AttachmentUpload, ExtractionRoute};
pub use controller::ChatController;
pub use history::{HistorySnapshot, HistoryStore, TurnPatch};
pub use phase::{AnimationOutcome, PhaseAnimator};
pub use request::RequestHandle;
pub use reveal::{RevealCadence, RevealOutcome, StreamRevealer};
pub use types::*;
