// Explore Core Library - assistant chat orchestration
// Layering: Util -> Infrastructure -> Service -> Agentic

pub mod agentic; // Chat controller, phases, reveal, attachments, history
pub mod infrastructure; // Assistant service client, credentials
pub mod service; // Configuration
pub mod util; // Errors

pub use util::errors::*;

pub use service::config::{ApiConfig, ChatConfig, ExploreConfig};

pub use infrastructure::{AssistantBackend, CredentialProvider, HttpAssistantBackend, StaticCredentialProvider};

pub use agentic::chat::{
    AttachmentRef, AttachmentUpload, ChatController, ChatSnapshot, Phase, Turn, TurnId, TurnKind,
};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const CORE_NAME: &str = "Explore Core";
