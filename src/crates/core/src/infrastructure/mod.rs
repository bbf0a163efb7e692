//! Infrastructure layer - assistant service client, credentials

pub mod api;
pub mod auth;

pub use api::{AssistantBackend, HttpAssistantBackend};
pub use auth::{CredentialProvider, StaticCredentialProvider};
