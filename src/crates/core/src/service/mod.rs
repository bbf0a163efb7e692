//! Service layer - Config

pub mod config;

pub use config::{ApiConfig, ChatConfig, ExploreConfig};
