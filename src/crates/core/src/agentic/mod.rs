//! Agentic layer - conversational request orchestration

pub mod chat;
