//! Completion endpoint integrations for chatdeck
//!
//! This crate provides the [`ChatBackend`] abstraction the conversation
//! controller talks to, and the HTTP implementation of it.

pub mod base;
pub mod http;

pub use base::{ChatBackend, ChatReply, ChatRequest, ProviderError, ProviderResult};
pub use http::HttpChatClient;
