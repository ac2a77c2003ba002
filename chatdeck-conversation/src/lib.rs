//! Conversation controller for chatdeck
//!
//! Owns the in-memory session list, the current-session pointer, the user
//! settings and the single in-flight completion request.

pub mod controller;

pub use controller::{ConversationController, IgnoreReason, SendOutcome};
