//! Conversation data model
//!
//! Sessions own an append-only, chronologically ordered list of messages.
//! Settings are a process-wide singleton persisted independently of sessions.

pub mod settings;
pub mod types;

pub use settings::{Settings, KNOWN_MODELS, KNOWN_THEMES};
pub use types::{Message, Role, Session, DEFAULT_TITLE, TITLE_MAX_CHARS};
