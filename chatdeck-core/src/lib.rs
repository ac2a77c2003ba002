//! Core types and traits for chatdeck
//!
//! This crate provides the conversation data model, the key-value storage
//! capability, the persistence adapter built on top of it, and the ambient
//! configuration/logging pieces shared by the other chatdeck crates.

pub mod config;
pub mod error;
pub mod logging;
pub mod persistence;
pub mod session;
pub mod storage;
pub mod utils;

pub use error::{Error, Result};
pub use persistence::Persistence;
pub use session::{Message, Role, Session, Settings};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
