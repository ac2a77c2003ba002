//! Session data structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::utils::{new_id, now_ms, take_chars};

/// Title given to a session before its first user message
pub const DEFAULT_TITLE: &str = "New Chat";

/// Number of characters of the first user message kept as the title
pub const TITLE_MAX_CHARS: usize = 20;

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    /// Client-generated notices, e.g. a failed request
    System,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        };
        f.write_str(name)
    }
}

/// A chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique message id
    pub id: String,
    /// Message role (user, assistant, system)
    pub role: Role,
    /// Message content
    pub content: String,
    /// Creation time, stored as epoch milliseconds
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Create a new message stamped with the current time
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            role,
            content: content.into(),
            created_at: now_ms(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}

/// A conversation session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Unique session id
    pub id: String,
    /// Display title, derived from the first user message
    pub title: String,
    /// Messages in insertion order
    pub messages: Vec<Message>,
    /// Session creation time
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    /// Last update time
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Create an empty session titled "New Chat"
    pub fn new() -> Self {
        let now = now_ms();
        Self {
            id: new_id(),
            title: DEFAULT_TITLE.to_string(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a message and bump `updated_at`.
    ///
    /// A user message that opens the session also becomes its title, cut to
    /// [`TITLE_MAX_CHARS`] characters.
    pub fn append(&mut self, message: Message) {
        if self.messages.is_empty() && message.role == Role::User {
            self.title = take_chars(&message.content, TITLE_MAX_CHARS);
        }
        self.updated_at = now_ms().max(message.created_at);
        self.messages.push(message);
    }

    /// The most recent message, if any
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
