//! Session list, current pointer and request lifecycle

use chatdeck_core::{Message, Persistence, Result, Session, Settings};
use chatdeck_providers::{ChatBackend, ChatRequest};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Why a `send` call did not start a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The prompt was empty after trimming
    EmptyPrompt,
    /// Another request from this controller is still in flight
    Busy,
}

/// Result of a `send` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Nothing was appended and no request was issued
    Ignored(IgnoreReason),
    /// The endpoint answered; `message` is the appended assistant message
    Replied { session_id: String, message: Message },
    /// The request failed or was cancelled; `message` is the appended
    /// system message describing the failure
    Failed { session_id: String, message: Message },
}

impl SendOutcome {
    /// The message appended when the request settled, if any
    pub fn message(&self) -> Option<&Message> {
        match self {
            SendOutcome::Ignored(_) => None,
            SendOutcome::Replied { message, .. } | SendOutcome::Failed { message, .. } => {
                Some(message)
            }
        }
    }

    /// The session the request was bound to, if one was issued
    pub fn session_id(&self) -> Option<&str> {
        match self {
            SendOutcome::Ignored(_) => None,
            SendOutcome::Replied { session_id, .. } | SendOutcome::Failed { session_id, .. } => {
                Some(session_id)
            }
        }
    }
}

#[derive(Debug, Default)]
struct ControllerState {
    /// Newest first
    sessions: Vec<Session>,
    current_id: Option<String>,
    settings: Settings,
    /// Present exactly while a request is in flight
    pending: Option<CancellationToken>,
}

impl ControllerState {
    fn session_mut(&mut self, id: &str) -> Option<&mut Session> {
        self.sessions.iter_mut().find(|s| s.id == id)
    }

    fn current(&self) -> Option<&Session> {
        let id = self.current_id.as_deref()?;
        self.sessions.iter().find(|s| s.id == id)
    }

    fn insert_new_session(&mut self) -> String {
        let session = Session::new();
        let id = session.id.clone();
        self.sessions.insert(0, session);
        self.current_id = Some(id.clone());
        id
    }
}

/// Conversation controller
///
/// All methods take `&self`; share the controller behind an [`Arc`] to keep
/// navigating or cancelling while a `send` is awaiting its reply. At most one
/// request is in flight per controller.
pub struct ConversationController {
    state: Mutex<ControllerState>,
    persistence: Persistence,
    backend: Arc<dyn ChatBackend>,
}

impl ConversationController {
    /// Restore sessions and settings from storage. The first stored session
    /// becomes current.
    pub fn new(persistence: Persistence, backend: Arc<dyn ChatBackend>) -> Self {
        let sessions = persistence.load();
        let settings = persistence.load_settings();
        let current_id = sessions.first().map(|s| s.id.clone());
        info!(
            "Restored {} sessions (model: {}, theme: {})",
            sessions.len(),
            settings.model,
            settings.theme
        );

        Self {
            state: Mutex::new(ControllerState {
                sessions,
                current_id,
                settings,
                pending: None,
            }),
            persistence,
            backend,
        }
    }

    /// Snapshot of all sessions, newest first
    pub fn sessions(&self) -> Vec<Session> {
        self.state.lock().sessions.clone()
    }

    /// Look up a session by id
    pub fn session(&self, id: &str) -> Option<Session> {
        self.state.lock().sessions.iter().find(|s| s.id == id).cloned()
    }

    pub fn current_id(&self) -> Option<String> {
        self.state.lock().current_id.clone()
    }

    /// The current session; `None` when no session is selected or the
    /// selected id no longer exists
    pub fn current_session(&self) -> Option<Session> {
        self.state.lock().current().cloned()
    }

    pub fn settings(&self) -> Settings {
        self.state.lock().settings.clone()
    }

    /// Whether a request is in flight
    pub fn is_sending(&self) -> bool {
        self.state.lock().pending.is_some()
    }

    /// Create an empty session at the top of the list and make it current.
    /// Returns the new session's id.
    pub fn create_session(&self) -> Result<String> {
        let mut state = self.state.lock();
        let id = state.insert_new_session();
        debug!("Created session {}", id);
        self.persistence.save(&state.sessions)?;
        Ok(id)
    }

    /// Point the current session at `id`. No existence check is made; an
    /// unknown id resolves to "no current session".
    pub fn select_session(&self, id: impl Into<String>) {
        let id = id.into();
        debug!("Selected session {}", id);
        self.state.lock().current_id = Some(id);
    }

    /// Remove the session with `id`. When it was current, the first remaining
    /// session becomes current, or none if the list is now empty. Returns
    /// whether a session was removed.
    pub fn delete_session(&self, id: &str) -> Result<bool> {
        let mut state = self.state.lock();
        let before = state.sessions.len();
        state.sessions.retain(|s| s.id != id);
        let removed = state.sessions.len() != before;

        if state.current_id.as_deref() == Some(id) {
            state.current_id = state.sessions.first().map(|s| s.id.clone());
        }

        if removed {
            debug!("Deleted session {}", id);
        }
        self.persistence.save(&state.sessions)?;
        Ok(removed)
    }

    /// Drop every session
    pub fn clear_all(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.sessions.clear();
        state.current_id = None;
        debug!("Cleared all sessions");
        self.persistence.save(&state.sessions)
    }

    /// Change settings through `update` and persist the result
    pub fn update_settings<F>(&self, update: F) -> Result<Settings>
    where
        F: FnOnce(&mut Settings),
    {
        let mut state = self.state.lock();
        update(&mut state.settings);
        self.persistence.save_settings(&state.settings)?;
        Ok(state.settings.clone())
    }

    /// Send a prompt and wait for it to settle.
    ///
    /// The trimmed prompt is appended to the current session (created on
    /// demand) as a user message, then forwarded to the backend. The reply,
    /// or a system message describing the failure, is appended to that same
    /// session even if another session was selected meanwhile.
    ///
    /// Empty prompts and calls made while a request is in flight are
    /// ignored. Backend failures never surface as `Err`; only a storage
    /// write failure does.
    pub async fn send(&self, text: &str) -> Result<SendOutcome> {
        let prompt = text.trim();
        if prompt.is_empty() {
            debug!("Ignoring empty prompt");
            return Ok(SendOutcome::Ignored(IgnoreReason::EmptyPrompt));
        }

        let (session_id, request, cancel) = {
            let mut state = self.state.lock();
            if state.pending.is_some() {
                debug!("Ignoring prompt while a request is in flight");
                return Ok(SendOutcome::Ignored(IgnoreReason::Busy));
            }

            let session_id = match state.current() {
                Some(session) => session.id.clone(),
                None => state.insert_new_session(),
            };
            if let Some(session) = state.session_mut(&session_id) {
                session.append(Message::user(prompt));
            }

            let cancel = CancellationToken::new();
            state.pending = Some(cancel.clone());
            if let Err(e) = self.persistence.save(&state.sessions) {
                state.pending = None;
                return Err(e);
            }

            let request = ChatRequest::with_settings(prompt, &state.settings);
            (session_id, request, cancel)
        };

        let slot = PendingSlot {
            state: &self.state,
            token: cancel.clone(),
            armed: true,
        };

        info!("Sending prompt for session {}", session_id);
        let result = self.backend.complete(request, cancel).await;

        let outcome = match result {
            Ok(reply) => {
                info!("Received reply for session {}", session_id);
                SendOutcome::Replied {
                    session_id: session_id.clone(),
                    message: Message::assistant(reply.into_content()),
                }
            }
            Err(e) => {
                if e.is_aborted() {
                    info!("Request for session {} aborted: {}", session_id, e);
                } else {
                    warn!("Request for session {} failed: {}", session_id, e);
                }
                SendOutcome::Failed {
                    session_id: session_id.clone(),
                    message: Message::system(format!("Request failed: {}", e)),
                }
            }
        };

        slot.disarm();
        let mut state = self.state.lock();
        state.pending = None;
        match (state.session_mut(&session_id), outcome.message()) {
            (Some(session), Some(message)) => session.append(message.clone()),
            _ => warn!(
                "Session {} was removed while its request was in flight",
                session_id
            ),
        }
        self.persistence.save(&state.sessions)?;

        Ok(outcome)
    }

    /// Abort the in-flight request, if any. The pending `send` then settles
    /// through its failure path. Returns whether there was a request to
    /// cancel.
    pub fn cancel(&self) -> bool {
        match self.state.lock().pending.as_ref() {
            Some(token) => {
                info!("Cancelling in-flight request");
                token.cancel();
                true
            }
            None => false,
        }
    }
}

/// Releases the in-flight slot if a `send` future is dropped before the
/// backend settles
struct PendingSlot<'a> {
    state: &'a Mutex<ControllerState>,
    token: CancellationToken,
    armed: bool,
}

impl PendingSlot<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.token.cancel();
        self.state.lock().pending = None;
        warn!("Send abandoned before the request settled; releasing the slot");
    }
}

impl std::fmt::Debug for ConversationController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ConversationController")
            .field("sessions", &state.sessions.len())
            .field("current_id", &state.current_id)
            .field("sending", &state.pending.is_some())
            .finish_non_exhaustive()
    }
}
