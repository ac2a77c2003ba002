//! Session and settings persistence
//!
//! Two independent records live in the injected [`KeyValueStore`]: the
//! serialized session list and the serialized settings object. Reads never
//! fail; corrupt or missing data falls back to an empty list or to default
//! settings. Writes serialize the whole value every time.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::session::{Session, Settings};
use crate::storage::KeyValueStore;
use crate::Result;

/// Storage key of the session list
pub const SESSIONS_KEY: &str = "chat_sessions_v1";

/// Storage key of the settings object
pub const SETTINGS_KEY: &str = "chat_settings_v1";

/// Reads and writes sessions and settings through a key-value store
#[derive(Clone)]
pub struct Persistence {
    store: Arc<dyn KeyValueStore>,
}

impl Persistence {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Load the session list.
    ///
    /// Missing text, a parse failure or a non-array value all yield an empty
    /// list. Array elements that are not valid sessions are dropped.
    pub fn load(&self) -> Vec<Session> {
        let Some(raw) = self.read(SESSIONS_KEY) else {
            return Vec::new();
        };

        let items = match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Array(items)) => items,
            Ok(_) => {
                warn!("Stored session list is not an array, starting empty");
                return Vec::new();
            }
            Err(e) => {
                warn!("Failed to parse stored session list: {}", e);
                return Vec::new();
            }
        };

        let total = items.len();
        let sessions: Vec<Session> = items
            .into_iter()
            .enumerate()
            .filter_map(|(index, item)| match serde_json::from_value::<Session>(item) {
                Ok(session) => Some(session),
                Err(e) => {
                    warn!("Skipping malformed stored session #{}: {}", index, e);
                    None
                }
            })
            .collect();

        debug!("Loaded {} of {} stored sessions", sessions.len(), total);
        sessions
    }

    /// Persist the full session list
    pub fn save(&self, sessions: &[Session]) -> Result<()> {
        let content = serde_json::to_string(sessions)?;
        self.store.set(SESSIONS_KEY, &content)
    }

    /// Load settings, defaulting each field that is missing or malformed
    pub fn load_settings(&self) -> Settings {
        let Some(raw) = self.read(SETTINGS_KEY) else {
            return Settings::default();
        };

        match serde_json::from_str::<Value>(&raw) {
            Ok(value) => Settings::from_value_lenient(&value),
            Err(e) => {
                warn!("Failed to parse stored settings: {}", e);
                Settings::default()
            }
        }
    }

    /// Persist settings
    pub fn save_settings(&self, settings: &Settings) -> Result<()> {
        let content = serde_json::to_string(settings)?;
        self.store.set(SETTINGS_KEY, &content)
    }

    fn read(&self, key: &str) -> Option<String> {
        self.store.get(key).filter(|raw| !raw.is_empty())
    }
}

impl std::fmt::Debug for Persistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persistence").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Message;
    use crate::storage::{FileStore, MemoryStore};
    use tempfile::TempDir;

    fn persistence_with(entries: &[(&str, &str)]) -> Persistence {
        Persistence::new(Arc::new(MemoryStore::with_entries(
            entries.iter().map(|(k, v)| (*k, *v)),
        )))
    }

    fn sample_sessions() -> Vec<Session> {
        let mut first = Session::new();
        first.append(Message::user("Hello"));
        first.append(Message::assistant("Hi there"));
        first.append(Message::system("Request failed: HTTP 500"));
        let empty = Session::new();
        vec![first, empty]
    }

    #[test]
    fn test_load_empty_store() {
        let persistence = persistence_with(&[]);
        assert!(persistence.load().is_empty());
    }

    #[test]
    fn test_load_tolerates_garbage() {
        for raw in ["", "{not json", "null", "42", r#"{"id":"x"}"#, r#""text""#] {
            let persistence = persistence_with(&[(SESSIONS_KEY, raw)]);
            assert!(persistence.load().is_empty(), "raw = {raw}");
        }
    }

    #[test]
    fn test_load_skips_malformed_elements() {
        let good = serde_json::to_string(&Session::new()).unwrap();
        let raw = format!(r#"[{good}, {{"id": 5}}, "junk"]"#);
        let persistence = persistence_with(&[(SESSIONS_KEY, &raw)]);
        assert_eq!(persistence.load().len(), 1);
    }

    #[test]
    fn test_save_load_round_trip() {
        let persistence = persistence_with(&[]);
        let sessions = sample_sessions();
        persistence.save(&sessions).unwrap();
        assert_eq!(persistence.load(), sessions);
    }

    #[test]
    fn test_round_trip_empty_list() {
        let persistence = persistence_with(&[]);
        persistence.save(&[]).unwrap();
        assert_eq!(persistence.load(), Vec::<Session>::new());
    }

    #[test]
    fn test_round_trip_through_file_store() {
        let temp_dir = TempDir::new().unwrap();
        let sessions = sample_sessions();
        Persistence::new(Arc::new(FileStore::new(temp_dir.path())))
            .save(&sessions)
            .unwrap();

        let reopened = Persistence::new(Arc::new(FileStore::new(temp_dir.path())));
        assert_eq!(reopened.load(), sessions);
    }

    #[test]
    fn test_loads_records_written_by_other_clients() {
        let raw = r#"[{"id":"a1","title":"Test","messages":[
            {"id":"m1","role":"user","content":"Test","createdAt":1700000000000},
            {"id":"m2","role":"assistant","content":"Hi there","createdAt":1700000000500}
        ],"createdAt":1700000000000,"updatedAt":1700000000500}]"#;
        let persistence = persistence_with(&[(SESSIONS_KEY, raw)]);

        let sessions = persistence.load();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].title, "Test");
        assert_eq!(sessions[0].messages[1].content, "Hi there");
        assert_eq!(sessions[0].updated_at.timestamp_millis(), 1_700_000_000_500);
    }

    #[test]
    fn test_load_settings_defaults() {
        for raw in ["", "{broken", "null", "[]", "true"] {
            let persistence = persistence_with(&[(SETTINGS_KEY, raw)]);
            assert_eq!(persistence.load_settings(), Settings::default(), "raw = {raw}");
        }
    }

    #[test]
    fn test_load_settings_partial() {
        let persistence = persistence_with(&[(SETTINGS_KEY, r#"{"theme":"ocean","jailbreak":1}"#)]);
        let settings = persistence.load_settings();
        assert_eq!(settings.theme, "ocean");
        assert_eq!(settings.model, "default");
        assert!(settings.jailbreak);
        assert!(!settings.web_access);
    }

    #[test]
    fn test_settings_round_trip() {
        let persistence = persistence_with(&[]);
        let settings = Settings {
            model: "gpt-4".to_string(),
            jailbreak: true,
            web_access: true,
            theme: "dark".to_string(),
        };
        persistence.save_settings(&settings).unwrap();
        assert_eq!(persistence.load_settings(), settings);
    }

    #[test]
    fn test_records_use_disjoint_keys() {
        let store = Arc::new(MemoryStore::new());
        let persistence = Persistence::new(store.clone());
        persistence.save(&sample_sessions()).unwrap();
        persistence.save_settings(&Settings::default()).unwrap();

        assert!(store.get(SESSIONS_KEY).unwrap().starts_with('['));
        assert!(store.get(SETTINGS_KEY).unwrap().starts_with('{'));
    }
}
