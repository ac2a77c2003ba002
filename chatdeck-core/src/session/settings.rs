//! User settings

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Models offered by the client out of the box
pub const KNOWN_MODELS: &[&str] = &["default", "gpt-4", "gpt-4o-mini", "llama3.1"];

/// Themes offered by the client out of the box
pub const KNOWN_THEMES: &[&str] = &["light", "dark", "ocean"];

const DEFAULT_MODEL: &str = "default";
const DEFAULT_THEME: &str = "light";

/// Process-wide user settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Model identifier forwarded with each prompt
    pub model: String,
    pub jailbreak: bool,
    /// Ask the backend to consult the web
    pub web_access: bool,
    /// Presentation theme identifier
    pub theme: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            jailbreak: false,
            web_access: false,
            theme: DEFAULT_THEME.to_string(),
        }
    }
}

impl Settings {
    /// Build settings from a loosely-typed stored value.
    ///
    /// Anything other than an object yields the defaults. Inside an object
    /// each field falls back on its own: `model` and `theme` keep non-empty
    /// strings, the flags use JavaScript truthiness.
    pub fn from_value_lenient(value: &Value) -> Self {
        let Some(map) = value.as_object() else {
            return Self::default();
        };

        let text_or = |key: &str, fallback: &str| {
            map.get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .unwrap_or(fallback)
                .to_string()
        };
        let flag = |key: &str| map.get(key).map(is_truthy).unwrap_or(false);

        Self {
            model: text_or("model", DEFAULT_MODEL),
            jailbreak: flag("jailbreak"),
            web_access: flag("webAccess"),
            theme: text_or("theme", DEFAULT_THEME),
        }
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
