//! Utility functions and helpers

use chrono::{DateTime, Timelike, Utc};
use std::path::PathBuf;

/// Generate an opaque unique id
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Current time truncated to millisecond precision, the resolution timestamps
/// are stored at.
pub fn now_ms() -> DateTime<Utc> {
    let now = Utc::now();
    let millis = (now.nanosecond() / 1_000_000) * 1_000_000;
    now.with_nanosecond(millis).unwrap_or(now)
}

/// Keep at most `max_chars` characters of `s`
pub fn take_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// Create a safe filename from a string
pub fn safe_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
            _ => '_',
        })
        .collect()
}

/// Truncate a string to a maximum byte length, ensuring valid UTF-8 boundaries
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        let mut end = max_len.saturating_sub(3);
        while !s.is_char_boundary(end) {
            end = end.saturating_sub(1);
        }
        format!("{}...", &s[..end])
    }
}

/// Expand a leading `~` to the home directory
pub fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    }
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_filename() {
        assert_eq!(safe_filename("hello world"), "hello_world");
        assert_eq!(safe_filename("test/file:name"), "test_file_name");
        assert_eq!(safe_filename("chat_sessions_v1"), "chat_sessions_v1");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello world", 8), "hello...");
        assert_eq!(truncate("test", 3), "...");
    }

    #[test]
    fn test_take_chars() {
        assert_eq!(take_chars("abc", 20), "abc");
        assert_eq!(take_chars("abcdef", 3), "abc");
        assert_eq!(take_chars("日本語テキスト", 3), "日本語");
    }

    #[test]
    fn test_now_ms_has_no_sub_millisecond_part() {
        assert_eq!(now_ms().nanosecond() % 1_000_000, 0);
    }

    #[test]
    fn test_expand_home_leaves_plain_paths() {
        assert_eq!(expand_home("/tmp/store"), PathBuf::from("/tmp/store"));
        assert_eq!(expand_home("relative/dir"), PathBuf::from("relative/dir"));
    }
}
