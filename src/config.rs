//! Configuration Management
//!
//! Crate settings live in a hand-edited JSON file that may carry `//` and
//! `/* */` comments. Only this file gets the comment-tolerant parser; API
//! payloads and `cf`'s own configuration are parsed strictly.

use crate::error::{Error, Result};
use crate::resource::poller::{PollSettings, DEFAULT_MAX_ATTEMPTS, DEFAULT_POLL_INTERVAL};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// User settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Attempts made while waiting for a new service instance
    #[serde(default = "default_max_attempts")]
    pub poll_max_attempts: u32,
    /// Delay between two attempts, in milliseconds
    #[serde(default = "default_interval_ms")]
    pub poll_interval_ms: u64,
    /// Saved `cf` target to read the ambient configuration from
    #[serde(default)]
    pub cf_target: Option<String>,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL.as_millis() as u64
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            poll_max_attempts: default_max_attempts(),
            poll_interval_ms: default_interval_ms(),
            cf_target: None,
        }
    }
}

impl Settings {
    /// Get the settings file path
    pub fn settings_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("cf-tools").join("settings.json"))
    }

    /// Load settings from the default location, falling back to defaults
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else {
            return Self::default();
        };

        match Self::load_from(&path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("Ignoring settings: {}", e);
                Self::default()
            },
        }
    }

    /// Load settings from `path`; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        let value = parse_commented_json(&content)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;

        serde_json::from_value(value)
            .map_err(|e| Error::Config(format!("Invalid settings in {}: {}", path.display(), e)))
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            max_attempts: self.poll_max_attempts,
            interval: Duration::from_millis(self.poll_interval_ms),
        }
    }
}

/// Parse JSON that may contain `//` line comments and `/* */` block comments
pub fn parse_commented_json(text: &str) -> std::result::Result<serde_json::Value, serde_json::Error> {
    serde_json::from_str(&strip_comments(text))
}

/// Blank out comments outside string literals, keeping line numbers intact
fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            match c {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                },
                '"' => in_string = false,
                _ => {},
            }
            continue;
        }

        match (c, chars.peek()) {
            ('"', _) => {
                in_string = true;
                out.push(c);
            },
            ('/', Some('/')) => {
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            },
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        out.push('\n');
                    }
                    if prev == '*' && skipped == '/' {
                        break;
                    }
                    prev = skipped;
                }
                out.push(' ');
            },
            _ => out.push(c),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commented_json() {
        let text = r#"{
            // attempts before giving up
            "poll_max_attempts": 10, /* two seconds */ "poll_interval_ms": 2000,
            "cf_target": "https://example.com/*not-a-comment*/"
        }"#;
        let value = parse_commented_json(text).unwrap();
        assert_eq!(value["poll_max_attempts"], 10);
        assert_eq!(value["poll_interval_ms"], 2000);
        assert_eq!(value["cf_target"], "https://example.com/*not-a-comment*/");
    }

    #[test]
    fn test_escaped_quotes_stay_in_strings() {
        let value = parse_commented_json(r#"{"a": "say \"//hi\""} // tail"#).unwrap();
        assert_eq!(value["a"], "say \"//hi\"");
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_from(&dir.path().join("settings.json")).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.poll_settings(), PollSettings::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{\n  // faster polling\n  \"poll_interval_ms\": 500\n}").unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.poll_interval_ms, 500);
        assert_eq!(settings.poll_max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert_eq!(
            settings.poll_settings().interval,
            Duration::from_millis(500)
        );
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ \"poll_max_attempts\": \"many\" }").unwrap();

        assert!(matches!(Settings::load_from(&path), Err(Error::Config(_))));
    }
}
