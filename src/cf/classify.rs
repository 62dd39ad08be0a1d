//! Exit classification
//!
//! `cf` prints JSON payloads and human-readable failure banners on the same
//! stdout stream and often exits 0 either way. These checks run from the most
//! specific to the least specific; a payload that only looks like an error
//! falls through untouched.

use super::cli::{ProcessResult, ERROR_EXIT_CODE};
use crate::error::LOGIN_MESSAGE;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

/// Token `cf` prints at the start of a failure banner
const FAILED_MARKER: &str = "FAILED";

/// Substring present in v2-style API error payloads
const ERROR_CODE_MARKER: &str = "\"error_code\"";

/// API error code for a missing or expired session
const NOT_AUTHENTICATED_CODE: i64 = 10002;

const GENERIC_ERROR: &str = "internal error";

fn failed_error_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?s)(?i:failed).*Error:").unwrap_or_else(|e| panic!("invalid pattern: {}", e))
    })
}

/// Decide whether a finished `cf` process actually failed
pub fn classify_exit(stdout: String, stderr: String, exit_code: i32) -> ProcessResult {
    if stdout.is_empty() {
        return ProcessResult::new(stdout, stderr, None, exit_code);
    }

    if stdout.contains(ERROR_CODE_MARKER) {
        if let Ok(payload) = serde_json::from_str::<Value>(&stdout) {
            let message = if payload.get("code").and_then(Value::as_i64)
                == Some(NOT_AUTHENTICATED_CODE)
            {
                LOGIN_MESSAGE.to_string()
            } else {
                payload
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or(GENERIC_ERROR)
                    .to_string()
            };
            return ProcessResult::new(stdout, stderr, Some(message), ERROR_EXIT_CODE);
        }
    }

    if stdout.starts_with(FAILED_MARKER) && stdout.contains("Error creating request") {
        return ProcessResult::new(
            stdout,
            stderr,
            Some(LOGIN_MESSAGE.to_string()),
            ERROR_EXIT_CODE,
        );
    }

    if failed_error_pattern().is_match(&stdout) {
        // Well-formed JSON that merely contains the phrase is a success
        if serde_json::from_str::<Value>(&stdout).is_ok() {
            return ProcessResult::new(stdout, stderr, None, exit_code);
        }
        let message = stdout.clone();
        return ProcessResult::new(stdout, stderr, Some(message), ERROR_EXIT_CODE);
    }

    if stdout.starts_with(FAILED_MARKER) && stdout.contains("No API endpoint set") {
        let message = stdout.clone();
        return ProcessResult::new(stdout, stderr, Some(message), ERROR_EXIT_CODE);
    }

    ProcessResult::new(stdout, stderr, None, exit_code)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(stdout: &str, code: i32) -> ProcessResult {
        classify_exit(stdout.to_string(), String::new(), code)
    }

    #[test]
    fn test_empty_stdout_passes_exit_code_through() {
        let result = classify("", 1);
        assert_eq!(result.exit_code, 1);
        assert!(result.error.is_none());
    }

    #[test]
    fn test_not_authenticated_payload_prompts_login() {
        let result = classify(
            r#"{"code": 10002, "description": "Authentication error", "error_code": "CF-NotAuthenticated"}"#,
            0,
        );
        assert_eq!(result.exit_code, ERROR_EXIT_CODE);
        assert_eq!(result.error.as_deref(), Some(LOGIN_MESSAGE));
    }

    #[test]
    fn test_error_code_payload_uses_description() {
        let result = classify(
            r#"{"code": 10010, "description": "Space not found", "error_code": "CF-SpaceNotFound"}"#,
            0,
        );
        assert_eq!(result.exit_code, ERROR_EXIT_CODE);
        assert_eq!(result.error.as_deref(), Some("Space not found"));
    }

    #[test]
    fn test_error_code_payload_without_description() {
        let result = classify(r#"{"code": 1, "error_code": "CF-Unknown"}"#, 0);
        assert_eq!(result.error.as_deref(), Some(GENERIC_ERROR));
    }

    #[test]
    fn test_unparseable_error_code_falls_through() {
        let result = classify(r#"name: "error_code" value"#, 0);
        assert_eq!(result.exit_code, 0);
        assert!(result.error.is_none());
    }

    #[test]
    fn test_error_creating_request_prompts_login() {
        let result = classify("FAILED\nError creating request: token expired", 1);
        assert_eq!(result.exit_code, ERROR_EXIT_CODE);
        assert_eq!(result.error.as_deref(), Some(LOGIN_MESSAGE));
    }

    #[test]
    fn test_failed_error_banner_is_the_message() {
        let stdout = "Getting apps...\nFAILED\nServer error, status code: 500, Error: boom";
        let result = classify(stdout, 0);
        assert_eq!(result.exit_code, ERROR_EXIT_CODE);
        assert_eq!(result.error.as_deref(), Some(stdout));
    }

    /// A JSON payload that happens to contain the banner phrase is accepted.
    /// The same phrase in non-JSON output is always treated as a failure,
    /// even inside an otherwise successful listing.
    #[test]
    fn test_failed_error_heuristic_false_positive_surface() {
        let json = r#"{"description": "step failed with Error: disk full"}"#;
        let result = classify(json, 0);
        assert_eq!(result.exit_code, 0);
        assert!(result.error.is_none());

        let listing = "name   last operation\nmy-db  create failed - Error: quota";
        let result = classify(listing, 0);
        assert_eq!(result.exit_code, ERROR_EXIT_CODE);
    }

    #[test]
    fn test_no_api_endpoint_is_the_message() {
        let stdout = "FAILED\nNo API endpoint set. Use 'cf login' or 'cf api' to target an endpoint.";
        let result = classify(stdout, 1);
        assert_eq!(result.exit_code, ERROR_EXIT_CODE);
        assert_eq!(result.error.as_deref(), Some(stdout));
    }

    #[test]
    fn test_plain_output_passes_through() {
        let result = classify("OK\n", 0);
        assert_eq!(result.exit_code, 0);
        assert!(result.error.is_none());
        assert_eq!(result.stdout, "OK\n");
    }
}
