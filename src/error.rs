//! Error types
//!
//! Every public operation either resolves with its documented shape or fails
//! with one of these variants. Messages are fixed templates with the offending
//! identifier filled in, never raw process dumps.

use thiserror::Error;

/// Message shown whenever the wrapped tool reports a missing session
pub const LOGIN_MESSAGE: &str = "Not logged in. Use '$ cf login' to log in.";

/// Result type used across the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by `cf-tools`
///
/// The type is `Clone` because cached lookups hand the same outcome to every
/// waiter on a key.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum Error {
    /// The `cf` process could not run, or exited with a classified failure
    #[error("{message}")]
    Process { message: String, exit_code: i32 },

    /// The work was cancelled through its token
    #[error("Operation was cancelled")]
    Canceled,

    /// The platform reported a failure in a human-readable banner
    #[error("{0}")]
    Platform(String),

    /// The REST API answered with an `errors` array
    #[error("{detail} (code: {code}, title: {title})")]
    Api {
        detail: String,
        code: String,
        title: String,
    },

    /// A filter key outside the resource's allow-list
    #[error("The '{key}' filter is not allowed for '{resource}' resources")]
    DisallowedFilter { key: String, resource: String },

    /// No space is targeted in the ambient `cf` configuration
    #[error("No space targeted. Use '$ cf target -s <space>' to target a space.")]
    SpaceNotTargeted,

    /// A queried entity does not exist
    #[error("{kind} '{name}' not found")]
    NotFound { kind: String, name: String },

    /// An asynchronous operation ended in the `failed` state
    #[error("Operation on '{name}' failed: {description}")]
    OperationFailed { name: String, description: String },

    /// The poll budget ran out before the operation settled
    #[error("Exceeded number of attempts to verify the status of '{name}'")]
    AttemptsExhausted { name: String },

    /// The `cf` configuration or the crate settings could not be read
    #[error("Configuration error: {0}")]
    Config(String),

    /// A payload was not valid JSON or lacked a required shape
    #[error("Invalid JSON payload: {0}")]
    Json(String),
}

impl Error {
    pub fn not_found(kind: &str, name: &str) -> Self {
        Self::NotFound {
            kind: kind.to_string(),
            name: name.to_string(),
        }
    }

    pub fn disallowed_filter(key: &str, resource: &str) -> Self {
        Self::DisallowedFilter {
            key: key.to_string(),
            resource: resource.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}
