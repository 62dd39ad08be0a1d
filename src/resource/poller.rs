//! Asynchronous operation poller
//!
//! Drives a freshly created resource to a terminal state by re-reading it
//! until its `last_operation` settles, the attempt budget runs out, or the
//! caller cancels.

use super::json::{at_path, first_api_error, str_at};
use crate::error::{Error, Result};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Attempts made before giving up
pub const DEFAULT_MAX_ATTEMPTS: u32 = 45;

/// Delay between two attempts
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// Budget and pacing of a poll loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Where a polled resource stands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus {
    /// Just created, not inspected yet
    Pending,
    /// Server reports the operation is still running
    InProgress,
    Succeeded,
    Failed(String),
    Canceled,
    Exhausted,
}

impl PollStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::InProgress)
    }
}

/// Receives progress increments, in percent
pub trait ProgressReporter: Send + Sync {
    fn report(&self, increment: f64, message: &str);
}

impl<F> ProgressReporter for F
where
    F: Fn(f64, &str) + Send + Sync,
{
    fn report(&self, increment: f64, message: &str) {
        self(increment, message)
    }
}

/// Reporter that drops every update
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _increment: f64, _message: &str) {}
}

/// State carried between attempts
#[derive(Debug, Clone)]
pub struct PollState {
    pub resource: Value,
    pub attempt: u32,
    pub max_attempts: u32,
    pub status: PollStatus,
}

impl PollState {
    pub fn new(resource: Value, max_attempts: u32) -> Self {
        Self {
            resource,
            attempt: 0,
            max_attempts,
            status: PollStatus::Pending,
        }
    }

    pub fn remaining(&self) -> u32 {
        self.max_attempts.saturating_sub(self.attempt)
    }

    pub fn name(&self) -> String {
        str_at(&self.resource, "name").unwrap_or("").to_string()
    }

    /// Result of a settled poll
    fn into_outcome(self, progress: &dyn ProgressReporter) -> Result<Value> {
        let name = self.name();
        match self.status {
            PollStatus::Succeeded => {
                progress.report(100.0, &format!("'{}' is ready", name));
                Ok(self.resource)
            },
            PollStatus::Failed(description) => Err(Error::OperationFailed { name, description }),
            PollStatus::Canceled => Err(Error::Canceled),
            PollStatus::Pending | PollStatus::InProgress | PollStatus::Exhausted => {
                Err(Error::AttemptsExhausted { name })
            },
        }
    }

    /// Classify `last_operation`
    ///
    /// A resource without `last_operation` has nothing pending. One that has
    /// it but lacks `state` is still in progress.
    fn inspect(&self) -> PollStatus {
        let Some(operation) = at_path(&self.resource, "last_operation") else {
            return PollStatus::Succeeded;
        };
        if operation.is_null() {
            return PollStatus::Succeeded;
        }

        match str_at(operation, "state").unwrap_or("in progress") {
            "in progress" => PollStatus::InProgress,
            "failed" => PollStatus::Failed(
                str_at(operation, "description")
                    .unwrap_or("unknown error")
                    .to_string(),
            ),
            _ => PollStatus::Succeeded,
        }
    }
}

/// Poll `initial` until it settles
///
/// `lookup` re-reads the resource; attempts run strictly one after another and
/// a failing lookup fails the poll. The loop ends on the first terminal
/// [`PollStatus`], which then decides the outcome.
pub async fn poll_until_ready<L, Fut>(
    initial: Value,
    settings: &PollSettings,
    mut lookup: L,
    progress: &dyn ProgressReporter,
    token: &CancellationToken,
) -> Result<Value>
where
    L: FnMut() -> Fut,
    Fut: Future<Output = Result<Value>>,
{
    let mut state = PollState::new(initial, settings.max_attempts);

    loop {
        let name = state.name();

        if let Some(err) = first_api_error(&state.resource) {
            tracing::info!("'{}' reported errors: {}", name, err);
            return Err(err);
        }

        state.status = if state.remaining() == 0 {
            PollStatus::Exhausted
        } else if token.is_cancelled() {
            PollStatus::Canceled
        } else {
            state.inspect()
        };
        if state.status.is_terminal() {
            break;
        }

        let increment = 100.0 / f64::from(state.max_attempts);
        progress.report(increment, &format!("Waiting for '{}'", name));
        tracing::debug!(
            "'{}' in progress (attempt {}/{})",
            name,
            state.attempt + 1,
            state.max_attempts
        );

        tokio::select! {
            _ = tokio::time::sleep(settings.interval) => {},
            _ = token.cancelled() => {
                state.status = PollStatus::Canceled;
                break;
            },
        }

        state.resource = lookup().await?;
        state.attempt += 1;
    }

    tracing::info!(
        "'{}' settled as {:?} after {} attempt(s)",
        state.name(),
        state.status,
        state.attempt
    );
    state.into_outcome(progress)
}
