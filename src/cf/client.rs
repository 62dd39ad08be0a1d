//! CF Client
//!
//! Session object tying together the process runner, the ambient `cf`
//! configuration, the lookup cache and polling settings.

use super::cf_config::CfConfig;
use super::cli::{
    CfCli, CliRunner, ProcessResult, RunOptions, CANCELED_EXIT_CODE, CANCEL_REQUESTED_EXIT_CODE,
    ERROR_EXIT_CODE,
};
use crate::error::{Error, Result};
use crate::resource::cache::ResourceCache;
use crate::resource::json::first_api_error;
use crate::resource::poller::PollSettings;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Main CF client
///
/// Cheap to clone; clones share the runner and the cache.
#[derive(Clone)]
pub struct CfClient {
    runner: Arc<dyn CliRunner>,
    pub config: CfConfig,
    pub poll: PollSettings,
    /// Plan guid to service offering resource
    offerings: ResourceCache<Value>,
}

impl CfClient {
    pub fn new(runner: Arc<dyn CliRunner>, config: CfConfig) -> Self {
        Self {
            runner,
            config,
            poll: PollSettings::default(),
            offerings: ResourceCache::new(),
        }
    }

    /// Client running the real `cf` against the ambient configuration
    pub fn from_env() -> Self {
        Self::new(Arc::new(CfCli::new()), CfConfig::from_env())
    }

    pub fn with_poll_settings(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    pub fn offerings_cache(&self) -> &ResourceCache<Value> {
        &self.offerings
    }

    /// Forget cached lookups; needed whenever the org or space changes
    pub fn clear_cache(&self) {
        self.offerings.clear();
    }

    /// Run `cf` and return the raw result, whatever it is
    pub async fn run(
        &self,
        args: &[String],
        options: &RunOptions,
        token: Option<&CancellationToken>,
    ) -> ProcessResult {
        match token {
            Some(token) => self.runner.run(args, options, token).await,
            None => {
                self.runner
                    .run(args, options, &CancellationToken::new())
                    .await
            },
        }
    }

    /// Run `cf` and return stdout, or the classified failure
    pub async fn execute(
        &self,
        args: &[String],
        token: Option<&CancellationToken>,
    ) -> Result<String> {
        let result = self.run(args, &RunOptions::default(), token).await;
        into_stdout(result)
    }

    /// `cf curl <path>` parsed as JSON
    ///
    /// An `errors` array in the answer is a failure.
    pub async fn curl(&self, path: &str, token: Option<&CancellationToken>) -> Result<Value> {
        let args = vec!["curl".to_string(), path.to_string()];
        let stdout = self.execute(&args, token).await?;
        parse_payload(&stdout)
    }

    /// `cf curl <path> -X POST -d <body>` parsed as JSON
    pub async fn curl_post(
        &self,
        path: &str,
        body: &Value,
        token: Option<&CancellationToken>,
    ) -> Result<Value> {
        self.curl_request(path, "POST", Some(body), token).await
    }

    /// `cf curl <path> -X <method> [-d <body>]` parsed as JSON
    ///
    /// An empty answer (202 or 204 without a body) parses as `Null`.
    pub async fn curl_request(
        &self,
        path: &str,
        method: &str,
        body: Option<&Value>,
        token: Option<&CancellationToken>,
    ) -> Result<Value> {
        let mut args = vec![
            "curl".to_string(),
            path.to_string(),
            "-X".to_string(),
            method.to_string(),
        ];
        if let Some(body) = body {
            args.push("-d".to_string());
            args.push(body.to_string());
        }
        let stdout = self.execute(&args, token).await?;
        parse_payload(&stdout)
    }
}

/// Turn a process result into stdout or an error
pub fn into_stdout(result: ProcessResult) -> Result<String> {
    match result.exit_code {
        CANCEL_REQUESTED_EXIT_CODE | CANCELED_EXIT_CODE => return Err(Error::Canceled),
        0 if result.error.is_none() => return Ok(result.stdout),
        _ => {},
    }

    // Classified banners always carry the stdout they were read from;
    // spawn and I/O failures share the exit code but have no output
    if result.exit_code == ERROR_EXIT_CODE && !result.stdout.is_empty() {
        if let Some(message) = &result.error {
            return Err(Error::Platform(message.clone()));
        }
    }

    let message = result
        .error
        .clone()
        .or_else(|| non_empty(&result.stderr))
        .or_else(|| non_empty(&result.stdout))
        .unwrap_or_else(|| format!("cf exited with code {}", result.exit_code));

    Err(Error::Process {
        message,
        exit_code: result.exit_code,
    })
}

fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Strict JSON parse of a `cf curl` answer
fn parse_payload(stdout: &str) -> Result<Value> {
    if stdout.trim().is_empty() {
        return Ok(Value::Null);
    }

    let payload: Value = serde_json::from_str(stdout)?;
    match first_api_error(&payload) {
        Some(err) => Err(err),
        None => Ok(payload),
    }
}
