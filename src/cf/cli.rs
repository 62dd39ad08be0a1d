//! Process runner
//!
//! Invokes the `cf` binary and normalizes every outcome into a
//! [`ProcessResult`]. Running never fails: spawn errors, classified failures
//! and cancellations all come back as a result with `error` and `exit_code` set.

use super::classify::classify_exit;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

/// Name of the wrapped binary
pub const CF_CMD: &str = "cf";

/// Exit code for failures decided by this crate rather than by `cf`
pub const ERROR_EXIT_CODE: i32 = -1;

/// Exit code when the token was cancelled before the process started
pub const CANCEL_REQUESTED_EXIT_CODE: i32 = -2;

/// Exit code when the token was cancelled while the process was running
pub const CANCELED_EXIT_CODE: i32 = -3;

/// Environment marker identifying the calling runtime to `cf`
pub const RUNTIME_VERSION_VAR: &str = "CF_TOOLS_VERSION";

/// Maximum length of process output to log
const MAX_LOG_OUTPUT_LENGTH: usize = 200;

/// Outcome of one `cf` invocation
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessResult {
    pub stdout: String,
    pub stderr: String,
    pub error: Option<String>,
    pub exit_code: i32,
}

impl ProcessResult {
    pub fn new(stdout: String, stderr: String, error: Option<String>, exit_code: i32) -> Self {
        Self {
            stdout,
            stderr,
            error,
            exit_code,
        }
    }

    /// A result carrying only an exit code, used for cancellations
    pub fn with_exit_code(exit_code: i32) -> Self {
        Self {
            exit_code,
            ..Self::default()
        }
    }

    fn spawn_error(program: &str, err: &std::io::Error) -> Self {
        let message = if err.kind() == std::io::ErrorKind::NotFound {
            format!("{}: command not found", program)
        } else {
            err.to_string()
        };
        Self::new(String::new(), String::new(), Some(message), ERROR_EXIT_CODE)
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0 && self.error.is_none()
    }
}

/// Per-invocation options
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Variables layered over the ambient environment
    pub env: HashMap<String, String>,
    /// Working directory (defaults to the directory of the running executable)
    pub cwd: Option<PathBuf>,
}

impl RunOptions {
    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.insert(key.to_string(), value.to_string());
        self
    }
}

/// Something that can run `cf` with an argument vector
///
/// [`CfCli`] is the production implementation; tests plug in scripted runners.
#[async_trait]
pub trait CliRunner: Send + Sync {
    async fn run(
        &self,
        args: &[String],
        options: &RunOptions,
        token: &CancellationToken,
    ) -> ProcessResult;
}

/// Runs the real `cf` binary
#[derive(Debug, Clone)]
pub struct CfCli {
    program: String,
}

impl CfCli {
    pub fn new() -> Self {
        Self {
            program: CF_CMD.to_string(),
        }
    }

    /// Run a different binary with the same semantics
    pub fn with_program(program: &str) -> Self {
        Self {
            program: program.to_string(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Default for CfCli {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CliRunner for CfCli {
    async fn run(
        &self,
        args: &[String],
        options: &RunOptions,
        token: &CancellationToken,
    ) -> ProcessResult {
        if token.is_cancelled() {
            tracing::debug!(
                "Skipping {} {}: cancellation requested",
                self.program,
                args.first().map(String::as_str).unwrap_or("")
            );
            return ProcessResult::with_exit_code(CANCEL_REQUESTED_EXIT_CODE);
        }

        tracing::debug!("Executing: {} {}", self.program, sanitize_args_for_log(args).join(" "));

        let mut command = Command::new(&self.program);
        command
            .args(args)
            .envs(build_env(options))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(cwd) = options.cwd.clone().or_else(default_cwd) {
            command.current_dir(cwd);
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!("Failed to spawn {}: {}", self.program, e);
                return ProcessResult::spawn_error(&self.program, &e);
            },
        };

        let outcome = tokio::select! {
            collected = collect_output(&mut child) => Some(collected),
            _ = token.cancelled() => None,
        };

        match outcome {
            Some(Ok((stdout, stderr, status))) => {
                let exit_code = status.code().unwrap_or(ERROR_EXIT_CODE);
                tracing::debug!(
                    "{} exited with {}: {}",
                    self.program,
                    exit_code,
                    sanitize_for_log(&stdout)
                );
                classify_exit(stdout, stderr, exit_code)
            },
            Some(Err(e)) => {
                tracing::warn!("{} failed while running: {}", self.program, e);
                ProcessResult::new(
                    String::new(),
                    String::new(),
                    Some(e.to_string()),
                    ERROR_EXIT_CODE,
                )
            },
            None => {
                tracing::debug!("Cancelling running {} process", self.program);
                if let Err(e) = child.kill().await {
                    tracing::warn!("Failed to kill {}: {}", self.program, e);
                }
                ProcessResult::with_exit_code(CANCELED_EXIT_CODE)
            },
        }
    }
}

/// Drain stdout and stderr while waiting for the child to exit
async fn collect_output(child: &mut Child) -> std::io::Result<(String, String, ExitStatus)> {
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let (stdout, stderr, status) =
        tokio::try_join!(read_stream(stdout), read_stream(stderr), child.wait())?;

    Ok((stdout, stderr, status))
}

async fn read_stream<R: AsyncRead + Unpin>(stream: Option<R>) -> std::io::Result<String> {
    let Some(mut stream) = stream else {
        return Ok(String::new());
    };

    let mut collected = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        let read = stream.read(&mut chunk).await?;
        if read == 0 {
            break;
        }
        collected.extend_from_slice(&chunk[..read]);
    }

    Ok(String::from_utf8_lossy(&collected).into_owned())
}

/// Environment for the child: ambient env, then our markers, then caller overrides
fn build_env(options: &RunOptions) -> HashMap<String, String> {
    let mut env: HashMap<String, String> = std::env::vars().collect();
    env.insert("CF_COLOR".to_string(), "false".to_string());
    env.insert(
        RUNTIME_VERSION_VAR.to_string(),
        env!("CARGO_PKG_VERSION").to_string(),
    );
    env.extend(options.env.clone());
    env
}

fn default_cwd() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.to_path_buf()))
}

/// Mask credentials before an argument vector reaches the log
pub fn sanitize_args_for_log(args: &[String]) -> Vec<String> {
    let mut sanitized = args.to_vec();
    for i in 0..args.len() {
        match args[i].as_str() {
            // cf auth <user> <password>
            "auth" if i + 2 < args.len() => sanitized[i + 2] = "***".to_string(),
            "-p" | "--password" if i + 1 < args.len() => sanitized[i + 1] = "***".to_string(),
            _ => {},
        }
    }
    sanitized
}

/// Truncate long output and strip control characters for logging
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_OUTPUT_LENGTH {
        let cut = (0..=MAX_LOG_OUTPUT_LENGTH)
            .rev()
            .find(|i| body.is_char_boundary(*i))
            .unwrap_or(0);
        format!("{}... [truncated, {} bytes total]", &body[..cut], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| c.is_control() && c != ' ', " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_cancelled_token_never_spawns() {
        // A missing binary would report "command not found" if it were spawned
        let cli = CfCli::with_program("cf-tools-definitely-missing-binary");
        let token = CancellationToken::new();
        token.cancel();

        let result = cli
            .run(&args(&["orgs"]), &RunOptions::default(), &token)
            .await;

        assert_eq!(result.exit_code, CANCEL_REQUESTED_EXIT_CODE);
        assert!(result.stdout.is_empty());
        assert!(result.stderr.is_empty());
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn test_missing_binary_reports_command_not_found() {
        let cli = CfCli::with_program("cf-tools-definitely-missing-binary");
        let result = cli
            .run(&args(&["orgs"]), &RunOptions::default(), &CancellationToken::new())
            .await;

        assert_eq!(result.exit_code, ERROR_EXIT_CODE);
        assert_eq!(
            result.error.as_deref(),
            Some("cf-tools-definitely-missing-binary: command not found")
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_output_and_exit_code_are_collected() {
        let cli = CfCli::with_program("sh");
        let result = cli
            .run(
                &args(&["-c", "echo out; echo err >&2; exit 3"]),
                &RunOptions::default(),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(result.exit_code, 3);
        assert_eq!(result.stdout, "out\n");
        assert_eq!(result.stderr, "err\n");
        assert!(result.error.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_env_overrides_win() {
        let cli = CfCli::with_program("sh");
        let options = RunOptions::default().with_env("CF_COLOR", "true");
        let result = cli
            .run(
                &args(&["-c", "echo $CF_COLOR $CF_TOOLS_VERSION"]),
                &options,
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(
            result.stdout.trim(),
            format!("true {}", env!("CARGO_PKG_VERSION"))
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancel_after_start_kills_process() {
        let cli = CfCli::with_program("sh");
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            canceller.cancel();
        });

        let result = cli
            .run(&args(&["-c", "echo started; sleep 30"]), &RunOptions::default(), &token)
            .await;

        assert_eq!(result.exit_code, CANCELED_EXIT_CODE);
        assert!(result.stdout.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failure_banner_is_classified() {
        let cli = CfCli::with_program("sh");
        let result = cli
            .run(
                &args(&["-c", "printf 'FAILED\\nNo API endpoint set.'"]),
                &RunOptions::default(),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(result.exit_code, ERROR_EXIT_CODE);
        assert_eq!(result.error.as_deref(), Some("FAILED\nNo API endpoint set."));
    }

    #[test]
    fn test_sanitize_args_masks_passwords() {
        let masked = sanitize_args_for_log(&args(&["auth", "user", "secret"]));
        assert_eq!(masked, args(&["auth", "user", "***"]));

        let masked = sanitize_args_for_log(&args(&["login", "-u", "user", "-p", "secret"]));
        assert_eq!(masked, args(&["login", "-u", "user", "-p", "***"]));
    }
}
