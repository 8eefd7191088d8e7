//! C9 — the async external-command runner: validate, build an env, spawn,
//! race against a deadline, and collect output.
//!
//! Grounded in the teacher's `runner.rs` (`run_in_sandbox_with_limits_and_level`):
//! spawn under a clean environment and working directory, then race the
//! child's completion against a timeout rather than blocking indefinitely.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::time;
use tracing::{info, warn};

use safesh_core::permissions::Config;
use safesh_core::SafeShellError;
use safesh_policy::validate_external;

use crate::env::build_env;

/// Default deadline when neither the caller nor `Config.timeout` specify one.
const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// The outcome of a completed (not timed-out, not failed-to-spawn) run.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration_ms: u64,
}

/// Validate and run `command args...` under `config`, in `cwd`, within the
/// configured timeout (or `timeout_override_ms` if given). `stdin` is
/// written to the child before closing its input, if present.
pub async fn run_external(
    command: &str,
    args: &[String],
    config: &Config,
    cwd: &Path,
    timeout_override_ms: Option<u64>,
    stdin: Option<&str>,
) -> Result<ExecutionResult, SafeShellError> {
    validate_external(command, args, config, cwd)?;

    let timeout_ms = timeout_override_ms
        .or(config.timeout)
        .unwrap_or(DEFAULT_TIMEOUT_MS);

    let env = build_env(&config.env);

    let mut cmd = Command::new(command);
    cmd.args(args)
        .current_dir(cwd)
        .env_clear()
        .envs(&env)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let started = Instant::now();
    let mut child = cmd
        .spawn()
        .map_err(|e| SafeShellError::execution_error(format!("failed to spawn '{command}': {e}")))?;

    let stdin_pipe = child.stdin.take();
    info!(command, ?args, timeout_ms, "spawned external command");

    // Stdin must be written concurrently with draining stdout/stderr: a
    // child that fills its stdout pipe before reading all of stdin will
    // deadlock against a caller that writes stdin to completion first.
    let write_stdin = async {
        match (stdin, stdin_pipe) {
            (Some(input), Some(mut pipe)) => {
                let result = pipe.write_all(input.as_bytes()).await;
                drop(pipe);
                result
            }
            (_, pipe) => {
                drop(pipe);
                Ok(())
            }
        }
    };

    let drain_output = async {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        if let Some(mut out) = child.stdout.take() {
            let _ = out.read_to_end(&mut stdout).await;
        }
        if let Some(mut err) = child.stderr.take() {
            let _ = err.read_to_end(&mut stderr).await;
        }
        (stdout, stderr)
    };

    let wait = async {
        let (stdin_result, (stdout, stderr)) = tokio::join!(write_stdin, drain_output);
        stdin_result.map_err(|e| {
            std::io::Error::other(format!("failed writing stdin to '{command}': {e}"))
        })?;
        let status = child.wait().await?;
        std::io::Result::Ok((status, stdout, stderr))
    };

    match time::timeout(Duration::from_millis(timeout_ms), wait).await {
        Ok(Ok((status, stdout, stderr))) => Ok(ExecutionResult {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_code: status.code().unwrap_or(-1),
            duration_ms: started.elapsed().as_millis() as u64,
        }),
        Ok(Err(e)) => Err(SafeShellError::execution_error(format!(
            "failed while waiting on '{command}': {e}"
        ))),
        Err(_) => {
            warn!(command, timeout_ms, "command exceeded deadline, killing");
            let _ = child.start_kill();
            Err(SafeShellError::timeout(timeout_ms))
        }
    }
}
