//! C11 — scripts and jobs: a `Script` is a shell-owned launched program
//! (foreground or background); a `Job` is a subprocess spawned from inside
//! a running script, tracked by that script's `job_ids` for auditability.
//!
//! Grounded in the same `runner.rs` spawn/timeout shape as [`crate::exec`],
//! generalized to stream output into a shared buffer as it arrives instead
//! of collecting it only at exit, and to expose kill/wait operations a
//! long-running background task needs. Script and Job share the same
//! output/status shape (`ProcessState`/`ProcessHandle`) — a Job differs
//! only in carrying a `script_id` back-reference and a shell-scoped id.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, Notify};
use tokio::time;
use tracing::{info, warn};
use uuid::Uuid;

use safesh_core::permissions::Config;
use safesh_core::SafeShellError;
use safesh_policy::validate_external;

use crate::env::build_env;

/// Output beyond this many bytes per stream is held back and reported as
/// truncated rather than buffered without bound.
const MAX_OUTPUT_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Command,
    Code,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
    Killed,
}

struct ProcessState {
    status: JobStatus,
    stdout: String,
    stderr: String,
    stdout_truncated: bool,
    stderr_truncated: bool,
    exit_code: Option<i32>,
    completed_at: Option<DateTime<Utc>>,
    error: Option<SafeShellError>,
}

impl ProcessState {
    fn new() -> Self {
        Self {
            status: JobStatus::Running,
            stdout: String::new(),
            stderr: String::new(),
            stdout_truncated: false,
            stderr_truncated: false,
            exit_code: None,
            completed_at: None,
            error: None,
        }
    }
}

/// The live handle behind a Script or Job: shared state plus the means to
/// signal or wait on the underlying child. Cleared (the `child` slot set to
/// `None`) once the process exits, per spec's "process handle cleared after
/// completion". `pid` is fixed at spawn time (or absent if admission/spawn
/// failed before a child ever existed), so it needs no locking to read.
struct ProcessHandle {
    state: Arc<Mutex<ProcessState>>,
    child: Arc<Mutex<Option<Child>>>,
    done: Arc<Notify>,
    pid: Option<u32>,
}

/// A slice of a process's accumulated output, for incremental polling.
#[derive(Debug, Clone)]
pub struct ScriptOutput {
    pub stdout_chunk: String,
    pub stderr_chunk: String,
    pub next_offset: usize,
    pub truncated: bool,
    pub status: JobStatus,
    pub exit_code: Option<i32>,
}

#[cfg(unix)]
fn send_sigterm(pid: u32) {
    // SAFETY: `kill` with a valid pid and SIGTERM has no memory-safety
    // implications; a failed send (already exited) is not an error here.
    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGTERM);
    }
}

#[cfg(not(unix))]
fn send_sigterm(_pid: u32) {}

async fn stream_into(
    mut reader: impl tokio::io::AsyncRead + Unpin,
    state: Arc<Mutex<ProcessState>>,
    is_stdout: bool,
) {
    let mut chunk = [0u8; 4096];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                let text = String::from_utf8_lossy(&chunk[..n]).into_owned();
                let mut s = state.lock().await;
                let (target, truncated) = if is_stdout {
                    (&mut s.stdout, &mut s.stdout_truncated)
                } else {
                    (&mut s.stderr, &mut s.stderr_truncated)
                };
                if target.len() < MAX_OUTPUT_BYTES {
                    target.push_str(&text);
                } else {
                    *truncated = true;
                }
            }
            Err(_) => break,
        }
    }
}

/// Stream output and wait out the child's exit or the timeout. Runs as a
/// detached task started once the child already exists, so the caller gets
/// the pid back before this ever runs.
async fn drain_and_wait(
    audit_id: String,
    command: String,
    state: Arc<Mutex<ProcessState>>,
    child_slot: Arc<Mutex<Option<Child>>>,
    done: Arc<Notify>,
    timeout_ms: u64,
) {
    let (stdout, stderr) = {
        let mut guard = child_slot.lock().await;
        let child = guard.as_mut().expect("child just inserted by spawn_process");
        (child.stdout.take(), child.stderr.take())
    };

    let stdout_task = stdout.map(|r| tokio::spawn(stream_into(r, state.clone(), true)));
    let stderr_task = stderr.map(|r| tokio::spawn(stream_into(r, state.clone(), false)));

    let wait = async {
        let mut guard = child_slot.lock().await;
        if let Some(child) = guard.as_mut() {
            child.wait().await
        } else {
            Err(std::io::Error::other("child missing"))
        }
    };

    let outcome = time::timeout(Duration::from_millis(timeout_ms), wait).await;

    if let Some(t) = stdout_task {
        let _ = t.await;
    }
    if let Some(t) = stderr_task {
        let _ = t.await;
    }

    let mut s = state.lock().await;
    let transition = match outcome {
        Ok(Ok(status)) => {
            s.status = JobStatus::Completed;
            s.exit_code = status.code();
            "completed"
        }
        Ok(Err(e)) => {
            s.status = JobStatus::Failed;
            s.error = Some(SafeShellError::execution_error(e.to_string()));
            "failed"
        }
        Err(_) => {
            warn!(command, timeout_ms, "script exceeded deadline, killing");
            if let Some(child) = child_slot.lock().await.as_mut() {
                let _ = child.start_kill();
            }
            s.status = JobStatus::Killed;
            s.exit_code = Some(-1);
            s.error = Some(SafeShellError::timeout(timeout_ms));
            "killed"
        }
    };
    let exit_code = s.exit_code;
    s.completed_at = Some(Utc::now());
    drop(s);
    *child_slot.lock().await = None;
    safesh_core::audit::script_transition(&audit_id, transition, exit_code);
    done.notify_waiters();
}

/// Validate and spawn `command` synchronously so the pid (if any) is
/// available to the caller immediately, then hand streaming/waiting off to
/// a detached task. A validation or spawn failure is reflected in the
/// returned handle's state with no child ever created.
fn spawn_process(
    audit_id: String,
    command: String,
    args: Vec<String>,
    config: Config,
    cwd: PathBuf,
    timeout_ms: u64,
) -> ProcessHandle {
    let state = Arc::new(Mutex::new(ProcessState::new()));
    let child_slot: Arc<Mutex<Option<Child>>> = Arc::new(Mutex::new(None));
    let done = Arc::new(Notify::new());

    safesh_core::audit::script_transition(&audit_id, "launched", None);

    if let Err(err) = validate_external(&command, &args, &config, &cwd) {
        let mut s = state.try_lock().expect("freshly created, uncontended mutex");
        s.status = JobStatus::Failed;
        s.error = Some(err);
        s.completed_at = Some(Utc::now());
        drop(s);
        safesh_core::audit::script_transition(&audit_id, "failed", None);
        return ProcessHandle {
            state,
            child: child_slot,
            done,
            pid: None,
        };
    }

    let env = build_env(&config.env);
    let mut cmd = Command::new(&command);
    cmd.args(&args)
        .current_dir(&cwd)
        .env_clear()
        .envs(&env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            let mut s = state.try_lock().expect("freshly created, uncontended mutex");
            s.status = JobStatus::Failed;
            s.error = Some(SafeShellError::execution_error(format!(
                "failed to spawn '{command}': {e}"
            )));
            s.completed_at = Some(Utc::now());
            drop(s);
            safesh_core::audit::script_transition(&audit_id, "failed", None);
            return ProcessHandle {
                state,
                child: child_slot,
                done,
                pid: None,
            };
        }
    };

    let pid = child.id();
    *child_slot
        .try_lock()
        .expect("freshly created, uncontended mutex") = Some(child);

    tokio::spawn(drain_and_wait(
        audit_id,
        command,
        state.clone(),
        child_slot.clone(),
        done.clone(),
        timeout_ms,
    ));

    ProcessHandle {
        state,
        child: child_slot,
        done,
        pid,
    }
}

/// A launched user program: `launchCommandScript`/`launchCodeScript`
/// running in the foreground or backgrounded. Owned exclusively by the
/// Shell that launched it; weakly references the Jobs spawned from inside
/// it by id.
pub struct Script {
    pub id: Uuid,
    pub kind: JobKind,
    pub code: String,
    pub background: bool,
    pub started_at: DateTime<Utc>,
    pub job_ids: Vec<String>,
    handle: ProcessHandle,
}

/// A subprocess spawned from inside a running script. Created, never
/// reparented — points back at its owning script by id only.
pub struct Job {
    pub id: String,
    pub script_id: Uuid,
    pub code: String,
    pub started_at: DateTime<Utc>,
    handle: ProcessHandle,
}

/// Shared polling/output logic behind `getScriptOutput`, keyed off a raw
/// `ProcessHandle` — both [`Script`] and [`Job`] delegate their public
/// methods here rather than duplicating it.
async fn handle_output(handle: &ProcessHandle, offset: usize) -> ScriptOutput {
    let s = handle.state.lock().await;
    let stdout_chunk = slice_from(&s.stdout, offset.min(s.stdout.len()));
    let stderr_chunk = slice_from(&s.stderr, offset.min(s.stderr.len()));
    let next_offset = s.stdout.len().max(s.stderr.len());
    ScriptOutput {
        stdout_chunk,
        stderr_chunk,
        next_offset,
        truncated: s.stdout_truncated || s.stderr_truncated,
        status: s.status,
        exit_code: s.exit_code,
    }
}

/// `killScript`/`killJob`: no-op (returns `false`) if the process already
/// finished, otherwise sends SIGTERM and marks it killed.
async fn handle_kill(handle: &ProcessHandle) -> bool {
    let mut guard = handle.child.lock().await;
    let Some(child) = guard.as_mut() else {
        return false;
    };
    match child.id() {
        Some(pid) => send_sigterm(pid),
        None => {
            let _ = child.start_kill();
        }
    }
    let mut s = handle.state.lock().await;
    if s.status == JobStatus::Running {
        s.status = JobStatus::Killed;
        s.exit_code = Some(-1);
        s.completed_at = Some(Utc::now());
    }
    true
}

async fn handle_wait(handle: &ProcessHandle) -> (JobStatus, Option<i32>) {
    loop {
        let s = handle.state.lock().await;
        if s.status != JobStatus::Running {
            return (s.status, s.exit_code);
        }
        let notified = handle.done.notified();
        drop(s);
        notified.await;
    }
}

async fn handle_is_running(handle: &ProcessHandle) -> bool {
    handle.state.lock().await.status == JobStatus::Running
}

impl Script {
    fn launch(
        kind: JobKind,
        command: String,
        args: Vec<String>,
        code: String,
        background: bool,
        config: &Config,
        cwd: &PathBuf,
    ) -> Self {
        let id = Uuid::new_v4();
        let timeout_ms = config.timeout.unwrap_or(30_000);
        let handle = spawn_process(id.to_string(), command, args, config.clone(), cwd.clone(), timeout_ms);
        Self {
            id,
            kind,
            code,
            background,
            started_at: Utc::now(),
            job_ids: Vec::new(),
            handle,
        }
    }

    pub async fn output(&self, offset: usize) -> ScriptOutput {
        handle_output(&self.handle, offset).await
    }

    pub async fn kill(&self) -> bool {
        handle_kill(&self.handle).await
    }

    pub async fn wait(&self) -> (JobStatus, Option<i32>) {
        handle_wait(&self.handle).await
    }

    pub async fn is_running(&self) -> bool {
        handle_is_running(&self.handle).await
    }

    /// The OS pid, if admission succeeded and a child was actually spawned.
    /// Fixed at launch time, so this never blocks on a lock.
    pub fn pid(&self) -> Option<u32> {
        self.handle.pid
    }

    /// Best-effort synchronous status peek for memory-trimming decisions
    /// that can't await a lock: `None` if the state is momentarily held by
    /// the streaming task, treated as "still running" by the caller.
    pub(crate) fn try_peek_status(&self) -> Option<JobStatus> {
        self.handle.state.try_lock().ok().map(|s| s.status)
    }

    /// Launch a subprocess from inside this script, threading it into
    /// `job_ids` for auditability. `job_id` is the shell-scoped id the
    /// caller's job-sequence counter produced.
    pub fn spawn_job(&mut self, job_id: String, command: String, args: Vec<String>, config: &Config, cwd: &PathBuf) -> Job {
        self.job_ids.push(job_id.clone());
        let timeout_ms = config.timeout.unwrap_or(30_000);
        let handle = spawn_process(job_id.clone(), command.clone(), args, config.clone(), cwd.clone(), timeout_ms);
        info!(script_id = %self.id, job_id = %job_id, command, "launched job from script");
        Job {
            id: job_id,
            script_id: self.id,
            code: command,
            started_at: Utc::now(),
            handle,
        }
    }
}

impl Job {
    pub async fn output(&self, offset: usize) -> ScriptOutput {
        handle_output(&self.handle, offset).await
    }

    pub async fn kill(&self) -> bool {
        handle_kill(&self.handle).await
    }

    pub async fn wait(&self) -> (JobStatus, Option<i32>) {
        handle_wait(&self.handle).await
    }

    pub fn pid(&self) -> Option<u32> {
        self.handle.pid
    }
}

/// Launch a whitelisted external command as a top-level script.
pub fn launch_command_script(command: &str, args: &[String], config: &Config, cwd: &PathBuf, background: bool) -> Script {
    let code = std::iter::once(command.to_string())
        .chain(args.iter().cloned())
        .collect::<Vec<_>>()
        .join(" ");
    let script = Script::launch(
        JobKind::Command,
        command.to_string(),
        args.to_vec(),
        code,
        background,
        config,
        cwd,
    );
    info!(id = %script.id, "launched command script");
    script
}

/// Launch `interpreter -c code` (or equivalent) as a top-level script.
/// `interpreter` must itself be whitelisted and pass C8 admission — code
/// scripts don't bypass command validation, only streaming.
pub fn launch_code_script(interpreter: &str, code: &str, config: &Config, cwd: &PathBuf, background: bool) -> Script {
    let script = Script::launch(
        JobKind::Code,
        interpreter.to_string(),
        vec!["-c".to_string(), code.to_string()],
        code.to_string(),
        background,
        config,
        cwd,
    );
    info!(id = %script.id, "launched code script");
    script
}

fn slice_from(s: &str, offset: usize) -> String {
    // `offset` is always derived from a previous `.len()` on the same
    // growing buffer, so it always lands on a char boundary.
    s[offset..].to_string()
}
