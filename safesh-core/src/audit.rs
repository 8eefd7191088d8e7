//! Append-only JSON-lines audit log, grounded in the teacher's
//! `observability.rs` `audit_*`/`append_jsonl` pairing: same opt-in-by-env,
//! cache-the-path-once, best-effort-append shape, trimmed to the events
//! this core actually produces (admission decisions, script/job lifecycle
//! transitions, and local-override writes) instead of the teacher's
//! skill-confirmation events.
//!
//! Every function here is a no-op unless `SAFESH_AUDIT_LOG` is set — the
//! log is a supplement a caller opts into, never a required side effect of
//! admission or execution.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use serde_json::{json, Value};

static AUDIT_PATH: Mutex<Option<Option<String>>> = Mutex::new(None);

fn audit_path() -> Option<String> {
    let mut cached = AUDIT_PATH.lock().ok()?;
    if let Some(path) = cached.as_ref() {
        return path.clone();
    }
    let path = std::env::var("SAFESH_AUDIT_LOG").ok().filter(|p| !p.is_empty());
    if let Some(ref p) = path {
        if let Some(parent) = Path::new(p).parent() {
            let _ = std::fs::create_dir_all(parent);
        }
    }
    *cached = Some(path.clone());
    path
}

fn append(record: Value) {
    let Some(path) = audit_path() else { return };
    if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(&path) {
        if let Ok(line) = serde_json::to_string(&record) {
            let _ = writeln!(file, "{line}");
        }
    }
}

fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Record an admission decision — every `validateExternal`/path/import
/// check that either let a request through or rejected it.
pub fn admission_decision(command: &str, admitted: bool, code: Option<&str>) {
    append(json!({
        "ts": timestamp(),
        "event": "admission_decision",
        "command": command,
        "admitted": admitted,
        "code": code,
    }));
}

/// Record a script/job lifecycle transition (`launched`, `completed`,
/// `failed`, `killed`).
pub fn script_transition(script_id: &str, transition: &str, exit_code: Option<i32>) {
    append(json!({
        "ts": timestamp(),
        "event": "script_transition",
        "scriptId": script_id,
        "transition": transition,
        "exitCode": exit_code,
    }));
}

/// Record a `saveToLocalJson` write: the only path by which session-granted
/// "always allow" persists across processes.
pub fn local_override_saved(path: &str, commands: &[String]) {
    append(json!({
        "ts": timestamp(),
        "event": "local_override_saved",
        "path": path,
        "commands": commands,
    }));
}
