//! C10 — persistent shell sessions: a `Shell` carries its own working
//! directory, env overrides, user variables, and a table of scripts/jobs it
//! owns across multiple invocations. `ShellManager` owns the collection,
//! evicting the least-recently-used session once a cap is hit.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use safesh_core::permissions::Config;

use crate::script::{self, Job, JobStatus, Script, ScriptOutput};

/// Estimated per-script bookkeeping overhead counted toward a shell's
/// memory budget, in addition to the size of its buffered output/code.
const SCRIPT_OVERHEAD_BYTES: usize = 200;

/// A single persistent session: its own working directory, config, env
/// overrides, user variables, and the scripts/jobs it owns.
pub struct Shell {
    pub id: Uuid,
    pub config: Config,
    pub cwd: PathBuf,
    pub env: HashMap<String, String>,
    pub vars: HashMap<String, Value>,
    pub scripts: HashMap<Uuid, Script>,
    pub scripts_by_pid: HashMap<u32, Uuid>,
    script_sequence: u64,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

/// A safe snapshot of a [`Shell`] suitable for serializing back to a caller
/// — no live process handles.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShellSnapshot {
    pub id: Uuid,
    pub cwd: String,
    pub env: HashMap<String, String>,
    pub vars: HashMap<String, Value>,
    pub script_count: usize,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

impl Shell {
    fn new(config: Config, cwd: PathBuf) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            config,
            cwd,
            env: HashMap::new(),
            vars: HashMap::new(),
            scripts: HashMap::new(),
            scripts_by_pid: HashMap::new(),
            script_sequence: 0,
            created_at: now,
            last_activity_at: now,
        }
    }

    /// The first 8 hex characters of the shell's id, used in job ids
    /// (`job-<shortShellId>-<n>`).
    fn short_id(&self) -> String {
        self.id.simple().to_string()[..8].to_string()
    }

    fn next_job_id(&mut self) -> String {
        self.script_sequence += 1;
        format!("job-{}-{}", self.short_id(), self.script_sequence)
    }

    pub fn cd(&mut self, path: PathBuf) {
        self.cwd = path;
        self.last_activity_at = Utc::now();
    }

    pub fn set_env(&mut self, name: &str, value: &str) {
        self.env.insert(name.to_string(), value.to_string());
        self.last_activity_at = Utc::now();
    }

    pub fn unset_env(&mut self, name: &str) {
        self.env.remove(name);
        self.last_activity_at = Utc::now();
    }

    pub fn set_var(&mut self, name: &str, value: Value) {
        self.vars.insert(name.to_string(), value);
        self.last_activity_at = Utc::now();
    }

    pub fn get_var(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    /// Merge `env`/`vars` patches into this shell and optionally replace
    /// `cwd` — the shape `update()` exposes (spec: "merges env/vars,
    /// replaces cwd").
    pub fn update(&mut self, env: HashMap<String, String>, vars: HashMap<String, Value>, cwd: Option<PathBuf>) {
        self.env.extend(env);
        self.vars.extend(vars);
        if let Some(cwd) = cwd {
            self.cwd = cwd;
        }
        self.last_activity_at = Utc::now();
    }

    /// Launch a whitelisted external command, owned by this shell.
    pub fn launch_command_script(&mut self, command: &str, args: &[String], background: bool) -> Uuid {
        let script = script::launch_command_script(command, args, &self.config, &self.cwd, background);
        self.adopt(script)
    }

    /// Launch `interpreter -c code` as a script owned by this shell.
    pub fn launch_code_script(&mut self, interpreter: &str, code: &str, background: bool) -> Uuid {
        let script = script::launch_code_script(interpreter, code, &self.config, &self.cwd, background);
        self.adopt(script)
    }

    fn adopt(&mut self, script: Script) -> Uuid {
        let id = script.id;
        if let Some(pid) = script.pid() {
            self.scripts_by_pid.insert(pid, id);
        }
        self.scripts.insert(id, script);
        self.last_activity_at = Utc::now();
        self.trim_memory();
        id
    }

    /// Look up the script owning OS pid `pid`, for callers that only have a
    /// pid to go on (e.g. an external supervisor reporting a process event).
    pub fn script_id_for_pid(&self, pid: u32) -> Option<Uuid> {
        self.scripts_by_pid.get(&pid).copied()
    }

    /// Spawn a subprocess from inside `script_id`, threading it into that
    /// script's `job_ids` and this shell's job table.
    pub fn spawn_job(&mut self, script_id: Uuid, command: &str, args: &[String]) -> Option<Job> {
        let job_id = self.next_job_id();
        let config = self.config.clone();
        let cwd = self.cwd.clone();
        let script = self.scripts.get_mut(&script_id)?;
        let job = script.spawn_job(job_id, command.to_string(), args.to_vec(), &config, &cwd);
        self.last_activity_at = Utc::now();
        Some(job)
    }

    pub async fn get_script_output(&self, id: Uuid, offset: usize) -> Option<ScriptOutput> {
        Some(self.scripts.get(&id)?.output(offset).await)
    }

    pub async fn kill_script(&self, id: Uuid) -> bool {
        match self.scripts.get(&id) {
            Some(script) => script.kill().await,
            None => false,
        }
    }

    pub async fn wait_script(&self, id: Uuid) -> Option<(JobStatus, Option<i32>)> {
        Some(self.scripts.get(&id)?.wait().await)
    }

    /// Send SIGTERM to every still-running script this shell owns — used
    /// on eviction and on explicit `end()`.
    async fn terminate_running_scripts(&self) {
        for script in self.scripts.values() {
            if script.is_running().await {
                script.kill().await;
            }
        }
    }

    /// Evict completed scripts oldest-first until estimated memory fits
    /// `limit_bytes` (P10). Running scripts are never evicted this way.
    fn trim_memory(&mut self) {
        let limit_bytes = crate::SESSION_MEMORY_LIMIT_BYTES;
        if self.estimated_memory_bytes() <= limit_bytes {
            return;
        }
        let mut completed: Vec<(Uuid, DateTime<Utc>)> = self
            .scripts
            .iter()
            .filter(|(_, s)| !matches!(s_status_sync(s), JobStatus::Running))
            .map(|(id, s)| (*id, s.started_at))
            .collect();
        completed.sort_by_key(|(_, started_at)| *started_at);

        for (id, _) in completed {
            if self.estimated_memory_bytes() <= limit_bytes {
                break;
            }
            self.scripts.remove(&id);
        }
        self.scripts_by_pid.retain(|_, id| self.scripts.contains_key(id));
    }

    fn estimated_memory_bytes(&self) -> usize {
        let scripts_bytes: usize = self
            .scripts
            .values()
            .map(|s| s.code.len() + SCRIPT_OVERHEAD_BYTES)
            .sum();
        let vars_bytes = serde_json::to_string(&self.vars).map(|s| s.len()).unwrap_or(0);
        scripts_bytes + vars_bytes
    }

    pub fn serialize(&self) -> ShellSnapshot {
        ShellSnapshot {
            id: self.id,
            cwd: self.cwd.display().to_string(),
            env: self.env.clone(),
            vars: self.vars.clone(),
            script_count: self.scripts.len(),
            created_at: self.created_at,
            last_activity_at: self.last_activity_at,
        }
    }
}

/// A `Script`'s `ProcessState.status` isn't observable without awaiting its
/// mutex; `trim_memory` is synchronous (called from non-async mutation
/// points), so it uses `try_lock` and treats a momentarily-locked script as
/// still-running rather than blocking the whole shell on output streaming.
fn s_status_sync(script: &Script) -> JobStatus {
    script
        .try_peek_status()
        .unwrap_or(JobStatus::Running)
}

/// Owns every open [`Shell`], enforcing `max_sessions` by evicting the
/// least-recently-active shell (by `last_activity_at`) when the cap would
/// otherwise be exceeded.
pub struct ShellManager {
    shells: HashMap<Uuid, Shell>,
    max_sessions: usize,
}

impl ShellManager {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            shells: HashMap::new(),
            max_sessions,
        }
    }

    /// Create a new shell, evicting the oldest session first if the
    /// manager is already at `max_sessions`.
    pub async fn create(&mut self, config: Config, cwd: PathBuf) -> Uuid {
        if self.shells.len() >= self.max_sessions {
            self.evict_oldest().await;
        }
        let shell = Shell::new(config, cwd);
        let id = shell.id;
        self.shells.insert(id, shell);
        id
    }

    /// `getOrTemp`: look up `id` if given and known; otherwise transparently
    /// create a fresh shell so the caller always gets a usable session.
    pub async fn get_or_temp(&mut self, id: Option<Uuid>, config: Config, cwd: PathBuf) -> Uuid {
        if let Some(id) = id {
            if self.shells.contains_key(&id) {
                return id;
            }
        }
        self.create(config, cwd).await
    }

    pub fn get(&self, id: Uuid) -> Option<&Shell> {
        self.shells.get(&id)
    }

    pub fn get_mut(&mut self, id: Uuid) -> Option<&mut Shell> {
        self.shells.get_mut(&id)
    }

    pub fn update(&mut self, id: Uuid, env: HashMap<String, String>, vars: HashMap<String, Value>, cwd: Option<PathBuf>) {
        if let Some(shell) = self.shells.get_mut(&id) {
            shell.update(env, vars, cwd);
        }
    }

    pub fn set_env(&mut self, id: Uuid, name: &str, value: &str) {
        if let Some(shell) = self.shells.get_mut(&id) {
            shell.set_env(name, value);
        }
    }

    pub fn unset_env(&mut self, id: Uuid, name: &str) {
        if let Some(shell) = self.shells.get_mut(&id) {
            shell.unset_env(name);
        }
    }

    pub fn cd(&mut self, id: Uuid, path: &Path) {
        if let Some(shell) = self.shells.get_mut(&id) {
            shell.cd(path.to_path_buf());
        }
    }

    pub fn set_var(&mut self, id: Uuid, name: &str, value: Value) {
        if let Some(shell) = self.shells.get_mut(&id) {
            shell.set_var(name, value);
        }
    }

    pub fn get_var(&self, id: Uuid, name: &str) -> Option<&Value> {
        self.shells.get(&id)?.get_var(name)
    }

    /// Record activity on `id`, resetting its eviction clock.
    pub fn touch(&mut self, id: Uuid) {
        if let Some(shell) = self.shells.get_mut(&id) {
            shell.last_activity_at = Utc::now();
        }
    }

    pub fn serialize(&self, id: Uuid) -> Option<ShellSnapshot> {
        self.shells.get(&id).map(Shell::serialize)
    }

    pub fn list(&self) -> Vec<ShellSnapshot> {
        self.shells.values().map(Shell::serialize).collect()
    }

    pub fn count(&self) -> usize {
        self.shells.len()
    }

    pub fn len(&self) -> usize {
        self.shells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shells.is_empty()
    }

    /// Terminate `id`'s running scripts with SIGTERM and delete it.
    pub async fn end(&mut self, id: Uuid) -> Option<Shell> {
        if let Some(shell) = self.shells.get(&id) {
            shell.terminate_running_scripts().await;
        }
        self.shells.remove(&id)
    }

    async fn evict_oldest(&mut self) {
        let oldest = self
            .shells
            .values()
            .min_by_key(|s| s.last_activity_at)
            .map(|s| s.id);
        if let Some(id) = oldest {
            self.end(id).await;
        }
    }

    /// Remove every shell whose last activity is older than `max_age`,
    /// terminating their running scripts first. Returns how many were
    /// removed.
    pub async fn cleanup(&mut self, max_age: Duration) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(max_age).unwrap_or_else(|_| chrono::Duration::zero());
        let stale: Vec<Uuid> = self
            .shells
            .iter()
            .filter(|(_, s)| s.last_activity_at < cutoff)
            .map(|(id, _)| *id)
            .collect();
        let count = stale.len();
        for id in stale {
            self.end(id).await;
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use safesh_core::permissions::Config;

    #[tokio::test]
    async fn create_shell_respects_max_sessions_by_evicting_lru() {
        let mut mgr = ShellManager::new(2);
        let first = mgr.create(Config::empty(), PathBuf::from("/a")).await;
        std::thread::sleep(std::time::Duration::from_millis(2));
        let _second = mgr.create(Config::empty(), PathBuf::from("/b")).await;

        mgr.touch(first);
        std::thread::sleep(std::time::Duration::from_millis(2));
        let _third = mgr.create(Config::empty(), PathBuf::from("/c")).await;

        assert_eq!(mgr.len(), 2);
        assert!(mgr.get(first).is_some());
    }

    #[tokio::test]
    async fn cleanup_removes_stale_shells() {
        let mut mgr = ShellManager::new(10);
        let id = mgr.create(Config::empty(), PathBuf::from("/a")).await;
        if let Some(shell) = mgr.get_mut(id) {
            shell.last_activity_at = Utc::now() - chrono::Duration::hours(2);
        }
        let removed = mgr.cleanup(Duration::from_secs(3600)).await;
        assert_eq!(removed, 1);
        assert!(mgr.get(id).is_none());
    }

    #[tokio::test]
    async fn touch_updates_last_activity() {
        let mut mgr = ShellManager::new(10);
        let id = mgr.create(Config::empty(), PathBuf::from("/a")).await;
        let before = mgr.get(id).unwrap().last_activity_at;
        std::thread::sleep(std::time::Duration::from_millis(2));
        mgr.touch(id);
        let after = mgr.get(id).unwrap().last_activity_at;
        assert!(after > before);
    }

    #[tokio::test]
    async fn get_or_temp_creates_a_shell_for_an_unknown_id() {
        let mut mgr = ShellManager::new(10);
        let unknown = Uuid::new_v4();
        let id = mgr.get_or_temp(Some(unknown), Config::empty(), PathBuf::from("/a")).await;
        assert_ne!(id, unknown);
        assert!(mgr.get(id).is_some());
    }

    #[tokio::test]
    async fn set_env_and_get_var_round_trip() {
        let mut mgr = ShellManager::new(10);
        let id = mgr.create(Config::empty(), PathBuf::from("/a")).await;
        mgr.set_env(id, "FOO", "bar");
        mgr.set_var(id, "count", Value::from(3));
        assert_eq!(mgr.get(id).unwrap().env.get("FOO"), Some(&"bar".to_string()));
        assert_eq!(mgr.get_var(id, "count"), Some(&Value::from(3)));
    }

    #[tokio::test]
    async fn launching_a_script_populates_the_pid_index() {
        let mut config = Config::empty();
        config.permissions.run = vec!["echo".to_string()];
        let mut mgr = ShellManager::new(10);
        let shell_id = mgr.create(config, std::env::temp_dir()).await;
        let shell = mgr.get_mut(shell_id).unwrap();

        let script_id = shell.launch_command_script("echo", &["hi".to_string()], false);
        let pid = shell.scripts.get(&script_id).unwrap().pid().unwrap();
        assert_eq!(shell.script_id_for_pid(pid), Some(script_id));
    }

    #[tokio::test]
    async fn spawn_job_threads_into_the_owning_scripts_job_ids() {
        let mut config = Config::empty();
        config.permissions.run = vec!["echo".to_string()];
        let mut mgr = ShellManager::new(10);
        let shell_id = mgr.create(config, std::env::temp_dir()).await;
        let shell = mgr.get_mut(shell_id).unwrap();

        let script_id = shell.launch_command_script("echo", &["parent".to_string()], true);
        let job = shell
            .spawn_job(script_id, "echo", &["child".to_string()])
            .unwrap();
        assert!(job.id.starts_with("job-"));
        assert_eq!(shell.scripts.get(&script_id).unwrap().job_ids, vec![job.id.clone()]);
    }

    #[tokio::test]
    async fn end_terminates_running_scripts_before_removing_the_shell() {
        let mut config = Config::empty();
        config.permissions.run = vec!["sleep".to_string()];
        let mut mgr = ShellManager::new(10);
        let shell_id = mgr.create(config, std::env::temp_dir()).await;
        let script_id = mgr
            .get_mut(shell_id)
            .unwrap()
            .launch_command_script("sleep", &["5".to_string()], true);

        tokio::time::sleep(Duration::from_millis(50)).await;
        let ended = mgr.end(shell_id).await.unwrap();
        let output = ended.scripts.get(&script_id).unwrap().output(0).await;
        assert_eq!(output.status, JobStatus::Killed);
    }
}
