//! Process execution, shell session lifecycle, background script tracking,
//! and pending-retry bookkeeping: everything that happens once a command
//! has cleared `safesh-policy` admission.

pub mod env;
pub mod exec;
pub mod pending;
pub mod script;
pub mod shell;

pub use exec::{run_external, ExecutionResult};
pub use pending::{PendingRetry, PendingRetryRegistry};
pub use script::{Job, JobKind, JobStatus, Script, ScriptOutput};
pub use shell::{Shell, ShellManager, ShellSnapshot};

/// A shell is trimmed (oldest completed scripts evicted first) once its
/// estimated memory — buffered stdout/stderr/code plus bookkeeping
/// overhead, plus the JSON size of its vars — exceeds this (spec §4.10).
pub const SESSION_MEMORY_LIMIT_BYTES: usize = 10 * 1024 * 1024;
