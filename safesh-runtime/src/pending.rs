//! Pending-retry registry: when an invocation is blocked by policy but a
//! human approves a one-time override, the original request is held here
//! under an id so it can be replayed exactly once — never left around to
//! be silently replayed twice, and never guessable from outside.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use safesh_core::SafeShellError;
use uuid::Uuid;

/// A blocked invocation waiting on human approval to retry.
#[derive(Debug, Clone)]
pub struct PendingRetry {
    pub id: Uuid,
    pub command: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub error: SafeShellError,
    pub created_at: DateTime<Utc>,
}

/// Owns every pending retry awaiting approval.
#[derive(Default)]
pub struct PendingRetryRegistry {
    entries: HashMap<Uuid, PendingRetry>,
}

impl PendingRetryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a blocked invocation, returning the id a caller presents
    /// back to retry it.
    pub fn insert(
        &mut self,
        command: String,
        args: Vec<String>,
        cwd: PathBuf,
        error: SafeShellError,
    ) -> Uuid {
        let id = Uuid::new_v4();
        self.entries.insert(
            id,
            PendingRetry {
                id,
                command,
                args,
                cwd,
                error,
                created_at: Utc::now(),
            },
        );
        id
    }

    /// Remove and return the pending retry for `id`, if present. A second
    /// call for the same id returns `None` — approval is single-use.
    pub fn consume_pending_retry(&mut self, id: Uuid) -> Option<PendingRetry> {
        self.entries.remove(&id)
    }

    pub fn peek(&self, id: Uuid) -> Option<&PendingRetry> {
        self.entries.get(&id)
    }

    /// Drop entries older than `max_age`, returning how many were removed.
    pub fn cleanup(&mut self, max_age: Duration) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(max_age).unwrap_or_else(|_| chrono::Duration::zero());
        let stale: Vec<Uuid> = self
            .entries
            .iter()
            .filter(|(_, r)| r.created_at < cutoff)
            .map(|(id, _)| *id)
            .collect();
        let count = stale.len();
        for id in stale {
            self.entries.remove(&id);
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use safesh_core::SafeShellError;

    #[test]
    fn consume_is_single_use() {
        let mut reg = PendingRetryRegistry::new();
        let id = reg.insert(
            "rm".into(),
            vec!["-rf".into(), "/tmp/x".into()],
            PathBuf::from("/tmp"),
            SafeShellError::permission_denied("blocked"),
        );

        assert!(reg.consume_pending_retry(id).is_some());
        assert!(reg.consume_pending_retry(id).is_none());
    }

    #[test]
    fn cleanup_removes_stale_entries() {
        let mut reg = PendingRetryRegistry::new();
        let id = reg.insert(
            "rm".into(),
            vec![],
            PathBuf::from("/tmp"),
            SafeShellError::permission_denied("blocked"),
        );
        if let Some(entry) = reg.entries.get_mut(&id) {
            entry.created_at = Utc::now() - chrono::Duration::hours(2);
        }
        assert_eq!(reg.cleanup(Duration::from_secs(3600)), 1);
        assert!(reg.peek(id).is_none());
    }
}
