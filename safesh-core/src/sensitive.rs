//! Fixed, process-wide sensitive-path constants.
//!
//! These are the mandatory deny lists C4 appends to every effective
//! permission set regardless of what a config declares. Grounded in the
//! teacher's `security::policy` mandatory-deny tables, narrowed to exactly
//! the set spec §4.4 enumerates.

/// Sensitive paths that are never readable, on top of whatever a config denies.
pub const SENSITIVE_READ_DENY: &[&str] = &[
    "~/.ssh",
    "~/.gnupg",
    "~/.aws/credentials",
    "~/.config/gh",
    "~/.netrc",
    "~/.npmrc",
    "~/.pypirc",
    "~/.docker/config.json",
    "~/.kube/config",
];

/// Shell rc files appended to the write-deny set on top of [`SENSITIVE_READ_DENY`].
const SHELL_RC_FILES: &[&str] = &[
    "~/.bashrc",
    "~/.bash_profile",
    "~/.zshrc",
    "~/.zprofile",
    "~/.profile",
];

/// Sensitive paths that are never writable: the read-deny list plus shell rc files.
pub fn sensitive_write_deny() -> Vec<String> {
    SENSITIVE_READ_DENY
        .iter()
        .chain(SHELL_RC_FILES.iter())
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_deny_is_superset_of_read_deny() {
        let write = sensitive_write_deny();
        for p in SENSITIVE_READ_DENY {
            assert!(write.iter().any(|w| w == p));
        }
    }

    #[test]
    fn write_deny_includes_shell_rc_files() {
        let write = sensitive_write_deny();
        assert!(write.iter().any(|w| w == "~/.bashrc"));
    }
}
