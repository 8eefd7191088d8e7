//! Post-merge config validation (spec §3 invariants, §4.5): some problems
//! fail the load outright, others are surfaced as warnings and the load
//! proceeds.

use safesh_core::permissions::{CommandAllow, Config, NetPolicy};
use safesh_core::sensitive::SENSITIVE_READ_DENY;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub message: String,
}

impl ValidationIssue {
    fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
        }
    }

    fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
        }
    }
}

/// System directories `write` must never touch, on top of the literal `/`.
const PROTECTED_SYSTEM_DIRS: &[&str] = &["/etc", "/var", "/usr", "/bin", "/sbin", "/System"];

fn touches_system_dir(pattern: &str) -> bool {
    PROTECTED_SYSTEM_DIRS
        .iter()
        .any(|d| pattern == *d || pattern.starts_with(&format!("{d}/")))
}

fn is_sensitive_dir(pattern: &str) -> bool {
    SENSITIVE_READ_DENY.iter().any(|d| pattern == *d || pattern.starts_with(&format!("{d}/")))
}

/// Validate `config`, returning every issue found. Callers decide whether
/// `Severity::Error` issues abort the load (see `skip_validation`).
pub fn validate(config: &Config) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    // --- hard errors (spec §4.5 + §3 invariants 1-4) ---

    if config.permissions.write.iter().any(|p| p == "/") {
        issues.push(ValidationIssue::error("permissions.write includes '/'"));
    }
    for pattern in &config.permissions.write {
        if touches_system_dir(pattern) {
            issues.push(ValidationIssue::error(format!(
                "permissions.write touches protected system directory '{pattern}'"
            )));
        }
    }

    if config.permissions.run.iter().any(|c| c == "*") {
        issues.push(ValidationIssue::error("permissions.run contains the literal '*' wildcard"));
    }

    for (command, policy) in &config.external {
        let conflicting: Vec<&String> = policy
            .require_flags
            .iter()
            .filter(|f| policy.deny_flags.contains(f))
            .collect();
        for flag in conflicting {
            issues.push(ValidationIssue::error(format!(
                "external.{command}: flag '{flag}' is both required and denied"
            )));
        }
    }

    for pattern in &config.imports.blocked {
        if config.imports.trusted.contains(pattern) {
            issues.push(ValidationIssue::error(format!(
                "imports pattern '{pattern}' is both trusted and blocked"
            )));
        }
        if config.imports.allowed.contains(pattern) {
            issues.push(ValidationIssue::error(format!(
                "imports pattern '{pattern}' is both allowed and blocked"
            )));
        }
    }

    // --- warnings (spec §4.5) ---

    if config.permissions.read.iter().any(|p| p == "/" || is_sensitive_dir(p)) {
        issues.push(ValidationIssue::warning(
            "permissions.read includes '/' or a sensitive directory",
        ));
    }

    if config.permissions.net.is_allow_all() {
        issues.push(ValidationIssue::warning(
            "permissions.net allows all hosts; network egress is unrestricted",
        ));
    }

    if config.permissions.run.len() > 20 {
        issues.push(ValidationIssue::warning(format!(
            "permissions.run has {} entries (>20); consider narrowing the allow-list",
            config.permissions.run.len()
        )));
    }

    for (command, policy) in &config.external {
        let unrestricted = matches!(policy.allow, Some(CommandAllow::Any(true)) | None)
            && policy.deny_flags.is_empty()
            && policy.require_flags.is_empty();
        if unrestricted {
            issues.push(ValidationIssue::warning(format!(
                "external.{command} allows the command with no restrictions"
            )));
        }
    }

    if config.imports.blocked.is_empty() {
        issues.push(ValidationIssue::warning("imports.blocked is empty; no imports are blocked"));
    }

    if config.permissions.net.is_allow_all() && config.imports.blocked.iter().any(|p| p == "npm:*") {
        issues.push(ValidationIssue::warning(
            "permissions.net allows all hosts while npm:* imports remain blocked; \
             a fetched package can still exfiltrate over the network",
        ));
    }

    if config.permissions.write.contains(&"${CWD}".to_string()) && config.imports.blocked.is_empty() {
        issues.push(ValidationIssue::warning(
            "${CWD} is writable with no blocked imports; a written file could be imported unchecked",
        ));
    }

    if config.project_dir.is_none() {
        issues.push(ValidationIssue::warning("projectDir is not set"));
    }

    issues
}

pub fn has_errors(issues: &[ValidationIssue]) -> bool {
    issues.iter().any(|i| i.severity == Severity::Error)
}
