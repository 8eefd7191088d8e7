//! C1 — error taxonomy.
//!
//! Every failure the core produces is a [`SafeShellError`]: a stable `code`
//! a caller can match on, a human `message`, structured `details`, and a
//! `suggestion` for how to recover. Tests assert on `code`, never on
//! `message` text — the templates below are free to change wording.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable failure codes. Serializes as `SCREAMING_SNAKE_CASE` so a caller
/// (typically an LLM) can machine-parse `{code, message, details,
/// suggestion}` without string-matching on prose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    PermissionDenied,
    CommandNotWhitelisted,
    CommandNotAllowed,
    CommandNotFound,
    SubcommandNotAllowed,
    FlagNotAllowed,
    PathViolation,
    SymlinkViolation,
    Timeout,
    ExecutionError,
    ConfigError,
    ImportNotAllowed,
    NetworkBlocked,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| format!("{self:?}"));
        write!(f, "{s}")
    }
}

/// Structured, optional detail fields. Only the fields relevant to a given
/// error code are populated; the rest stay `None`/empty so serialization
/// stays compact.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subcommand: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "realPath")]
    pub real_path: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub allowed: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub denied: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub import: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

/// A structured, JSON-serializable SafeShell failure.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct SafeShellError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default)]
    pub details: ErrorDetails,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

pub type Result<T> = std::result::Result<T, SafeShellError>;

impl SafeShellError {
    fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: ErrorDetails::default(),
            suggestion: None,
        }
    }

    fn with_details(mut self, details: ErrorDetails) -> Self {
        self.details = details;
        self
    }

    fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PermissionDenied, message)
    }

    pub fn command_not_whitelisted(command: &str) -> Self {
        Self::new(
            ErrorCode::CommandNotWhitelisted,
            format!("command '{command}' is not whitelisted"),
        )
        .with_details(ErrorDetails {
            command: Some(command.to_string()),
            ..Default::default()
        })
        .with_suggestion(format!(
            "add '{command}' to permissions.run or external.{command} in the config, \
             or pass it with allowProjectCommands if its binary lives under projectDir"
        ))
    }

    pub fn command_not_allowed(command: &str) -> Self {
        Self::new(
            ErrorCode::CommandNotAllowed,
            format!("command '{command}' is registered but blocked by permissions.run"),
        )
        .with_details(ErrorDetails {
            command: Some(command.to_string()),
            ..Default::default()
        })
        .with_suggestion(format!("add '{command}' to permissions.run"))
    }

    pub fn command_not_found(command: &str) -> Self {
        Self::new(
            ErrorCode::CommandNotFound,
            format!("command '{command}' was not found on PATH or under projectDir"),
        )
        .with_details(ErrorDetails {
            command: Some(command.to_string()),
            ..Default::default()
        })
    }

    pub fn subcommand_not_allowed(command: &str, subcommand: &str, allowed: &[String]) -> Self {
        Self::new(
            ErrorCode::SubcommandNotAllowed,
            format!("subcommand '{subcommand}' of '{command}' is not allowed"),
        )
        .with_details(ErrorDetails {
            command: Some(command.to_string()),
            subcommand: Some(subcommand.to_string()),
            allowed: allowed.to_vec(),
            ..Default::default()
        })
        .with_suggestion(format!(
            "allowed subcommands for '{command}': {}",
            allowed.join(", ")
        ))
    }

    pub fn flag_not_allowed(command: &str, flag: &str, denied: bool) -> Self {
        let message = if denied {
            format!("flag '{flag}' is denied for command '{command}'")
        } else {
            format!("required flag '{flag}' is missing for command '{command}'")
        };
        Self::new(ErrorCode::FlagNotAllowed, message).with_details(ErrorDetails {
            command: Some(command.to_string()),
            flag: Some(flag.to_string()),
            ..Default::default()
        })
    }

    pub fn path_violation(path: &str, allowed: &[String]) -> Self {
        Self::new(
            ErrorCode::PathViolation,
            format!("path '{path}' is outside the sandbox"),
        )
        .with_details(ErrorDetails {
            path: Some(path.to_string()),
            allowed: allowed.to_vec(),
            ..Default::default()
        })
        .with_suggestion("add the path (or a containing directory) to the relevant permission set")
    }

    pub fn symlink_violation(requested: &str, real_path: &str, allowed: &[String]) -> Self {
        Self::new(
            ErrorCode::SymlinkViolation,
            format!("'{requested}' resolves (via symlink) to '{real_path}', which is outside the sandbox"),
        )
        .with_details(ErrorDetails {
            path: Some(requested.to_string()),
            real_path: Some(real_path.to_string()),
            allowed: allowed.to_vec(),
            ..Default::default()
        })
    }

    pub fn timeout(ms: u64) -> Self {
        Self::new(ErrorCode::Timeout, format!("execution exceeded {ms}ms deadline"))
    }

    pub fn execution_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ExecutionError, message)
    }

    pub fn config_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigError, message)
    }

    pub fn import_not_allowed(specifier: &str) -> Self {
        Self::new(
            ErrorCode::ImportNotAllowed,
            format!("import '{specifier}' is blocked"),
        )
        .with_details(ErrorDetails {
            import: Some(specifier.to_string()),
            ..Default::default()
        })
        .with_suggestion(format!(
            "add a matching pattern to imports.trusted or imports.allowed for '{specifier}'"
        ))
    }

    pub fn network_blocked(host: &str) -> Self {
        Self::new(ErrorCode::NetworkBlocked, format!("host '{host}' is not in permissions.net"))
            .with_details(ErrorDetails {
                host: Some(host.to_string()),
                ..Default::default()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_serializes_screaming_snake_case() {
        let v = serde_json::to_value(ErrorCode::CommandNotWhitelisted).unwrap();
        assert_eq!(v, "COMMAND_NOT_WHITELISTED");
    }

    #[test]
    fn error_round_trips_through_json() {
        let err = SafeShellError::path_violation("/etc/passwd", &["/tmp".into()]);
        let json = serde_json::to_string(&err).unwrap();
        let back: SafeShellError = serde_json::from_str(&json).unwrap();
        assert_eq!(back.code, ErrorCode::PathViolation);
        assert_eq!(back.details.path.as_deref(), Some("/etc/passwd"));
    }

    #[test]
    fn symlink_violation_carries_real_path() {
        let err = SafeShellError::symlink_violation("/t/link", "/etc/passwd", &["/t".into()]);
        assert_eq!(err.code, ErrorCode::SymlinkViolation);
        assert_eq!(err.details.real_path.as_deref(), Some("/etc/passwd"));
    }
}
