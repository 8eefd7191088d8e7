//! C7 — command registry: normalization and the built-in per-command
//! policies that apply regardless of what a config declares.
//!
//! Grounded in the teacher's `command_registry.rs`, narrowed from its full
//! skill-invocation registry down to the subcommand/flag restrictions this
//! spec names.

use std::path::Path;

use safesh_core::permissions::{CommandAllow, CommandPolicy, PathArgsPolicy};

/// Mandatory deny flags layered onto a command's `deny_flags`, in addition
/// to whatever the config itself declares. These never get weaker — the
/// merge algebra's `deny_flags` field is a union, so a config cannot remove
/// them, only add more.
const MANDATORY_DENY_FLAGS: &[(&str, &[&str])] = &[
    ("git", &["--force", "-f", "--hard"]),
    ("docker", &["--privileged", "--cap-add", "--security-opt"]),
    ("deno", &["--allow-all", "-A"]),
    ("curl", &["--upload-file", "-T"]),
];

/// Subcommands a registry entry restricts `allow` to, for the handful of
/// commands whose binary exposes both safe and dangerous subcommand
/// surfaces.
const RESTRICTED_SUBCOMMANDS: &[(&str, &[&str])] = &[
    ("docker", &["ps", "images", "logs", "inspect", "version"]),
    ("deno", &["run", "test", "fmt", "lint", "info"]),
];

/// Strip a leading path (`/usr/bin/git` -> `git`) so the registry and
/// `external` lookups key off the bare command name.
pub fn normalize_command(raw: &str) -> String {
    Path::new(raw)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| raw.to_string())
}

/// Mandatory deny flags for `command`, if the registry has any.
pub fn mandatory_deny_flags(command: &str) -> &'static [&'static str] {
    MANDATORY_DENY_FLAGS
        .iter()
        .find(|(name, _)| *name == command)
        .map(|(_, flags)| *flags)
        .unwrap_or(&[])
}

/// The registry's default [`CommandPolicy`] for `command`, before any
/// `config.external` layer is merged on top. Commands not named here still
/// get a policy — `external::resolve_policy` synthesizes
/// `{allow: None (unrestricted), pathArgs: {autoDetect: true, validateSandbox: true}}`
/// for anything whitelisted in `permissions.run` but absent from this table.
pub fn builtin_policy(command: &str) -> Option<CommandPolicy> {
    let deny_flags: Vec<String> = mandatory_deny_flags(command).iter().map(|s| s.to_string()).collect();
    if deny_flags.is_empty() && !RESTRICTED_SUBCOMMANDS.iter().any(|(name, _)| *name == command) {
        return None;
    }

    let allow = RESTRICTED_SUBCOMMANDS
        .iter()
        .find(|(name, _)| *name == command)
        .map(|(_, subs)| CommandAllow::Subcommands(subs.iter().map(|s| s.to_string()).collect()));

    Some(CommandPolicy {
        allow,
        deny_flags,
        require_flags: Vec::new(),
        path_args: PathArgsPolicy::default(),
    })
}
