//! C8 — external command admission: the sequence every `run`/`exec`
//! invocation passes through before a process is ever spawned.
//!
//! Grounded in the teacher's `sandbox/bash_validator.rs`: normalize, check
//! whitelisting, resolve per-command policy, validate subcommand, expand
//! grouped short flags, check deny/require flags, then validate any
//! argument that looks like a path.

use std::path::Path;

use safesh_core::permissions::{
    merge_command_policy, CommandAllow, CommandPolicy, Config, PathArgsPolicy,
};
use safesh_core::{path, permissions, SafeShellError};

use crate::commands::{self, mandatory_deny_flags, normalize_command};

/// Known path-carrying flags: either `--flag=VALUE` or the next non-flag
/// token is the path.
const PATH_FLAGS: &[&str] = &[
    "-o", "-i", "-f", "-d", "-C", "-p", "--output", "--input", "--file", "--directory", "--chdir",
    "--path",
];

/// Expand POSIX grouped short flags (`-abc` -> `-a -b -c`) so deny/require
/// checks operate one flag at a time. Long flags (`--foo`) and anything
/// that doesn't start with exactly one `-` pass through unchanged.
fn expand_flags(args: &[String]) -> Vec<String> {
    let mut out = Vec::with_capacity(args.len());
    for arg in args {
        let is_grouped_short = arg.starts_with('-')
            && !arg.starts_with("--")
            && arg.len() > 2
            && arg[1..].chars().all(|c| c.is_ascii_alphabetic());
        if is_grouped_short {
            for c in arg[1..].chars() {
                out.push(format!("-{c}"));
            }
        } else {
            out.push(arg.clone());
        }
    }
    out
}

fn is_flag(arg: &str) -> bool {
    arg.starts_with('-') && arg.len() > 1
}

/// Split `--foo=bar` into its flag name (`--foo`) and value (`bar`). Flags
/// without a carried value return `None` for the value half.
fn flag_name_and_value(arg: &str) -> (&str, Option<&str>) {
    if is_flag(arg) {
        if let Some((name, value)) = arg.split_once('=') {
            return (name, Some(value));
        }
    }
    (arg, None)
}

fn flags_eq(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// Auto-detect heuristic: a bare token that starts with an unambiguous
/// filesystem prefix.
fn looks_like_path(arg: &str) -> bool {
    !is_flag(arg)
        && (arg.starts_with('/') || arg.starts_with("./") || arg.starts_with("../") || arg.starts_with("~/"))
}

/// Extract path-looking arguments per `policy.path_args`: explicit
/// positions always win; otherwise auto-detect bare path-shaped tokens and
/// the values carried by known path-carrying flags.
fn path_like_args<'a>(args: &'a [String], policy: &CommandPolicy) -> Vec<&'a str> {
    if !policy.path_args.positions.is_empty() {
        return policy
            .path_args
            .positions
            .iter()
            .filter_map(|&i| args.get(i).map(|s| s.as_str()))
            .collect();
    }
    if !policy.path_args.auto_detect {
        return Vec::new();
    }

    let mut out = Vec::new();
    let mut i = 0;
    while i < args.len() {
        let arg = args[i].as_str();
        let (name, inline_value) = flag_name_and_value(arg);
        let is_path_flag = PATH_FLAGS.iter().any(|f| flags_eq(f, name));

        if is_path_flag {
            if let Some(value) = inline_value {
                out.push(value);
            } else if let Some(next) = args.get(i + 1) {
                if !is_flag(next) {
                    out.push(next.as_str());
                    i += 1;
                }
            }
        } else if looks_like_path(arg) {
            out.push(arg);
        }
        i += 1;
    }
    out
}

/// Resolve `command`'s effective policy: the registry default merged with
/// whatever `config.external` declares on top. When `via_project` is true
/// (the command was admitted solely via `allowProjectCommands`, not
/// `permissions.run`), the registry and `config.external` are bypassed
/// entirely in favor of the permissive synthetic policy a project-local
/// binary gets — a project tool named `git` or `docker` does not inherit
/// that registry entry's restrictions.
fn resolve_policy(normalized: &str, config: &Config, via_project: bool) -> CommandPolicy {
    if via_project {
        return synthetic_project_policy();
    }
    let registry = commands::builtin_policy(normalized).unwrap_or_default();
    match config.external.get(normalized) {
        Some(user) => merge_command_policy(&registry, user),
        None => registry,
    }
}

/// The permissive policy granted to a command admitted only via
/// `allowProjectCommands`: any subcommand, no extra flag restrictions,
/// path arguments still auto-detected and sandbox-checked.
fn synthetic_project_policy() -> CommandPolicy {
    CommandPolicy {
        allow: Some(CommandAllow::Any(true)),
        deny_flags: Vec::new(),
        require_flags: Vec::new(),
        path_args: PathArgsPolicy {
            auto_detect: true,
            positions: Vec::new(),
            validate_sandbox: true,
        },
    }
}

/// Validate a full external-command invocation: `command` is the program
/// name (as typed, possibly path-qualified), `args` its argument vector.
/// Every call is recorded to the audit log (admitted or the rejection
/// code), regardless of outcome.
pub fn validate_external(
    command: &str,
    args: &[String],
    config: &Config,
    cwd: &Path,
) -> Result<(), SafeShellError> {
    let result = validate_external_inner(command, args, config, cwd);
    match &result {
        Ok(()) => safesh_core::audit::admission_decision(command, true, None),
        Err(err) => {
            safesh_core::audit::admission_decision(command, false, Some(&err.code.to_string()))
        }
    }
    result
}

fn validate_external_inner(
    command: &str,
    args: &[String],
    config: &Config,
    cwd: &Path,
) -> Result<(), SafeShellError> {
    // 1. normalize
    let normalized = normalize_command(command);

    // 2. whitelisting: permissions.run, or allowProjectCommands + projectDir.
    let via_run = config.permissions.run.contains(&normalized);
    let via_project = !via_run
        && config.allow_project_commands
        && config
            .project_dir
            .as_ref()
            .map(|dir| Path::new(command).starts_with(dir))
            .unwrap_or(false);
    if !via_run && !via_project {
        return Err(SafeShellError::command_not_whitelisted(&normalized));
    }

    // 3. resolve per-command policy: registry default merged with the
    // user's config.external entry, if any — or the synthetic permissive
    // policy if admission came solely from allowProjectCommands.
    let policy = resolve_policy(&normalized, config, via_project);

    // 4. subcommand check, only when `allow` is an explicit subcommand array.
    if let Some(CommandAllow::Subcommands(allowed)) = &policy.allow {
        let subcommand = args.iter().find(|a| !is_flag(a));
        match subcommand {
            Some(sub) if allowed.iter().any(|a| a == sub) => {}
            Some(sub) => {
                return Err(SafeShellError::subcommand_not_allowed(&normalized, sub, allowed));
            }
            None => {
                return Err(SafeShellError::subcommand_not_allowed(&normalized, "", allowed));
            }
        }
    }

    // 5. expand grouped short flags.
    let expanded = expand_flags(args);

    // 6. deny flags: config-declared plus the registry's mandatory set,
    // compared by name only (value half of `--foo=bar` ignored) and
    // case-insensitively. The synthetic project-command policy has no
    // mandatory set — it replaces the registry, not layers on top of it.
    let mandatory: &[&str] = if via_project {
        &[]
    } else {
        mandatory_deny_flags(&normalized)
    };
    for raw_flag in &expanded {
        let (name, _) = flag_name_and_value(raw_flag);
        let denied = policy.deny_flags.iter().any(|d| flags_eq(d, name))
            || mandatory.iter().any(|d| flags_eq(d, name));
        if denied {
            return Err(SafeShellError::flag_not_allowed(&normalized, name, true));
        }
    }

    // 7. require flags: every declared required flag must be present.
    for required in &policy.require_flags {
        let present = expanded
            .iter()
            .any(|f| flags_eq(flag_name_and_value(f).0, required));
        if !present {
            return Err(SafeShellError::flag_not_allowed(&normalized, required, false));
        }
    }

    // 8. path-looking arguments still have to clear C3 containment.
    let effective = permissions::effective_permissions(config);
    let workspace = config.workspace.as_ref().map(|w| path::resolve_absolute(w, cwd, None));
    for candidate in path_like_args(args, &policy) {
        path::validate_path(candidate, &effective, cwd, workspace.as_deref(), false)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use safesh_core::permissions::{CommandAllow, PathArgsPolicy};
    use tempfile::tempdir;

    fn args(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn rejects_command_not_in_run_list() {
        let config = Config::empty();
        let dir = tempdir().unwrap();
        let err = validate_external("git", &args(&["status"]), &config, dir.path()).unwrap_err();
        assert_eq!(err.code, safesh_core::ErrorCode::CommandNotWhitelisted);
    }

    #[test]
    fn enforces_subcommand_allow_list() {
        let mut config = Config::empty();
        config.permissions.run.push("git".into());
        config.external.insert(
            "git".into(),
            CommandPolicy {
                allow: Some(CommandAllow::Subcommands(vec!["status".into()])),
                ..Default::default()
            },
        );
        let dir = tempdir().unwrap();

        assert!(validate_external("git", &args(&["status"]), &config, dir.path()).is_ok());
        let err = validate_external("git", &args(&["push"]), &config, dir.path()).unwrap_err();
        assert_eq!(err.code, safesh_core::ErrorCode::SubcommandNotAllowed);
    }

    #[test]
    fn registry_default_leaves_unlisted_command_unrestricted_by_subcommand() {
        let mut config = Config::empty();
        config.permissions.run.push("ls".into());
        let dir = tempdir().unwrap();
        assert!(validate_external("ls", &args(&["-la", "/tmp"]), &config, dir.path()).is_ok());
    }

    #[test]
    fn docker_registry_restricts_subcommands_even_without_user_config() {
        let mut config = Config::empty();
        config.permissions.run.push("docker".into());
        let dir = tempdir().unwrap();
        assert!(validate_external("docker", &args(&["ps"]), &config, dir.path()).is_ok());
        let err = validate_external("docker", &args(&["run", "x"]), &config, dir.path()).unwrap_err();
        assert_eq!(err.code, safesh_core::ErrorCode::SubcommandNotAllowed);
    }

    #[test]
    fn mandatory_deny_flags_cannot_be_overridden() {
        let mut config = Config::empty();
        config.permissions.run.push("git".into());
        let dir = tempdir().unwrap();
        let err = validate_external("git", &args(&["push", "--force"]), &config, dir.path())
            .unwrap_err();
        assert_eq!(err.code, safesh_core::ErrorCode::FlagNotAllowed);
    }

    #[test]
    fn docker_registry_denies_privileged_and_cap_add() {
        let mut config = Config::empty();
        config.permissions.run.push("docker".into());
        let dir = tempdir().unwrap();
        let err = validate_external("docker", &args(&["ps", "--privileged"]), &config, dir.path())
            .unwrap_err();
        assert_eq!(err.code, safesh_core::ErrorCode::FlagNotAllowed);
    }

    #[test]
    fn grouped_short_flags_are_expanded_before_deny_check() {
        let mut config = Config::empty();
        config.permissions.run.push("rm".into());
        config.external.insert(
            "rm".into(),
            CommandPolicy {
                deny_flags: vec!["-f".into()],
                ..Default::default()
            },
        );
        let dir = tempdir().unwrap();
        let err = validate_external("rm", &args(&["-rf", "build/"]), &config, dir.path())
            .unwrap_err();
        assert_eq!(err.code, safesh_core::ErrorCode::FlagNotAllowed);
    }

    #[test]
    fn deny_flag_comparison_is_case_insensitive() {
        let mut config = Config::empty();
        config.permissions.run.push("rm".into());
        config.external.insert(
            "rm".into(),
            CommandPolicy {
                deny_flags: vec!["--Force".into()],
                ..Default::default()
            },
        );
        let dir = tempdir().unwrap();
        let err = validate_external("rm", &args(&["--force"]), &config, dir.path()).unwrap_err();
        assert_eq!(err.code, safesh_core::ErrorCode::FlagNotAllowed);
    }

    #[test]
    fn equals_form_flag_name_is_checked_but_value_ignored_for_deny() {
        let mut config = Config::empty();
        config.permissions.run.push("eslint".into());
        config.external.insert(
            "eslint".into(),
            CommandPolicy {
                deny_flags: vec!["--rulesdir".into()],
                ..Default::default()
            },
        );
        let dir = tempdir().unwrap();
        let err = validate_external("eslint", &args(&["--rulesdir=/tmp/rules"]), &config, dir.path())
            .unwrap_err();
        assert_eq!(err.code, safesh_core::ErrorCode::FlagNotAllowed);
    }

    #[test]
    fn require_flags_missing_is_flag_not_allowed() {
        let mut config = Config::empty();
        config.permissions.run.push("curl".into());
        config.external.insert(
            "curl".into(),
            CommandPolicy {
                require_flags: vec!["--fail".into()],
                ..Default::default()
            },
        );
        let dir = tempdir().unwrap();
        let err = validate_external("curl", &args(&["https://example.com"]), &config, dir.path())
            .unwrap_err();
        assert_eq!(err.code, safesh_core::ErrorCode::FlagNotAllowed);
    }

    #[test]
    fn path_like_argument_outside_sandbox_is_rejected() {
        let mut config = Config::empty();
        config.permissions.run.push("cat".into());
        let dir = tempdir().unwrap();
        let err = validate_external("cat", &args(&["/etc/passwd"]), &config, dir.path())
            .unwrap_err();
        assert_eq!(err.code, safesh_core::ErrorCode::PathViolation);
    }

    #[test]
    fn bare_relative_token_without_path_prefix_is_not_auto_detected() {
        let mut config = Config::empty();
        config.permissions.run.push("echo".into());
        let dir = tempdir().unwrap();
        // "hello" has no path prefix, so it's left alone rather than
        // spuriously checked against the sandbox.
        assert!(validate_external("echo", &args(&["hello"]), &config, dir.path()).is_ok());
    }

    #[test]
    fn flag_path_heuristic_extracts_value_from_equals_form() {
        let mut config = Config::empty();
        config.permissions.run.push("build-tool".into());
        let dir = tempdir().unwrap();
        let err = validate_external(
            "build-tool",
            &args(&["--output=/etc/passwd"]),
            &config,
            dir.path(),
        )
        .unwrap_err();
        assert_eq!(err.code, safesh_core::ErrorCode::PathViolation);
    }

    #[test]
    fn flag_path_heuristic_extracts_next_token_value() {
        let mut config = Config::empty();
        config.permissions.run.push("build-tool".into());
        let dir = tempdir().unwrap();
        let err =
            validate_external("build-tool", &args(&["-o", "/etc/passwd"]), &config, dir.path())
                .unwrap_err();
        assert_eq!(err.code, safesh_core::ErrorCode::PathViolation);
    }

    #[test]
    fn project_local_binary_gets_synthetic_policy_bypassing_registry_restrictions() {
        let dir = tempdir().unwrap();
        let mut config = Config::empty();
        config.allow_project_commands = true;
        config.project_dir = Some(dir.path().to_string_lossy().into_owned());
        let project_git = dir.path().join("git");

        // Named "git" and living inside projectDir: without the synthetic
        // policy this would inherit the registry's --force deny and
        // subcommand restriction. With it, neither applies.
        assert!(validate_external(
            &project_git.to_string_lossy(),
            &args(&["push", "--force"]),
            &config,
            dir.path(),
        )
        .is_ok());
    }

    #[test]
    fn command_in_run_list_still_uses_registry_even_if_also_under_project_dir() {
        let dir = tempdir().unwrap();
        let mut config = Config::empty();
        config.allow_project_commands = true;
        config.project_dir = Some(dir.path().to_string_lossy().into_owned());
        config.permissions.run.push("git".into());
        let project_git = dir.path().join("git");

        let err = validate_external(
            &project_git.to_string_lossy(),
            &args(&["push", "--force"]),
            &config,
            dir.path(),
        )
        .unwrap_err();
        assert_eq!(err.code, safesh_core::ErrorCode::FlagNotAllowed);
    }

    #[test]
    fn path_args_positions_override_auto_detect() {
        let mut config = Config::empty();
        config.permissions.run.push("cp".into());
        config.external.insert(
            "cp".into(),
            CommandPolicy {
                path_args: PathArgsPolicy {
                    auto_detect: false,
                    positions: vec![0],
                    validate_sandbox: true,
                },
                ..Default::default()
            },
        );
        let dir = tempdir().unwrap();
        // position 0 ("a.txt") isn't path-shaped under auto-detect, but an
        // explicit position still picks it up and it resolves inside cwd.
        assert!(validate_external("cp", &args(&["a.txt", "b.txt"]), &config, dir.path()).is_ok());
    }
}
