//! C3 — path expansion, resolution, and sandbox containment checks.
//!
//! `validate_path` is the single gate every filesystem-touching operation
//! must pass through; it is applied unconditionally, even when a config
//! declares no permissions at all (data-model invariant: containment is not
//! opt-in).

use std::path::{Component, Path, PathBuf};

use crate::error::SafeShellError;
use crate::pattern::pattern_matches;
use crate::permissions::EffectivePermissions;

/// Expand `${CWD}`/`$CWD`, `${HOME}`/`$HOME`, `${WORKSPACE}`/`$WORKSPACE`,
/// and a leading `~/` in `pattern`. A variable with no value (no home
/// directory, no workspace configured) substitutes to the empty string
/// rather than being left unexpanded.
pub fn expand_path(pattern: &str, cwd: &Path, workspace: Option<&Path>) -> String {
    let home = dirs::home_dir()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_default();
    let cwd_s = cwd.to_string_lossy().into_owned();
    let workspace_s = workspace
        .map(|w| w.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut expanded = pattern
        .replace("${CWD}", &cwd_s)
        .replace("${HOME}", &home)
        .replace("${WORKSPACE}", &workspace_s)
        .replace("$CWD", &cwd_s)
        .replace("$HOME", &home)
        .replace("$WORKSPACE", &workspace_s);

    if let Some(rest) = expanded.strip_prefix('~') {
        if rest.is_empty() || rest.starts_with('/') {
            expanded = format!("{home}{rest}");
        }
    }
    expanded
}

/// Lexically normalize a path: resolve `.`/`..` components without touching
/// the filesystem.
fn normalize_lexical(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Expand and resolve `raw` to an absolute, lexically-normalized path
/// against `cwd`. Does not touch the filesystem.
pub fn resolve_absolute(raw: &str, cwd: &Path, workspace: Option<&Path>) -> PathBuf {
    let expanded = expand_path(raw, cwd, workspace);
    let candidate = PathBuf::from(expanded);
    let absolute = if candidate.is_absolute() {
        candidate
    } else {
        cwd.join(candidate)
    };
    normalize_lexical(&absolute)
}

/// Resolve `path`'s real, symlink-free location. If `path` doesn't exist,
/// the absolute path is returned unchanged (so not-yet-created write
/// targets can still be admitted).
pub fn resolve_real(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// True iff `path == parent`, or `path` begins with `parent` component-wise.
pub fn is_within(path: &Path, parent: &Path) -> bool {
    path.starts_with(parent)
}

/// True iff `path` matches `pattern` once the pattern is expanded: either a
/// directory-prefix containment check, or a glob match for patterns that
/// carry a wildcard.
fn path_matches_pattern(path: &Path, pattern: &str, cwd: &Path, workspace: Option<&Path>) -> bool {
    let expanded = expand_path(pattern, cwd, workspace);
    if expanded.contains('*') {
        return pattern_matches(&expanded, &path.to_string_lossy());
    }
    let root = resolve_absolute(&expanded, cwd, workspace);
    is_within(path, &root)
}

/// True iff `path` is covered by `allow` and not overridden by `deny` —
/// deny is checked first and always wins.
pub fn is_path_allowed(
    path: &Path,
    allow: &[String],
    deny: &[String],
    cwd: &Path,
    workspace: Option<&Path>,
) -> bool {
    if deny.iter().any(|p| path_matches_pattern(path, p, cwd, workspace)) {
        return false;
    }
    allow.iter().any(|p| path_matches_pattern(path, p, cwd, workspace))
}

/// The full C3 gate. Resolves `raw` to its real, symlink-free location and
/// checks *that* location against the effective allow/deny sets — the
/// error code depends only on whether a symlink was involved, not on a
/// separate pre-check of the unresolved path.
///
/// The workspace fast-path never bypasses an explicit deny: a sensitive
/// path (e.g. `~/.ssh`) sitting inside a broad workspace root must still be
/// rejected, so the deny set is checked before the workspace admits.
pub fn validate_path(
    raw: &str,
    perms: &EffectivePermissions,
    cwd: &Path,
    workspace: Option<&Path>,
    write: bool,
) -> Result<PathBuf, SafeShellError> {
    let requested = resolve_absolute(raw, cwd, workspace);
    let real = resolve_real(&requested);
    let via_symlink = real != requested;

    let (allow, deny) = if write {
        (&perms.write, &perms.deny_write)
    } else {
        (&perms.read, &perms.deny_read)
    };

    let denied = deny.iter().any(|p| path_matches_pattern(&real, p, cwd, workspace));

    if !denied {
        if let Some(ws) = workspace {
            if is_within(&real, ws) {
                return Ok(real);
            }
        }

        if is_path_allowed(&real, allow, deny, cwd, workspace) {
            return Ok(real);
        }
    }

    if via_symlink {
        Err(SafeShellError::symlink_violation(
            &requested.to_string_lossy(),
            &real.to_string_lossy(),
            allow,
        ))
    } else {
        Err(SafeShellError::path_violation(&requested.to_string_lossy(), allow))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::EffectivePermissions;
    use tempfile::tempdir;

    fn perms(read: &[&str], write: &[&str]) -> EffectivePermissions {
        EffectivePermissions {
            read: read.iter().map(|s| s.to_string()).collect(),
            deny_read: Vec::new(),
            write: write.iter().map(|s| s.to_string()).collect(),
            deny_write: Vec::new(),
        }
    }

    #[test]
    fn expand_path_substitutes_cwd_and_bare_form() {
        let cwd = Path::new("/home/user/project");
        assert_eq!(expand_path("${CWD}/src", cwd, None), "/home/user/project/src");
        assert_eq!(expand_path("$CWD/src", cwd, None), "/home/user/project/src");
    }

    #[test]
    fn expand_path_substitutes_workspace() {
        let cwd = Path::new("/home/user/project");
        let ws = Path::new("/ws");
        assert_eq!(expand_path("${WORKSPACE}/out", cwd, Some(ws)), "/ws/out");
    }

    #[test]
    fn resolve_absolute_normalizes_dotdot() {
        let cwd = Path::new("/a/b");
        let resolved = resolve_absolute("../c", cwd, None);
        assert_eq!(resolved, PathBuf::from("/a/c"));
    }

    #[test]
    fn scenario1_read_inside_sandbox() {
        let dir = tempdir().unwrap();
        let cwd = dir.path();
        std::fs::write(cwd.join("a.txt"), b"hi").unwrap();
        let p = perms(&[&cwd.to_string_lossy()], &[]);
        let result = validate_path("a.txt", &p, cwd, None, false).unwrap();
        assert_eq!(result, cwd.join("a.txt"));
    }

    #[test]
    fn validate_path_rejects_outside_declared_sets() {
        let dir = tempdir().unwrap();
        let cwd = dir.path();
        let p = perms(&[], &[]);
        let err = validate_path("/etc/passwd", &p, cwd, None, false).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::PathViolation);
    }

    #[test]
    fn scenario2_symlink_escape() {
        let allowed_dir = tempdir().unwrap();
        let outside_dir = tempdir().unwrap();
        let secret = outside_dir.path().join("passwd");
        std::fs::write(&secret, b"root:x:0:0").unwrap();

        let link = allowed_dir.path().join("link");
        #[cfg(unix)]
        std::os::unix::fs::symlink(&secret, &link).unwrap();

        let p = perms(&[&allowed_dir.path().to_string_lossy()], &[]);
        let err = validate_path(&link.to_string_lossy(), &p, allowed_dir.path(), None, false)
            .unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::SymlinkViolation);
        assert_eq!(
            err.details.real_path.as_deref(),
            Some(secret.canonicalize().unwrap().to_string_lossy().into_owned().as_str())
        );
    }

    #[test]
    fn workspace_is_a_fast_path_admit() {
        let dir = tempdir().unwrap();
        let p = perms(&[], &[]);
        let result = validate_path("inside.txt", &p, dir.path(), Some(dir.path()), false);
        assert!(result.is_ok());
    }

    #[test]
    fn deny_overrides_allow() {
        let dir = tempdir().unwrap();
        let cwd = dir.path();
        let p = EffectivePermissions {
            read: vec![cwd.to_string_lossy().to_string()],
            deny_read: vec![format!("{}/secret", cwd.to_string_lossy())],
            write: Vec::new(),
            deny_write: Vec::new(),
        };
        let err = validate_path("secret/file.txt", &p, cwd, None, false).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::PathViolation);
    }

    #[test]
    fn deny_overrides_workspace_fast_path() {
        let dir = tempdir().unwrap();
        let p = EffectivePermissions {
            read: Vec::new(),
            deny_read: vec![format!("{}/secret", dir.path().to_string_lossy())],
            write: Vec::new(),
            deny_write: Vec::new(),
        };
        let err = validate_path("secret/id_rsa", &p, dir.path(), Some(dir.path()), false)
            .unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::PathViolation);
    }
}
