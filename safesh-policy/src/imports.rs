//! C6 — static import-specifier admission and the advisory source scanner.
//!
//! Grounded in the teacher's `security::scanner`/`security::rules` pairing:
//! a regex-based extractor finds specifier literals, and a separate
//! admission check decides whether each one is allowed. The scanner is
//! advisory — it runs ahead of execution and reports what it found, but a
//! caller decides whether a finding blocks anything.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use safesh_core::pattern::matches_any;
use safesh_core::permissions::ImportsPolicy;
use safesh_core::SafeShellError;

static STATIC_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:^|\n)\s*import\s+(?:[\w*\s{},]+\s+from\s+)?["']([^"']+)["']"#).unwrap()
});
static REQUIRE_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"require\(\s*["']([^"']+)["']\s*\)"#).unwrap());
static DYNAMIC_IMPORT_LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"import\(\s*["']([^"']+)["']\s*\)"#).unwrap());
static DYNAMIC_IMPORT_ANY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"import\(").unwrap());

/// One specifier found by [`scan_source`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportReference {
    pub specifier: Option<String>,
    pub dynamic: bool,
}

/// Extract every import/require specifier from `source`. Dynamic
/// `import(...)` calls whose argument isn't a string literal are reported
/// with `specifier: None, dynamic: true` — the scanner can see that a
/// dynamic import exists but not what it resolves to.
pub fn scan_source(source: &str) -> Vec<ImportReference> {
    let mut found = Vec::new();

    for caps in STATIC_IMPORT.captures_iter(source) {
        found.push(ImportReference {
            specifier: Some(caps[1].to_string()),
            dynamic: false,
        });
    }
    for caps in REQUIRE_CALL.captures_iter(source) {
        found.push(ImportReference {
            specifier: Some(caps[1].to_string()),
            dynamic: false,
        });
    }
    for caps in DYNAMIC_IMPORT_LITERAL.captures_iter(source) {
        found.push(ImportReference {
            specifier: Some(caps[1].to_string()),
            dynamic: true,
        });
    }
    let literal_dynamic_count = DYNAMIC_IMPORT_LITERAL.find_iter(source).count();
    if DYNAMIC_IMPORT_ANY.find_iter(source).count() > literal_dynamic_count {
        found.push(ImportReference {
            specifier: None,
            dynamic: true,
        });
    }

    found
}

/// Admit or reject a single specifier per `policy`.
///
/// Admission is blocklist-first: if `specifier` matches no `blocked`
/// pattern, it's admitted outright. Only once it *does* match a blocked
/// pattern do `trusted`/`allowed` get consulted — and either one, matching,
/// overrides the block. `trusted` and `allowed` are not independent
/// allow-list switches; they exist only to carve exceptions out of an
/// otherwise-blocked specifier.
pub fn admit_specifier(specifier: &str, policy: &ImportsPolicy) -> Result<(), SafeShellError> {
    if !matches_any(&policy.blocked, specifier) {
        return Ok(());
    }
    if matches_any(&policy.trusted, specifier) || matches_any(&policy.allowed, specifier) {
        return Ok(());
    }
    Err(SafeShellError::import_not_allowed(specifier))
}

/// Scan `source` and admit every specifier found, per `policy`. Returns
/// every violation rather than stopping at the first — an advisory
/// supplement for callers that want the full picture instead of the
/// first-violation-stops contract of [`validate_imports`].
pub fn scan_and_admit(source: &str, policy: &ImportsPolicy) -> Vec<SafeShellError> {
    let mut violations = Vec::new();
    for reference in scan_source(source) {
        match reference.specifier {
            Some(specifier) => {
                if let Err(err) = admit_specifier(&specifier, policy) {
                    violations.push(err);
                }
            }
            None if reference.dynamic => {
                if policy.strict_dynamic {
                    violations.push(SafeShellError::import_not_allowed("<dynamic>"));
                }
            }
            None => {}
        }
    }
    violations
}

/// Scan `source` and admit every specifier found, stopping at (and
/// returning) the first violation. This is the gate an actual load/execute
/// path should call; [`scan_and_admit`] is the advisory, collect-everything
/// variant for reporting tools.
pub fn validate_imports(source: &str, policy: &ImportsPolicy) -> Result<(), SafeShellError> {
    for reference in scan_source(source) {
        match reference.specifier {
            Some(specifier) => admit_specifier(&specifier, policy)?,
            None if reference.dynamic && policy.strict_dynamic => {
                return Err(SafeShellError::import_not_allowed("<dynamic>"));
            }
            None => {}
        }
    }
    Ok(())
}

/// A minimal module-resolution import map, written so a sandboxed runtime
/// resolving bare specifiers has a single artifact to consult instead of
/// re-deriving admission at resolve time.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportMap {
    pub imports: BTreeMap<String, String>,
    pub scopes: BTreeMap<String, BTreeMap<String, String>>,
}

/// Build an [`ImportMap`] admitting every specifier in `specifiers` that
/// passes `policy`, mapped to itself (SafeShell doesn't rewrite specifiers,
/// only admits or rejects them).
pub fn generate_import_map(specifiers: &[String], policy: &ImportsPolicy) -> ImportMap {
    let mut imports = BTreeMap::new();
    for specifier in specifiers {
        if admit_specifier(specifier, policy).is_ok() {
            imports.insert(specifier.clone(), specifier.clone());
        }
    }
    ImportMap {
        imports,
        scopes: BTreeMap::new(),
    }
}

/// Where [`write_import_map`] writes, relative to the system temp dir:
/// `<temp>/safesh/import-policy/import-map.json`.
pub fn import_map_path() -> PathBuf {
    std::env::temp_dir()
        .join("safesh")
        .join("import-policy")
        .join("import-map.json")
}

/// Serialize `map` to `<temp>/safesh/import-policy/import-map.json`,
/// creating parent directories as needed.
pub fn write_import_map(map: &ImportMap) -> Result<PathBuf, SafeShellError> {
    let path = import_map_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| SafeShellError::execution_error(format!("failed to create {}: {e}", parent.display())))?;
    }
    let json = serde_json::to_string_pretty(map)
        .map_err(|e| SafeShellError::execution_error(format!("failed to serialize import map: {e}")))?;
    std::fs::write(&path, json)
        .map_err(|e| SafeShellError::execution_error(format!("failed to write {}: {e}", path.display())))?;
    Ok(path)
}

/// Scan `source` for specifiers, generate the admitted subset's import map,
/// and write it to disk. Convenience wrapper over
/// [`scan_source`]/[`generate_import_map`]/[`write_import_map`].
pub fn scan_and_write_import_map(source: &str, policy: &ImportsPolicy) -> Result<PathBuf, SafeShellError> {
    let specifiers: Vec<String> = scan_source(source).into_iter().filter_map(|r| r.specifier).collect();
    let map = generate_import_map(&specifiers, policy);
    write_import_map(&map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use safesh_core::permissions::ImportsPolicy;

    fn policy(blocked: &[&str]) -> ImportsPolicy {
        ImportsPolicy {
            blocked: blocked.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn scans_static_import_and_require_specifiers() {
        let source = r#"
            import fs from "node:fs";
            const lodash = require("lodash");
        "#;
        let found = scan_source(source);
        let specifiers: Vec<_> = found.into_iter().filter_map(|r| r.specifier).collect();
        assert!(specifiers.contains(&"node:fs".to_string()));
        assert!(specifiers.contains(&"lodash".to_string()));
    }

    #[test]
    fn p8_blocked_npm_specifier_is_rejected() {
        let p = policy(&["npm:*"]);
        let err = admit_specifier("npm:left-pad", &p).unwrap_err();
        assert_eq!(err.code, safesh_core::ErrorCode::ImportNotAllowed);
    }

    #[test]
    fn unmatched_specifier_is_admitted_with_no_policy_at_all() {
        let p = ImportsPolicy::default();
        assert!(admit_specifier("node:fs", &p).is_ok());
    }

    #[test]
    fn trusted_overrides_blocked() {
        let p = ImportsPolicy {
            trusted: vec!["npm:lodash".into()],
            blocked: vec!["npm:*".into()],
            ..Default::default()
        };
        assert!(admit_specifier("npm:lodash", &p).is_ok());
    }

    #[test]
    fn allowed_overrides_blocked() {
        let p = ImportsPolicy {
            allowed: vec!["npm:lodash".into()],
            blocked: vec!["npm:*".into()],
            ..Default::default()
        };
        assert!(admit_specifier("npm:lodash", &p).is_ok());
    }

    #[test]
    fn allowed_and_trusted_do_not_gate_specifiers_that_were_never_blocked() {
        // allowed/trusted only carve exceptions out of a block — they are
        // not independent allow-list switches that reject everything else.
        let p = ImportsPolicy {
            allowed: vec!["safesh:*".into()],
            ..Default::default()
        };
        assert!(admit_specifier("npm:anything", &p).is_ok());
    }

    #[test]
    fn strict_dynamic_rejects_nonliteral_specifier() {
        let mut p = policy(&[]);
        p.strict_dynamic = true;
        let source = "const mod = await import(moduleName);";
        let violations = scan_and_admit(source, &p);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].code, safesh_core::ErrorCode::ImportNotAllowed);
    }

    #[test]
    fn non_strict_dynamic_is_silent_on_nonliteral_specifier() {
        let p = policy(&[]);
        let source = "const mod = await import(moduleName);";
        assert!(scan_and_admit(source, &p).is_empty());
    }

    #[test]
    fn validate_imports_stops_at_first_violation() {
        let p = policy(&["npm:*"]);
        let source = r#"
            const a = require("npm:a");
            const b = require("npm:b");
        "#;
        let err = validate_imports(source, &p).unwrap_err();
        assert_eq!(err.code, safesh_core::ErrorCode::ImportNotAllowed);
        assert_eq!(err.details.import.as_deref(), Some("npm:a"));
    }

    #[test]
    fn generate_import_map_admits_only_passing_specifiers() {
        let p = policy(&["npm:*"]);
        let specifiers = vec!["node:fs".to_string(), "npm:left-pad".to_string()];
        let map = generate_import_map(&specifiers, &p);
        assert!(map.imports.contains_key("node:fs"));
        assert!(!map.imports.contains_key("npm:left-pad"));
    }
}
