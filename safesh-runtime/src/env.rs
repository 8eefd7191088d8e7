//! Child-process environment construction (part of C9).
//!
//! Grounded in the teacher's `env::builder`: the child never inherits the
//! host's environment wholesale. It starts from nothing, and only the
//! variables `EnvPolicy` admits are copied in; a name matching `mask` is
//! skipped entirely, the same as one absent from `allow` (P6: the built
//! map's key set is always a subset of `allow` minus `mask`).

use std::collections::HashMap;

use safesh_core::pattern::{matches_any, matches_any_exact};
use safesh_core::permissions::EnvPolicy;

/// Build the full environment map a child process should see, starting
/// from a clean slate.
pub fn build_env(policy: &EnvPolicy) -> HashMap<String, String> {
    build_env_from(std::env::vars().collect(), policy)
}

/// Same as [`build_env`] but over an explicit source map, so tests don't
/// depend on the running process's actual environment.
pub fn build_env_from(
    source: HashMap<String, String>,
    policy: &EnvPolicy,
) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for (name, value) in source {
        if !policy.allow_read_all && !matches_any_exact(&policy.allow, &name) {
            continue;
        }
        if matches_any(&policy.mask, &name) {
            continue;
        }
        out.insert(name, value);
    }
    out
}

/// Overlay `extra` onto an already-built environment, applying the same
/// mask rule — used for the shell-local and `options.env` overlay steps in
/// `buildEnv`'s three-layer construction.
pub fn overlay_env(base: &mut HashMap<String, String>, extra: &HashMap<String, String>, policy: &EnvPolicy) {
    for (name, value) in extra {
        if matches_any(&policy.mask, name) {
            continue;
        }
        base.insert(name.clone(), value.clone());
    }
}
