//! C4 — the `Config`/`CommandPolicy` data model, merge algebra, and
//! effective-permissions derivation.
//!
//! Field shapes mirror spec §3 exactly; this module owns the types that
//! `safesh-config` (loading), `safesh-policy` (admission), and
//! `safesh-runtime` (env building) all share.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::sensitive;

/// `permissions.net`: either allow-all, or a set of host patterns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NetPolicy {
    AllowAll(bool),
    Hosts(Vec<String>),
}

impl Default for NetPolicy {
    fn default() -> Self {
        NetPolicy::Hosts(Vec::new())
    }
}

impl NetPolicy {
    pub fn is_allow_all(&self) -> bool {
        matches!(self, NetPolicy::AllowAll(true))
    }
}

/// `permissions`: ordered allow/deny path sets, run allow-list, net policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Permissions {
    pub read: Vec<String>,
    pub deny_read: Vec<String>,
    pub write: Vec<String>,
    pub deny_write: Vec<String>,
    pub net: NetPolicy,
    pub run: Vec<String>,
    pub env: Vec<String>,
}

// `NetPolicy` is untagged so its `Default` must still satisfy `PartialEq`/Eq
// derive chains; the explicit impl above covers the non-derivable case.
impl Eq for NetPolicy {}

/// `env`: child-visible variable names and masking.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EnvPolicy {
    pub allow: Vec<String>,
    pub mask: Vec<String>,
    pub allow_read_all: bool,
}

/// `imports`: glob sets over module specifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportsPolicy {
    pub trusted: Vec<String>,
    pub allowed: Vec<String>,
    pub blocked: Vec<String>,
    /// Supplemented (SPEC_FULL §C): when true, any specifier in the C6 scan
    /// that is not a literal string is rejected outright rather than
    /// silently passed through. Off by default — matches spec.md's
    /// documented best-effort behavior.
    #[serde(default)]
    pub strict_dynamic: bool,
}

/// `external.<command>.allow`: either any subcommand, or an explicit allow-list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandAllow {
    Any(bool),
    Subcommands(Vec<String>),
}

/// `external.<command>.pathArgs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PathArgsPolicy {
    pub auto_detect: bool,
    pub positions: Vec<usize>,
    pub validate_sandbox: bool,
}

impl Default for PathArgsPolicy {
    fn default() -> Self {
        Self {
            auto_detect: true,
            positions: Vec::new(),
            validate_sandbox: true,
        }
    }
}

/// `external.<command>`: per-command admission rules.
///
/// `allow: None` means no restriction was declared at this layer — the
/// registry default of "unrestricted subcommands" applies. `Some(Any(true))`
/// or `Some(Subcommands(...))` are explicit declarations and override a
/// `None` from an earlier merge layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CommandPolicy {
    pub allow: Option<CommandAllow>,
    pub deny_flags: Vec<String>,
    pub require_flags: Vec<String>,
    pub path_args: PathArgsPolicy,
}

/// Preset base configs, seeded at load time (spec §3, §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    Strict,
    Standard,
    Permissive,
}

/// The root policy document (spec §3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub workspace: Option<String>,
    pub project_dir: Option<String>,
    pub allow_project_commands: bool,
    pub block_project_dir_write: bool,
    /// Defaults to `true`; spec: "unless config.includeHomeInDefaultRead == false".
    #[serde(default = "default_true")]
    pub include_home_in_default_read: bool,
    pub permissions: Permissions,
    pub external: BTreeMap<String, CommandPolicy>,
    pub env: EnvPolicy,
    pub imports: ImportsPolicy,
    pub tasks: BTreeMap<String, serde_json::Value>,
    pub timeout: Option<u64>,
    pub preset: Option<Preset>,
    /// Loader-only escape hatch (spec §4.5 "load fails unless skipValidation is set").
    #[serde(skip)]
    pub skip_validation: bool,
}

fn default_true() -> bool {
    true
}

impl Config {
    /// The identity element of [`merge_configs`] (P4).
    pub fn empty() -> Self {
        Self {
            include_home_in_default_read: true,
            ..Default::default()
        }
    }
}

/// Insertion-order-preserving set union (spec "unionArrays"), deduplicated
/// by string identity (data-model invariant 5).
pub fn union_arrays(a: &[String], b: &[String]) -> Vec<String> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    for item in a.iter().chain(b.iter()) {
        if !out.contains(item) {
            out.push(item.clone());
        }
    }
    out
}

fn merge_net(a: &NetPolicy, b: &NetPolicy) -> NetPolicy {
    if a.is_allow_all() || b.is_allow_all() {
        return NetPolicy::AllowAll(true);
    }
    let empty = Vec::new();
    let ah = match a {
        NetPolicy::Hosts(h) => h,
        NetPolicy::AllowAll(_) => &empty,
    };
    let bh = match b {
        NetPolicy::Hosts(h) => h,
        NetPolicy::AllowAll(_) => &empty,
    };
    NetPolicy::Hosts(union_arrays(ah, bh))
}

/// Merge two [`CommandPolicy`] layers: `b` is the override. `allow`,
/// `require_flags`, and `path_args` are override-wins (only replaced when
/// `b` actually declares them); `deny_flags` unions.
pub fn merge_command_policy(a: &CommandPolicy, b: &CommandPolicy) -> CommandPolicy {
    CommandPolicy {
        allow: b.allow.clone().or_else(|| a.allow.clone()),
        deny_flags: union_arrays(&a.deny_flags, &b.deny_flags),
        require_flags: if b.require_flags.is_empty() {
            a.require_flags.clone()
        } else {
            b.require_flags.clone()
        },
        path_args: b.path_args.clone(),
    }
}

/// `mergeConfigs(a, b)`: `b` (the override) wins on scalars; set-valued
/// fields union. **Not commutative** — `merge_configs(a, b) != merge_configs(b, a)`
/// in general, only associative (P3).
pub fn merge_configs(a: &Config, b: &Config) -> Config {
    let mut external = a.external.clone();
    for (name, policy) in &b.external {
        external
            .entry(name.clone())
            .and_modify(|existing| *existing = merge_command_policy(existing, policy))
            .or_insert_with(|| policy.clone());
    }

    let mut tasks = a.tasks.clone();
    for (name, def) in &b.tasks {
        tasks.insert(name.clone(), def.clone());
    }

    Config {
        workspace: b.workspace.clone().or_else(|| a.workspace.clone()),
        project_dir: b.project_dir.clone().or_else(|| a.project_dir.clone()),
        allow_project_commands: b.allow_project_commands || a.allow_project_commands,
        block_project_dir_write: b.block_project_dir_write || a.block_project_dir_write,
        include_home_in_default_read: b.include_home_in_default_read && a.include_home_in_default_read,
        permissions: Permissions {
            read: union_arrays(&a.permissions.read, &b.permissions.read),
            deny_read: union_arrays(&a.permissions.deny_read, &b.permissions.deny_read),
            write: union_arrays(&a.permissions.write, &b.permissions.write),
            deny_write: union_arrays(&a.permissions.deny_write, &b.permissions.deny_write),
            net: merge_net(&a.permissions.net, &b.permissions.net),
            run: union_arrays(&a.permissions.run, &b.permissions.run),
            env: union_arrays(&a.permissions.env, &b.permissions.env),
        },
        external,
        env: EnvPolicy {
            allow: union_arrays(&a.env.allow, &b.env.allow),
            mask: union_arrays(&a.env.mask, &b.env.mask),
            allow_read_all: b.env.allow_read_all || a.env.allow_read_all,
        },
        imports: ImportsPolicy {
            trusted: union_arrays(&a.imports.trusted, &b.imports.trusted),
            allowed: union_arrays(&a.imports.allowed, &b.imports.allowed),
            blocked: union_arrays(&a.imports.blocked, &b.imports.blocked),
            strict_dynamic: b.imports.strict_dynamic || a.imports.strict_dynamic,
        },
        tasks,
        timeout: b.timeout.or(a.timeout),
        preset: b.preset.or(a.preset),
        skip_validation: b.skip_validation || a.skip_validation,
    }
}

/// The allow/deny sets actually consulted at validation time (spec §4.4).
/// Patterns here may still contain `${VAR}`/`~` references — expansion
/// happens in `safesh_core::path` at check time, against a specific `cwd`.
#[derive(Debug, Clone, Default)]
pub struct EffectivePermissions {
    pub read: Vec<String>,
    pub deny_read: Vec<String>,
    pub write: Vec<String>,
    pub deny_write: Vec<String>,
}

/// Derive the effective allow/deny sets for `config`, per spec §4.4.
pub fn effective_permissions(config: &Config) -> EffectivePermissions {
    let mut read = config.permissions.read.clone();
    let mut deny_read = config.permissions.deny_read.clone();
    let mut write = config.permissions.write.clone();
    let mut deny_write = config.permissions.deny_write.clone();

    read.push("${CWD}".to_string());
    read.push("/tmp".to_string());
    write.push("/tmp".to_string());
    write.push("/dev/null".to_string());
    if config.include_home_in_default_read {
        read.push("${HOME}".to_string());
    }

    if let Some(project_dir) = &config.project_dir {
        read.push(project_dir.clone());
        if !config.block_project_dir_write {
            write.push(project_dir.clone());
        }
    }

    deny_read.extend(sensitive::SENSITIVE_READ_DENY.iter().map(|s| s.to_string()));
    deny_write.extend(sensitive::sensitive_write_deny());

    EffectivePermissions {
        read: dedup(read),
        deny_read: dedup(deny_read),
        write: dedup(write),
        deny_write: dedup(deny_write),
    }
}

fn dedup(items: Vec<String>) -> Vec<String> {
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}
