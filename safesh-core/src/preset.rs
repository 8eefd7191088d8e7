//! Preset base configs (spec §3, §4.5): a starting point a loaded config is
//! merged on top of, selected via `Config.preset` or the loader's default.
//!
//! Grounded in the teacher's `security::policy` default-rule tables and
//! `config::schema` preset handling, narrowed to the three tiers spec.md
//! names.

use std::collections::BTreeMap;

use crate::permissions::{
    CommandAllow, CommandPolicy, Config, EnvPolicy, ImportsPolicy, NetPolicy, PathArgsPolicy,
    Permissions, Preset,
};

/// Read-only POSIX/dev-tooling commands considered safe with no further
/// review: inspecting files, process state, and version-control history
/// without mutating anything.
const STANDARD_READONLY_COMMANDS: &[&str] = &[
    "ls", "cat", "less", "more", "head", "tail", "wc", "grep", "egrep", "fgrep", "rg", "find",
    "fd", "sort", "uniq", "cut", "tr", "column", "tac", "nl", "od", "xxd", "hexdump", "file",
    "stat", "du", "df", "tree", "pwd", "echo", "printf", "which", "whereis", "type", "env",
    "printenv", "date", "cal", "uname", "hostname", "whoami", "id", "groups", "uptime", "ps",
    "top", "free", "vmstat", "iostat", "lsof", "jobs", "ulimit", "locale", "man", "help",
    "diff", "cmp", "comm", "md5sum", "sha1sum", "sha256sum", "sha512sum", "base64", "jq",
    "yq", "xmllint", "git", "hg", "svn", "node", "python3", "python", "ruby", "perl", "go",
    "cargo", "rustc", "tsc", "eslint", "prettier", "pytest", "npm", "pnpm", "yarn", "make",
    "cmake", "ninja", "tar", "gzip", "gunzip", "zcat", "unzip", "zip", "curl", "wget", "ping",
    "dig", "nslookup", "traceroute", "ssh-add", "gpg", "openssl",
];

fn union_owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Read-only subcommands for version control and package managers whose
/// binaries also expose mutating subcommands — `external` narrows them.
fn standard_external() -> BTreeMap<String, CommandPolicy> {
    let mut m = BTreeMap::new();
    m.insert(
        "git".to_string(),
        CommandPolicy {
            allow: Some(CommandAllow::Subcommands(union_owned(&[
                "status", "log", "diff", "show", "branch", "remote", "config", "blame",
                "ls-files", "rev-parse", "describe",
            ]))),
            deny_flags: union_owned(&["--force", "-f"]),
            require_flags: Vec::new(),
            path_args: PathArgsPolicy::default(),
        },
    );
    m.insert(
        "npm".to_string(),
        CommandPolicy {
            allow: Some(CommandAllow::Subcommands(union_owned(&["ls", "view", "outdated", "audit"]))),
            deny_flags: Vec::new(),
            require_flags: Vec::new(),
            path_args: PathArgsPolicy::default(),
        },
    );
    m.insert(
        "docker".to_string(),
        CommandPolicy {
            allow: Some(CommandAllow::Subcommands(union_owned(&["ps", "images", "logs", "inspect"]))),
            deny_flags: Vec::new(),
            require_flags: Vec::new(),
            path_args: PathArgsPolicy::default(),
        },
    );
    m
}

/// The baseline tier: a broad but read-biased command set, no network
/// access by default, and the standard blocked-import patterns.
pub fn standard() -> Config {
    Config {
        include_home_in_default_read: true,
        permissions: Permissions {
            run: union_owned(STANDARD_READONLY_COMMANDS),
            net: NetPolicy::Hosts(Vec::new()),
            read: union_owned(&["${CWD}", "/tmp", "${HOME}", "${HOME}/.claude"]),
            write: union_owned(&["/tmp", "/dev/null", "${HOME}/.claude"]),
            ..Default::default()
        },
        external: standard_external(),
        env: EnvPolicy {
            allow: union_owned(&["PATH", "HOME", "LANG", "LC_ALL", "TERM", "TZ"]),
            mask: union_owned(&["*_KEY", "*_SECRET", "*_TOKEN", "*_PASSWORD"]),
            allow_read_all: false,
        },
        imports: ImportsPolicy {
            trusted: Vec::new(),
            allowed: Vec::new(),
            blocked: union_owned(&["npm:*", "http:*", "https:*"]),
            strict_dynamic: false,
        },
        timeout: Some(30_000),
        preset: Some(Preset::Standard),
        ..Config::empty()
    }
}

/// A narrower tier: only the handful of commands needed to inspect a
/// project without touching version control, packages, or containers.
pub fn strict() -> Config {
    Config {
        include_home_in_default_read: false,
        permissions: Permissions {
            run: union_owned(&[
                "ls", "cat", "head", "tail", "wc", "grep", "find", "pwd", "echo", "file", "stat",
                "diff", "date", "whoami",
            ]),
            net: NetPolicy::Hosts(Vec::new()),
            ..Default::default()
        },
        external: BTreeMap::new(),
        env: EnvPolicy {
            allow: union_owned(&["PATH", "LANG", "TERM"]),
            mask: union_owned(&["*_KEY", "*_SECRET", "*_TOKEN", "*_PASSWORD", "*"]),
            allow_read_all: false,
        },
        imports: ImportsPolicy {
            trusted: Vec::new(),
            allowed: Vec::new(),
            blocked: union_owned(&["*"]),
            strict_dynamic: true,
        },
        timeout: Some(10_000),
        preset: Some(Preset::Strict),
        ..Config::empty()
    }
}

/// A looser tier for trusted, locally-run agents: everything `standard`
/// grants, plus unrestricted `net`, full env visibility, and no import
/// blocks. Still goes through C3 path containment — `permissive` relaxes
/// what is admitted, not whether paths are checked at all.
pub fn permissive() -> Config {
    let mut config = standard();
    config.permissions.net = NetPolicy::AllowAll(true);
    config.env.allow_read_all = true;
    config.env.mask = Vec::new();
    config.imports.blocked = Vec::new();
    config.timeout = Some(120_000);
    config.preset = Some(Preset::Permissive);
    config
}

/// Resolve a [`Preset`] to its base [`Config`].
pub fn base_config(preset: Preset) -> Config {
    match preset {
        Preset::Strict => strict(),
        Preset::Standard => standard(),
        Preset::Permissive => permissive(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_preset_has_no_wildcard_run() {
        let config = standard();
        assert!(!config.permissions.run.contains(&"*".to_string()));
        assert!(config.permissions.run.contains(&"git".to_string()));
    }

    #[test]
    fn strict_preset_blocks_all_imports() {
        let config = strict();
        assert_eq!(config.imports.blocked, vec!["*".to_string()]);
        assert!(config.imports.strict_dynamic);
    }

    #[test]
    fn permissive_preset_allows_all_net() {
        let config = permissive();
        assert!(config.permissions.net.is_allow_all());
    }

    #[test]
    fn standard_preset_grants_claude_dir_read_and_write() {
        let config = standard();
        assert!(config.permissions.read.contains(&"${HOME}/.claude".to_string()));
        assert!(config.permissions.write.contains(&"${HOME}/.claude".to_string()));
        assert!(config.permissions.write.contains(&"/dev/null".to_string()));
    }

    #[test]
    fn strict_is_subset_of_standard_run_commands() {
        let strict_cfg = strict();
        let standard_cfg = standard();
        for cmd in &strict_cfg.permissions.run {
            assert!(
                standard_cfg.permissions.run.contains(cmd),
                "strict command '{cmd}' missing from standard preset"
            );
        }
    }
}
