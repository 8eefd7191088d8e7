//! The compact `config.local.json` shape (spec §4.5): a narrow, easy-to-hand-edit
//! file carrying just an allow-list of extra commands, rather than the full
//! `Config` document the global/project layers use.

use serde::{Deserialize, Serialize};

use safesh_core::permissions::{CommandAllow, CommandPolicy, Config, Permissions};

/// One entry of `allowedCommands`: a bare name, a name pinned to a specific
/// binary path, or a name with its own subcommand/flag restrictions. Tried
/// in this order by `serde(untagged)` — the richer object forms have
/// fields the bare string can't parse as, so there's no ambiguity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LocalCommandEntry {
    Name(String),
    NamedPath {
        name: String,
        path: String,
    },
    Restricted {
        command: String,
        #[serde(default)]
        subcommands: Vec<String>,
        #[serde(default)]
        flags: Vec<String>,
    },
}

impl LocalCommandEntry {
    fn command_name(&self) -> &str {
        match self {
            LocalCommandEntry::Name(name) => name,
            LocalCommandEntry::NamedPath { name, .. } => name,
            LocalCommandEntry::Restricted { command, .. } => command,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LocalOverride {
    pub allowed_commands: Vec<LocalCommandEntry>,
}

impl LocalOverride {
    /// Expand into a full `Config` fragment so it can go through the same
    /// `merge_configs` pipeline as every other layer.
    ///
    /// `{name, path}` additionally grants read access to `path` — running a
    /// binary that lives outside the usual search path requires permission
    /// to read it. `{command, subcommands, flags}` narrows the command's
    /// `external` entry to the given subcommands and folds `flags` into its
    /// `denyFlags` (the merge algebra only unions deny flags, so this can
    /// only ever tighten a later-merged registry default, never loosen it).
    pub fn into_config(self) -> Config {
        let mut run = Vec::new();
        let mut read = Vec::new();
        let mut external = std::collections::BTreeMap::new();

        for entry in &self.allowed_commands {
            run.push(entry.command_name().to_string());
            match entry {
                LocalCommandEntry::Name(_) => {}
                LocalCommandEntry::NamedPath { path, .. } => read.push(path.clone()),
                LocalCommandEntry::Restricted {
                    command,
                    subcommands,
                    flags,
                } => {
                    external.insert(
                        command.clone(),
                        CommandPolicy {
                            allow: if subcommands.is_empty() {
                                None
                            } else {
                                Some(CommandAllow::Subcommands(subcommands.clone()))
                            },
                            deny_flags: flags.clone(),
                            ..Default::default()
                        },
                    );
                }
            }
        }

        Config {
            permissions: Permissions {
                run,
                read,
                ..Default::default()
            },
            external,
            ..Config::empty()
        }
    }
}

/// Render `commands` back into the compact local-override shape, for
/// `save_to_local_json`.
pub fn from_commands(commands: Vec<String>) -> LocalOverride {
    LocalOverride {
        allowed_commands: commands.into_iter().map(LocalCommandEntry::Name).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_override_round_trips_through_json() {
        let local = from_commands(vec!["jq".into(), "yq".into()]);
        let json = serde_json::to_string(&local).unwrap();
        let back: LocalOverride = serde_json::from_str(&json).unwrap();
        assert_eq!(
            back.allowed_commands,
            vec![
                LocalCommandEntry::Name("jq".into()),
                LocalCommandEntry::Name("yq".into()),
            ]
        );
    }

    #[test]
    fn local_override_expands_into_run_permissions() {
        let local = from_commands(vec!["jq".into()]);
        let config = local.into_config();
        assert_eq!(config.permissions.run, vec!["jq".to_string()]);
    }

    #[test]
    fn compact_named_path_form_parses_and_grants_read() {
        let json = r#"{"allowedCommands": [{"name": "my", "path": "/abs/path/my"}]}"#;
        let local: LocalOverride = serde_json::from_str(json).unwrap();
        assert_eq!(
            local.allowed_commands,
            vec![LocalCommandEntry::NamedPath {
                name: "my".into(),
                path: "/abs/path/my".into(),
            }]
        );
        let config = local.into_config();
        assert_eq!(config.permissions.run, vec!["my".to_string()]);
        assert_eq!(config.permissions.read, vec!["/abs/path/my".to_string()]);
    }

    #[test]
    fn compact_restricted_form_parses_and_narrows_external_policy() {
        let json = r#"{"allowedCommands": [{"command": "git", "subcommands": ["status", "log"], "flags": ["--force"]}]}"#;
        let local: LocalOverride = serde_json::from_str(json).unwrap();
        let config = local.into_config();
        assert_eq!(config.permissions.run, vec!["git".to_string()]);
        let policy = config.external.get("git").unwrap();
        assert_eq!(
            policy.allow,
            Some(CommandAllow::Subcommands(vec!["status".into(), "log".into()]))
        );
        assert_eq!(policy.deny_flags, vec!["--force".to_string()]);
    }

    #[test]
    fn mixed_form_list_parses_all_three_shapes() {
        let json = r#"{"allowedCommands": ["cargo", {"name":"my","path":"/abs/path/my"}, {"command":"git","subcommands":["status","log"]}]}"#;
        let local: LocalOverride = serde_json::from_str(json).unwrap();
        assert_eq!(local.allowed_commands.len(), 3);
        let config = local.into_config();
        assert_eq!(
            config.permissions.run,
            vec!["cargo".to_string(), "my".to_string(), "git".to_string()]
        );
    }
}
