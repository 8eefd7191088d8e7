//! `tasks.<name>`: named command shortcuts a config can declare, run via
//! the `task` subcommand instead of spelling out `exec <command> <args>`.

use serde::Deserialize;

use safesh_core::permissions::Config;
use safesh_core::SafeShellError;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDef {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Resolve `name` against `config.tasks`, producing the command+args to
/// actually run.
pub fn resolve(name: &str, config: &Config) -> Result<TaskDef, SafeShellError> {
    let raw = config
        .tasks
        .get(name)
        .ok_or_else(|| SafeShellError::config_error(format!("no task named '{name}'")))?;
    serde_json::from_value(raw.clone())
        .map_err(|e| SafeShellError::config_error(format!("task '{name}' is malformed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_a_declared_task() {
        let mut config = Config::empty();
        config.tasks.insert(
            "build".into(),
            serde_json::json!({"command": "cargo", "args": ["build", "--release"]}),
        );
        let task = resolve("build", &config).unwrap();
        assert_eq!(task.command, "cargo");
        assert_eq!(task.args, vec!["build", "--release"]);
    }

    #[test]
    fn missing_task_is_a_config_error() {
        let config = Config::empty();
        let err = resolve("nope", &config).unwrap_err();
        assert_eq!(err.code, safesh_core::ErrorCode::ConfigError);
    }
}
