//! C5 — layered config loading (spec §4.5).
//!
//! Layers apply in increasing precedence: preset defaults, then the global
//! per-user file, then the per-project file, then the compact local
//! override file, then any caller-supplied overrides (e.g. MCP init args).
//! Each layer is optional; a missing file is not an error.

use std::path::{Path, PathBuf};

use safesh_core::permissions::{merge_configs, Config, Preset};
use safesh_core::SafeShellError;
use tracing::{debug, warn};

use crate::local::LocalOverride;
use crate::validate::{self, ValidationIssue};

#[derive(Debug, thiserror::Error)]
enum ConfigLoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path} as JSON: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl From<ConfigLoadError> for SafeShellError {
    fn from(err: ConfigLoadError) -> Self {
        SafeShellError::config_error(err.to_string())
    }
}

/// Inputs to [`load_config`]. `project_dir` anchors the project/local file
/// layers and becomes `Config.project_dir` unless an override replaces it.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub project_dir: Option<PathBuf>,
    pub preset: Option<Preset>,
    pub overrides: Option<Config>,
    pub skip_validation: bool,
}

/// The result of a successful load: the fully-merged config plus any
/// non-fatal validation warnings a caller may want to surface.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub warnings: Vec<String>,
}

fn global_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".config").join("safesh").join("config.json"))
}

fn project_config_path(project_dir: &Path) -> PathBuf {
    project_dir.join(".config").join("safesh").join("config.json")
}

fn local_config_path(project_dir: &Path) -> PathBuf {
    project_dir
        .join(".config")
        .join("safesh")
        .join("config.local.json")
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, ConfigLoadError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let parsed = serde_json::from_str(&raw).map_err(|source| ConfigLoadError::Parse {
        path: path.display().to_string(),
        source,
    })?;
    Ok(Some(parsed))
}

/// Run the full layered load described above, then validate the result.
/// Validation errors abort the load unless `opts.skip_validation` is set,
/// in which case they are demoted to warnings alongside everything else.
pub fn load_config(opts: LoadOptions) -> Result<LoadedConfig, SafeShellError> {
    let mut config = safesh_core::preset::base_config(opts.preset.unwrap_or(Preset::Standard));

    if let Some(global_path) = global_config_path() {
        if let Some(global) = read_json::<Config>(&global_path)? {
            debug!(path = %global_path.display(), "applying global config layer");
            config = merge_configs(&config, &global);
        }
    }

    if let Some(project_dir) = &opts.project_dir {
        config.project_dir.get_or_insert_with(|| project_dir.display().to_string());

        let project_path = project_config_path(project_dir);
        if let Some(project) = read_json::<Config>(&project_path)? {
            debug!(path = %project_path.display(), "applying project config layer");
            config = merge_configs(&config, &project);
        }

        let local_path = local_config_path(project_dir);
        if let Some(local) = read_json::<LocalOverride>(&local_path)? {
            debug!(path = %local_path.display(), "applying local override layer");
            config = merge_configs(&config, &local.into_config());
        }
    }

    if let Some(overrides) = &opts.overrides {
        debug!("applying caller-supplied overrides");
        config = merge_configs(&config, overrides);
    }

    let issues = validate::validate(&config);
    if validate::has_errors(&issues) && !opts.skip_validation {
        let messages: Vec<String> = issues
            .iter()
            .filter(|i| i.severity == validate::Severity::Error)
            .map(|i| i.message.clone())
            .collect();
        return Err(SafeShellError::config_error(format!(
            "config validation failed: {}",
            messages.join("; ")
        )));
    }

    let warnings = collect_warnings(issues);
    for warning in &warnings {
        warn!(%warning, "config validation warning");
    }

    Ok(LoadedConfig { config, warnings })
}

fn collect_warnings(issues: Vec<ValidationIssue>) -> Vec<String> {
    issues
        .into_iter()
        .map(|i| i.message)
        .collect()
}

/// Write `commands` as the compact local-override file under
/// `project_dir/.config/safesh/config.local.json`, creating parent
/// directories as needed.
pub fn save_to_local_json(project_dir: &Path, commands: Vec<String>) -> Result<(), SafeShellError> {
    let path = local_config_path(project_dir);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| ConfigLoadError::Io {
            path: parent.display().to_string(),
            source,
        })?;
    }
    let local = crate::local::from_commands(commands.clone());
    let json = serde_json::to_string_pretty(&local)
        .map_err(|source| ConfigLoadError::Parse {
            path: path.display().to_string(),
            source,
        })?;
    std::fs::write(&path, json).map_err(|source| ConfigLoadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    safesh_core::audit::local_override_saved(&path.display().to_string(), &commands);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_layers_fall_back_to_preset_defaults() {
        let dir = tempdir().unwrap();
        let loaded = load_config(LoadOptions {
            project_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        })
        .unwrap();
        assert!(loaded.config.permissions.run.contains(&"ls".to_string()));
    }

    #[test]
    fn project_layer_overrides_and_merges_over_preset() {
        let dir = tempdir().unwrap();
        let config_dir = dir.path().join(".config").join("safesh");
        std::fs::create_dir_all(&config_dir).unwrap();
        std::fs::write(
            config_dir.join("config.json"),
            r#"{"permissions": {"run": ["custom-tool"]}}"#,
        )
        .unwrap();

        let loaded = load_config(LoadOptions {
            project_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        })
        .unwrap();
        assert!(loaded.config.permissions.run.contains(&"custom-tool".to_string()));
        assert!(loaded.config.permissions.run.contains(&"ls".to_string()));
    }

    #[test]
    fn local_layer_expands_allowed_commands() {
        let dir = tempdir().unwrap();
        let config_dir = dir.path().join(".config").join("safesh");
        std::fs::create_dir_all(&config_dir).unwrap();
        std::fs::write(
            config_dir.join("config.local.json"),
            r#"{"allowedCommands": ["jq"]}"#,
        )
        .unwrap();

        let loaded = load_config(LoadOptions {
            project_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        })
        .unwrap();
        assert!(loaded.config.permissions.run.contains(&"jq".to_string()));
    }

    #[test]
    fn validation_error_aborts_load_unless_skipped() {
        let dir = tempdir().unwrap();
        let mut overrides = Config::empty();
        overrides.permissions.write.push("/".into());

        let strict = load_config(LoadOptions {
            project_dir: Some(dir.path().to_path_buf()),
            overrides: Some(overrides.clone()),
            ..Default::default()
        });
        assert!(strict.is_err());

        let lenient = load_config(LoadOptions {
            project_dir: Some(dir.path().to_path_buf()),
            overrides: Some(overrides),
            skip_validation: true,
            ..Default::default()
        })
        .unwrap();
        assert!(!lenient.warnings.is_empty());
    }

    #[test]
    fn save_to_local_json_round_trips() {
        let dir = tempdir().unwrap();
        save_to_local_json(dir.path(), vec!["jq".into(), "yq".into()]).unwrap();

        let loaded = load_config(LoadOptions {
            project_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        })
        .unwrap();
        assert!(loaded.config.permissions.run.contains(&"jq".to_string()));
        assert!(loaded.config.permissions.run.contains(&"yq".to_string()));
    }
}
