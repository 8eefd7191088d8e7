//! Layered config loading: presets, global/project/local JSON files, and
//! caller-supplied overrides, merged through `safesh_core`'s algebra and
//! validated before use.

pub mod loader;
pub mod local;
pub mod validate;

pub use loader::{load_config, save_to_local_json, LoadOptions, LoadedConfig};
pub use validate::{validate, Severity, ValidationIssue};
