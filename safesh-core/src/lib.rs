//! Policy data model shared by every other SafeShell crate: the error
//! taxonomy, the glob pattern matcher, path expansion/containment, and the
//! `Config`/merge algebra that defines what a sandboxed shell is allowed
//! to touch.

pub mod audit;
pub mod error;
pub mod path;
pub mod pattern;
pub mod permissions;
pub mod preset;
pub mod sensitive;

pub use error::{ErrorCode, ErrorDetails, Result, SafeShellError};
pub use permissions::{
    effective_permissions, merge_command_policy, merge_configs, CommandAllow, CommandPolicy, Config,
    EffectivePermissions, EnvPolicy, ImportsPolicy, NetPolicy, PathArgsPolicy, Permissions, Preset,
};
