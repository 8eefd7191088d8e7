//! Import admission, the command registry, and external-command validation:
//! everything that decides whether a given invocation is admitted before
//! `safesh-runtime` ever spawns a process. `scan` and `hybrid` are advisory
//! supplements that never gate admission themselves.

pub mod commands;
pub mod external;
pub mod hybrid;
pub mod imports;
pub mod scan;

pub use commands::{builtin_policy, mandatory_deny_flags, normalize_command};
pub use external::validate_external;
pub use hybrid::split_command_line;
pub use imports::{
    admit_specifier, generate_import_map, import_map_path, scan_and_admit,
    scan_and_write_import_map, scan_source, validate_imports, write_import_map, ImportMap,
    ImportReference,
};
pub use scan::{scan_content, Issue, IssueType, ScanResult, Severity};
