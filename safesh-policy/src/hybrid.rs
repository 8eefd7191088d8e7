//! Command/argv splitting for collaborators (REPL/CLI) that hand this core
//! a single typed line instead of an already-split `(command, args)` pair.
//!
//! Grounded in `skilllite/src/sandbox/bash_validator.rs`'s chain-operator
//! and first-word detection. That file's prefix-matching and blocked-prefix
//! pieces belong to its own bash-tool skill surface (out of scope here —
//! `Bash(prefix:*)` patterns, the `/*#*/`-sigil UX), so only the split/parse
//! contract is carried over: reject shell metacharacters a collaborator
//! might otherwise forward verbatim into a command name, then split the
//! remainder on whitespace.
use safesh_core::SafeShellError;

/// Shell metacharacters that would let a single typed line smuggle a second
/// command past admission. Presence anywhere in the line is rejected — this
/// core never interprets shell syntax, so these only ever arrive as an
/// injection attempt against a naive splitter.
const CHAIN_OPERATORS: &[&str] = &[";", "&&", "||", "|", "`", "$(", "${", "\n", "\r", ">("];

/// Split a single command line into `(command, argv)` the way a REPL
/// collaborator would before handing it to `validate_external`. Quoting is
/// not interpreted — arguments are whitespace-separated tokens, matching
/// the already-split contract the rest of this core expects.
pub fn split_command_line(line: &str) -> Result<(String, Vec<String>), SafeShellError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(SafeShellError::execution_error("empty command line"));
    }

    for op in CHAIN_OPERATORS {
        if trimmed.contains(op) {
            return Err(SafeShellError::execution_error(format!(
                "command line contains '{op}', which this core never interprets as shell syntax"
            )));
        }
    }

    let mut parts = trimmed.split_whitespace();
    let command = parts
        .next()
        .ok_or_else(|| SafeShellError::execution_error("empty command line"))?
        .to_string();
    let argv = parts.map(str::to_string).collect();
    Ok((command, argv))
}
