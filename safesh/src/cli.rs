//! Clap argument definitions for the `safesh` binary's four subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "safesh", version, about = "Sandboxed shell policy engine for AI agents")]
pub struct Cli {
    /// Path to a JSON config file merged in as the highest-precedence layer.
    #[arg(short = 'c', long = "config", global = true)]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a single external command synchronously and print its output.
    Exec {
        command: String,
        #[arg(trailing_var_arg = true)]
        args: Vec<String>,
    },
    /// Launch a command as a background script, waiting for it to finish.
    Run {
        command: String,
        #[arg(trailing_var_arg = true)]
        args: Vec<String>,
    },
    /// Run a named entry from the config's `tasks` table.
    Task { name: String },
    /// Start an interactive read-eval-print loop.
    Repl,
}
