//! Binary entry point: parse arguments, load the layered config, dispatch
//! to a subcommand, and map the result onto the process exit code — `0` on
//! success, `1` on any `SafeShellError`, with the structured error printed
//! to stderr as JSON so a calling agent can parse it.

mod cli;
mod observability;
mod task;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use clap::Parser;

use safesh_config::{LoadOptions, LoadedConfig};
use safesh_core::permissions::Config;
use safesh_core::SafeShellError;
use safesh_runtime::shell::ShellManager;

/// Single-session cap for a one-shot CLI invocation — `run`/`repl` only
/// ever hold the one shell they create for their own lifetime.
const MAX_SESSIONS: usize = 1;

#[tokio::main]
async fn main() {
    observability::init();
    let cli = cli::Cli::parse();

    let result = run(cli).await;
    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            let json = serde_json::to_string(&err).unwrap_or_else(|_| err.to_string());
            eprintln!("{json}");
            std::process::exit(1);
        }
    }
}

async fn run(cli: cli::Cli) -> Result<i32, SafeShellError> {
    let cwd = std::env::current_dir()
        .map_err(|e| SafeShellError::execution_error(format!("failed to read cwd: {e}")))?;

    let overrides = match &cli.config_file {
        Some(path) => Some(read_config_file(path)?),
        None => None,
    };

    let LoadedConfig { config, warnings } = safesh_config::load_config(LoadOptions {
        project_dir: Some(cwd.clone()),
        preset: None,
        overrides,
        skip_validation: false,
    })?;
    for warning in &warnings {
        tracing::warn!(%warning, "config warning");
    }

    match cli.command {
        cli::Command::Exec { command, args } => exec(&command, &args, &config, &cwd).await,
        cli::Command::Run { command, args } => run_background(&command, &args, &config, &cwd).await,
        cli::Command::Task { name } => {
            let task = task::resolve(&name, &config)?;
            exec(&task.command, &task.args, &config, &cwd).await
        }
        cli::Command::Repl => repl(&config, &cwd).await,
    }
}

fn read_config_file(path: &PathBuf) -> Result<Config, SafeShellError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| SafeShellError::config_error(format!("failed to read {}: {e}", path.display())))?;
    serde_json::from_str(&raw)
        .map_err(|e| SafeShellError::config_error(format!("failed to parse {}: {e}", path.display())))
}

async fn exec(
    command: &str,
    args: &[String],
    config: &Config,
    cwd: &std::path::Path,
) -> Result<i32, SafeShellError> {
    let result = safesh_runtime::run_external(command, args, config, cwd, None, None).await?;
    print!("{}", result.stdout);
    eprint!("{}", result.stderr);
    Ok(result.exit_code)
}

async fn run_background(
    command: &str,
    args: &[String],
    config: &Config,
    cwd: &std::path::Path,
) -> Result<i32, SafeShellError> {
    let mut manager = ShellManager::new(MAX_SESSIONS);
    let shell_id = manager.create(config.clone(), cwd.to_path_buf()).await;
    let shell = manager
        .get_mut(shell_id)
        .expect("shell was just created");
    let id = shell.launch_command_script(command, args, true);

    let (status, exit_code) = shell
        .wait_script(id)
        .await
        .ok_or_else(|| SafeShellError::execution_error("script vanished before completing"))?;

    if let Some(output) = shell.get_script_output(id, 0).await {
        print!("{}", output.stdout_chunk);
        eprint!("{}", output.stderr_chunk);
    }

    match status {
        safesh_runtime::JobStatus::Completed => Ok(exit_code.unwrap_or(0)),
        safesh_runtime::JobStatus::Killed => Err(SafeShellError::timeout(config.timeout.unwrap_or(30_000))),
        _ => Err(SafeShellError::execution_error(format!("script {id} failed"))),
    }
}

/// Interactive loop over a single persistent [`Shell`]: `cd` and external
/// commands run in the shell's own (mutable) working directory rather than
/// the process-wide one, so `cd` actually has an effect across lines.
async fn repl(config: &Config, cwd: &std::path::Path) -> Result<i32, SafeShellError> {
    let mut manager = ShellManager::new(MAX_SESSIONS);
    let shell_id = manager.create(config.clone(), cwd.to_path_buf()).await;

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    loop {
        print!("safesh> ");
        stdout.flush().ok();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).unwrap_or(0) == 0 {
            break; // EOF
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }

        let mut parts = line.split_whitespace();
        let Some(command) = parts.next() else { continue };
        let args: Vec<String> = parts.map(|s| s.to_string()).collect();

        if command == "cd" {
            let target = args.first().map(String::as_str).unwrap_or("");
            let shell = manager.get(shell_id).expect("shell was just created");
            let dest = safesh_core::path::resolve_absolute(target, &shell.cwd, None);
            manager.cd(shell_id, &dest);
            continue;
        }

        let shell = manager.get(shell_id).expect("shell was just created");
        match safesh_runtime::run_external(command, &args, &shell.config, &shell.cwd, None, None).await {
            Ok(result) => {
                print!("{}", result.stdout);
                eprint!("{}", result.stderr);
            }
            Err(err) => {
                eprintln!("{}", serde_json::to_string(&err).unwrap_or_else(|_| err.to_string()));
            }
        }
        manager.touch(shell_id);
    }
    manager.end(shell_id).await;
    Ok(0)
}
