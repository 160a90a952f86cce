//! `lifeline` – Escalating Recovery Command Line Interface
//!
//! 1. Installs tracing (see `lifeline_runtime::telemetry`), then builds the
//!    Tokio runtime.
//! 2. Loads `~/.lifeline/config.toml` (defaults when absent) and wires the
//!    channel registry and alert surface.
//! 3. With arguments, runs one command (`check`, `recover`, `scenario`,
//!    `channels`, `schema`, `init`) and exits with its status.  Without
//!    arguments, drops into the interactive shell.
//! 4. Ctrl-C interrupts the running command and leaves the shell.

mod commands;
mod config;
mod repl;
mod shutdown;

use std::process::ExitCode;
use std::sync::Arc;

use colored::Colorize;
use tracing::{debug, warn};

use crate::commands::{App, Command};
use crate::shutdown::Shutdown;

const EXIT_USAGE: u8 = 64;

fn main() -> ExitCode {
    // Keep the guard alive until exit so pending spans are flushed.
    let telemetry = lifeline_runtime::init_tracing("lifeline");
    debug!(otlp_export = telemetry.is_exporting(), "tracing initialised");

    let shutdown = Arc::new(Shutdown::new());
    let handler_flag = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping …".yellow().bold());
        handler_flag.trigger();
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler");
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = if args.is_empty() {
        None
    } else {
        match Command::parse(&args) {
            Ok(Command::Help) => {
                commands::print_help();
                return ExitCode::SUCCESS;
            }
            Ok(Command::Init) => return commands::init_config(),
            Ok(command) => Some(command),
            Err(e) => {
                println!("{}: {e}", "Error".red());
                commands::print_help();
                return ExitCode::from(EXIT_USAGE);
            }
        }
    };

    let app = match config::load_or_default().and_then(App::from_config) {
        Ok(app) => app,
        Err(e) => {
            println!("{}: {e}", "Config error".red());
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            println!("{}: {e}", "Failed to start runtime".red());
            return ExitCode::FAILURE;
        }
    };

    match command {
        Some(command) => runtime.block_on(app.execute(command, &shutdown)),
        None => {
            print_banner();
            repl::run(&runtime, &app, &shutdown);
            ExitCode::SUCCESS
        }
    }
}

fn print_banner() {
    println!();
    println!("{}", r#"   _ _  __     _ _            "#.bold().cyan());
    println!("{}", r#"  | (_)/ _|___| (_)_ __  ___  "#.bold().cyan());
    println!("{}", r#"  | | |  _/ -_) | | '  \/ -_) "#.bold().cyan());
    println!("{}", r#"  |_|_|_| \___|_|_|_||_|\___| "#.bold().cyan());
    println!();
    println!("  {} {}", "Lifeline".bold(), format!("v{}", env!("CARGO_PKG_VERSION")).dimmed());
    println!("  Escalating recovery for unreachable hosts");
    println!(
        "  Config: {}",
        config::config_path().display().to_string().dimmed()
    );
    println!();
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());
}
