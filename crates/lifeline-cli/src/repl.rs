//! REPL – interactive shell over the same commands as one-shot mode.
//!
//! Supported slash-commands:
//!   /check              – probe every channel
//!   /recover <problem>  – run an escalation
//!   /scenario [name]    – rehearse with simulated channels
//!   /channels           – list the registry
//!   /schema             – print the session JSON Schema
//!   /init               – write the default config file
//!   /help               – show this list
//!   /quit | /exit       – leave the shell

use std::io::{self, BufRead, Write};

use colored::Colorize;
use tokio::runtime::Runtime;

use crate::commands::{App, Command};
use crate::shutdown::Shutdown;

/// What the shell should do with one input line.
#[derive(Debug, PartialEq, Eq)]
enum Input {
    Empty,
    Quit,
    Run(Command),
    Invalid(String),
}

fn interpret(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    let Some(body) = line.strip_prefix('/') else {
        return Input::Invalid(format!("Commands start with '/': '{line}'"));
    };
    let words: Vec<&str> = body.split_whitespace().collect();
    match words.first() {
        Some(&"quit") | Some(&"exit") => Input::Quit,
        _ => match Command::parse(&words) {
            Ok(command) => Input::Run(command),
            Err(e) => Input::Invalid(e.to_string()),
        },
    }
}

/// Entry point for the interactive shell.
///
/// `shutdown` is polled each iteration; when set the shell exits.
pub fn run(runtime: &Runtime, app: &App, shutdown: &Shutdown) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        if shutdown.is_triggered() {
            break;
        }

        print!("{} ", "lifeline>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }

        match interpret(&line) {
            Input::Empty => continue,
            Input::Quit => {
                println!("{}", "Goodbye.".green());
                break;
            }
            Input::Run(command) => {
                let status = runtime.block_on(app.execute(command, shutdown));
                if status != std::process::ExitCode::SUCCESS {
                    println!("{}", "(command did not succeed)".dimmed());
                }
            }
            Input::Invalid(message) => {
                println!(
                    "{} {}. Type {} for available commands.",
                    "Unknown command:".red(),
                    message.yellow(),
                    "/help".bold()
                );
            }
        }
    }
}
