//! Command parsing and execution shared by one-shot mode and the REPL.

use std::process::ExitCode;
use std::sync::Arc;

use colored::Colorize;
use lifeline_kernel::ChannelRegistry;
use lifeline_notify::{FanoutNotifier, LogNotifier, Notifier, TelegramNotifier};
use lifeline_runtime::{AvailabilityProber, DEFAULT_SCENARIO, EscalationOrchestrator, ScenarioRunner, catalogue};
use lifeline_types::{AvailabilityReport, RecoverySession, ScenarioResult};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::config::{self, Config, ConfigError};
use crate::shutdown::Shutdown;

/// Exit status of `recover` when every channel was exhausted.
const EXIT_EXHAUSTED: u8 = 2;
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CommandError {
    #[error("Unknown command '{0}'")]
    Unknown(String),

    #[error("'recover' needs a problem description")]
    MissingProblem,
}

/// A parsed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Check,
    Recover(String),
    Scenario(String),
    Channels,
    Schema,
    Init,
    Help,
}

impl Command {
    /// Parse `args` (command name first, no program name).
    pub fn parse<S: AsRef<str>>(args: &[S]) -> Result<Self, CommandError> {
        let Some((head, rest)) = args.split_first() else {
            return Ok(Command::Help);
        };
        let rest = rest.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(" ");
        match head.as_ref() {
            "check" => Ok(Command::Check),
            "recover" if rest.trim().is_empty() => Err(CommandError::MissingProblem),
            "recover" => Ok(Command::Recover(rest.trim().to_string())),
            "scenario" if rest.trim().is_empty() => Ok(Command::Scenario(DEFAULT_SCENARIO.to_string())),
            "scenario" => Ok(Command::Scenario(rest.trim().to_string())),
            "channels" => Ok(Command::Channels),
            "schema" => Ok(Command::Schema),
            "init" => Ok(Command::Init),
            "help" | "--help" | "-h" => Ok(Command::Help),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Application wiring
// ─────────────────────────────────────────────────────────────────────────────

/// Everything a command needs, built once from the config.
pub struct App {
    config: Config,
    registry: ChannelRegistry,
    notifier: Arc<dyn Notifier>,
}

impl App {
    pub fn from_config(config: Config) -> Result<Self, ConfigError> {
        let registry = config.build_registry()?;
        let notifier: Arc<dyn Notifier> = match config.telegram() {
            Some(telegram) => Arc::new(
                FanoutNotifier::new()
                    .with(Box::new(TelegramNotifier::new(telegram)))
                    .with(Box::new(LogNotifier)),
            ),
            None => Arc::new(LogNotifier),
        };
        info!(
            target_name = %config.target.name,
            channels = registry.len(),
            telegram = config.telegram().is_some(),
            "lifeline configured"
        );
        Ok(Self {
            config,
            registry,
            notifier,
        })
    }

    /// Run `command`, printing its output.
    pub async fn execute(&self, command: Command, shutdown: &Shutdown) -> ExitCode {
        match command {
            Command::Check => {
                let prober = AvailabilityProber::new(self.registry.clone(), self.config.probe_config());
                match interruptible(prober.check_all(), shutdown).await {
                    Some(report) => {
                        print_report(&report);
                        print_json(&report)
                    }
                    None => ExitCode::from(EXIT_INTERRUPTED),
                }
            }
            Command::Recover(problem) => {
                let orchestrator = EscalationOrchestrator::new(
                    self.registry.clone(),
                    self.notifier.clone(),
                    self.config.orchestrator_config(),
                );
                match interruptible(orchestrator.recover(&problem), shutdown).await {
                    Some(session) => {
                        print_session(&session);
                        let status = print_json(&session);
                        if session.succeeded() { status } else { ExitCode::from(EXIT_EXHAUSTED) }
                    }
                    None => ExitCode::from(EXIT_INTERRUPTED),
                }
            }
            Command::Scenario(name) => {
                let runner = ScenarioRunner::new(self.registry.clone(), self.config.scenario_config());
                match interruptible(runner.run_scenario(&name), shutdown).await {
                    Some(Ok(result)) => {
                        print_scenario(&result);
                        print_json(&result)
                    }
                    Some(Err(e)) => {
                        println!("{}: {e}", "Scenario error".red());
                        ExitCode::FAILURE
                    }
                    None => ExitCode::from(EXIT_INTERRUPTED),
                }
            }
            Command::Channels => {
                print_channels(&self.config);
                ExitCode::SUCCESS
            }
            Command::Schema => print_json(&session_schema()),
            Command::Init => init_config(),
            Command::Help => {
                print_help();
                ExitCode::SUCCESS
            }
        }
    }
}

/// JSON Schema of the session audit record.
fn session_schema() -> schemars::schema::RootSchema {
    schemars::schema_for!(RecoverySession)
}

/// Await `work` unless Ctrl-C arrives first.
async fn interruptible<F: Future>(work: F, shutdown: &Shutdown) -> Option<F::Output> {
    tokio::select! {
        output = work => Some(output),
        _ = shutdown.wait() => {
            println!("{}", "Interrupted.".yellow());
            None
        }
    }
}

pub fn init_config() -> ExitCode {
    let path = config::config_path();
    if path.exists() {
        println!("  Config already exists at {}", path.display().to_string().bold());
        return ExitCode::SUCCESS;
    }
    match config::save(&Config::default()) {
        Ok(()) => {
            println!("{} {}", "✓ Default config written to".green(), path.display().to_string().bold());
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("{}: {e}", "Error saving config".red());
            ExitCode::FAILURE
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Output
// ─────────────────────────────────────────────────────────────────────────────

fn print_json<T: Serialize>(value: &T) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("{}: {e}", "Serialization error".red());
            ExitCode::FAILURE
        }
    }
}

fn print_session(session: &RecoverySession) {
    println!("{}", "Recovery Session".bold().underline());
    for (i, attempt) in session.attempts().iter().enumerate() {
        let mark = if attempt.succeeded() { "✓".green() } else { "✗".red() };
        let detail = attempt
            .outcome
            .error
            .as_ref()
            .map(|e| format!(" – {e}").dimmed().to_string())
            .unwrap_or_default();
        println!(
            "  [{}/{}] {} {} ({:.1}s){detail}",
            i + 1,
            session.attempts().len(),
            mark,
            attempt.channel_name.bold(),
            attempt.duration.as_secs_f64()
        );
    }
    match session.successful_channel() {
        Some(channel) => println!(
            "  {} via {} in {:.1}s",
            "RECOVERED".green().bold(),
            channel.bold(),
            session.total_duration().as_secs_f64()
        ),
        None => println!(
            "  {} after {:.1}s – manual intervention required",
            "EXHAUSTED".red().bold(),
            session.total_duration().as_secs_f64()
        ),
    }
    println!();
}

fn print_report(report: &AvailabilityReport) {
    println!("{}", "Channel Availability".bold().underline());
    for (name, status) in &report.channel_status {
        let icon = if status.available { "🟢".green() } else { "🔴".red() };
        let detail = status.error.as_ref().map(|e| format!(" – {e}")).unwrap_or_default();
        println!(
            "  {icon} {} ({:.2}s){}",
            name.bold(),
            status.check_duration.as_secs_f64(),
            detail.dimmed()
        );
    }
    let verdict = if report.recovery_readiness { "READY".green().bold() } else { "NOT READY".red().bold() };
    println!(
        "  {}/{} available (threshold {}) – {verdict}",
        report.available_channels, report.total_channels, report.readiness_threshold
    );
    println!();
}

fn print_scenario(result: &ScenarioResult) {
    println!(
        "{} {} ({})",
        "Rehearsal".bold().underline(),
        result.scenario.bold().cyan(),
        "simulated".dimmed()
    );
    println!("  Problem  : {}", result.problem.yellow());
    println!("  Channels : {}", result.session.attempted_channels().join(" → "));
    let verdict = match result.session.successful_channel() {
        Some(channel) => format!("recovered via {channel}").green(),
        None => "exhausted".red(),
    };
    println!("  Result   : {verdict} in {:.1}s", result.duration.as_secs_f64());
    println!();
}

fn print_channels(cfg: &Config) {
    println!("{}", "Recovery Channels".bold().underline());
    let mut channels: Vec<_> = cfg.channels.iter().collect();
    channels.sort_by_key(|c| c.priority);
    for c in channels {
        let alert = if c.alert_on_failure { " [alert]".yellow().to_string() } else { String::new() };
        println!(
            "  {:>3}  {:<20} {:>4}s  {}{alert}",
            c.priority,
            c.name.bold(),
            c.timeout_secs,
            c.describe(&cfg.target).dimmed()
        );
    }
    println!();
}

pub fn print_help() {
    println!();
    println!("{}", "Lifeline Commands".bold().underline());
    println!("  {}            – probe every channel, report readiness", "check".bold().cyan());
    println!("  {}  – escalate through the channels", "recover <problem>".bold().cyan());
    println!("  {}    – rehearse with simulated channels", "scenario [name]".bold().cyan());
    println!("  {}         – list channels in priority order", "channels".bold().cyan());
    println!("  {}           – print the session JSON Schema", "schema".bold().cyan());
    println!("  {}             – write the default config file", "init".bold().cyan());
    let names: Vec<_> = catalogue().iter().map(|s| s.name).collect();
    println!("  Scenarios: {}", names.join(", ").dimmed());
    println!("  In the shell, prefix commands with {} and use {} to leave.", "/".bold(), "/quit".bold());
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(Command::parse(&["check"]), Ok(Command::Check));
        assert_eq!(Command::parse(&["channels"]), Ok(Command::Channels));
        assert_eq!(Command::parse(&["schema"]), Ok(Command::Schema));
        assert_eq!(Command::parse::<&str>(&[]), Ok(Command::Help));
    }

    #[test]
    fn recover_joins_problem_words() {
        assert_eq!(
            Command::parse(&["recover", "SSH", "connection", "timeout"]),
            Ok(Command::Recover("SSH connection timeout".to_string()))
        );
        assert_eq!(Command::parse(&["recover"]), Err(CommandError::MissingProblem));
    }

    #[test]
    fn scenario_defaults_to_connection_lost() {
        assert_eq!(Command::parse(&["scenario"]), Ok(Command::Scenario("connection_lost".to_string())));
        assert_eq!(
            Command::parse(&["scenario", "vm_unreachable"]),
            Ok(Command::Scenario("vm_unreachable".to_string()))
        );
    }

    #[test]
    fn unknown_command_is_rejected() {
        assert_eq!(Command::parse(&["reboot"]), Err(CommandError::Unknown("reboot".to_string())));
    }

    #[test]
    fn app_without_token_logs_only() {
        let app = App::from_config(Config::default()).unwrap();
        assert_eq!(app.registry.len(), 5);
    }

    #[test]
    fn schema_lists_audit_keys() {
        let schema = serde_json::to_value(session_schema()).unwrap();
        let properties = schema["properties"].as_object().expect("object schema");
        for key in ["start_time", "problem", "attempts", "success", "successful_channel", "total_time"] {
            assert!(properties.contains_key(key), "missing {key}");
        }
        let required: Vec<_> = schema["required"].as_array().unwrap().iter().filter_map(|v| v.as_str()).collect();
        assert!(!required.contains(&"successful_channel"));
        assert!(required.contains(&"total_time"));
    }

    #[tokio::test]
    async fn schema_command_succeeds() {
        let app = App::from_config(Config::default()).unwrap();
        assert_eq!(app.execute(Command::Schema, &Shutdown::new()).await, ExitCode::SUCCESS);
    }

    #[tokio::test]
    async fn scenario_command_runs_without_side_effects() {
        let mut cfg = Config::default();
        cfg.scenario.step_delay_ms = 1;
        let app = App::from_config(cfg).unwrap();
        let status = app.execute(Command::Scenario("service_down".into()), &Shutdown::new()).await;
        assert_eq!(status, ExitCode::SUCCESS);
    }

    #[tokio::test]
    async fn interrupt_cancels_long_work() {
        let shutdown = Shutdown::new();
        shutdown.trigger();
        let out = interruptible(std::future::pending::<()>(), &shutdown).await;
        assert!(out.is_none());
    }
}
