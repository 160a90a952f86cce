//! [`CommandChannel`] – run an external program as a recovery step.
//!
//! Covers SSH logins, cloud CLI reboots and anything else expressible as a
//! command line.  Exit status 0 is success; anything else is a
//! `channel_fault` carrying an excerpt of stderr.  The child is spawned with
//! `kill_on_drop`, so cancelling the attempt also kills the process.
//!
//! Two optional TCP checks tie a command to the target's state:
//!
//! * a *probe port* ([`CommandChannel::with_probe_port`]) is what `probe`
//!   connects to, and is checked before the program is spawned;
//! * a *verify port* ([`CommandChannel::with_verify_port`]) must accept a
//!   connection after a zero exit and a settle delay, otherwise the attempt
//!   fails.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use lifeline_kernel::{AttemptContext, ProbeContext, RecoveryChannel};
use lifeline_types::{ChannelError, ChannelOutcome, ErrorKind};
use tokio::process::Command;
use tracing::debug;

use crate::tcp::port_open;

/// Characters of stdout/stderr kept in outcome metadata and messages.
const OUTPUT_EXCERPT: usize = 500;
/// Bound on the port checks made inside an attempt.
const PORT_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// A TCP endpoint on the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortCheck {
    pub host: String,
    pub port: u16,
}

impl PortCheck {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }

    async fn is_open(&self, limit: Duration) -> bool {
        matches!(port_open(&self.host, self.port, limit).await, Ok(true))
    }
}

impl std::fmt::Display for PortCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct CommandChannel {
    method: String,
    program: String,
    args: Vec<String>,
    probe_port: Option<PortCheck>,
    verify: Option<(PortCheck, Duration)>,
}

impl CommandChannel {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        let program = program.into();
        Self {
            method: program.clone(),
            program,
            args,
            probe_port: None,
            verify: None,
        }
    }

    /// Label recorded as the outcome `method`.  Defaults to the program name.
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    /// Probe `host:port` instead of looking the program up on `PATH`, and
    /// skip the spawn when the port is closed.
    pub fn with_probe_port(mut self, host: impl Into<String>, port: u16) -> Self {
        self.probe_port = Some(PortCheck::new(host, port));
        self
    }

    /// After a zero exit, wait `settle` and require `host:port` to accept a
    /// connection.
    pub fn with_verify_port(mut self, host: impl Into<String>, port: u16, settle: Duration) -> Self {
        self.verify = Some((PortCheck::new(host, port), settle));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn probe_port(&self) -> Option<&PortCheck> {
        self.probe_port.as_ref()
    }

    /// `program arg1 arg2 …` for display.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn resolvable(&self) -> bool {
        if self.program.contains(std::path::MAIN_SEPARATOR) {
            return Path::new(&self.program).is_file();
        }
        std::env::var_os("PATH")
            .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(&self.program).is_file()))
            .unwrap_or(false)
    }

    async fn verify_after_exit(&self, ctx: &AttemptContext, outcome: ChannelOutcome) -> ChannelOutcome {
        let Some((check, settle)) = &self.verify else {
            return outcome;
        };
        if ctx.until_cancelled(tokio::time::sleep(*settle)).await.is_none() {
            return ChannelOutcome::failure(&self.method, ErrorKind::Timeout, "cancelled while waiting for the target");
        }
        let limit = ctx.remaining().min(PORT_CHECK_TIMEOUT);
        if check.is_open(limit).await {
            outcome.with_metadata("verified", check.to_string())
        } else {
            ChannelOutcome::fault(
                &self.method,
                format!("{} exited 0 but {check} is still not accepting connections", self.program),
            )
        }
    }
}

fn excerpt(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim().chars().take(OUTPUT_EXCERPT).collect()
}

#[async_trait]
impl RecoveryChannel for CommandChannel {
    async fn attempt(&self, ctx: AttemptContext) -> ChannelOutcome {
        if let Some(check) = &self.probe_port {
            if !check.is_open(ctx.remaining().min(PORT_CHECK_TIMEOUT)).await {
                return ChannelOutcome::fault(&self.method, format!("{check} not accessible"));
            }
        }

        debug!(command = %self.command_line(), "spawning recovery command");

        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) => {
                return ChannelOutcome::fault(&self.method, format!("failed to spawn {}: {e}", self.program));
            }
        };

        // Dropping the wait future drops the child, which kills it.
        let output = match ctx.until_cancelled(child.wait_with_output()).await {
            Some(Ok(output)) => output,
            Some(Err(e)) => {
                return ChannelOutcome::fault(&self.method, format!("waiting on {} failed: {e}", self.program));
            }
            None => {
                return ChannelOutcome::failure(
                    &self.method,
                    ErrorKind::Timeout,
                    format!("{} cancelled and killed", self.program),
                );
            }
        };

        let exit_code = output
            .status
            .code()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string());

        if output.status.success() {
            let mut outcome = ChannelOutcome::success(&self.method).with_metadata("exit_code", exit_code);
            let stdout = excerpt(&output.stdout);
            if !stdout.is_empty() {
                outcome = outcome.with_metadata("stdout", stdout);
            }
            self.verify_after_exit(&ctx, outcome).await
        } else {
            let stderr = excerpt(&output.stderr);
            let message = if stderr.is_empty() {
                format!("{} exited with {}", self.program, output.status)
            } else {
                format!("{} exited with {}: {stderr}", self.program, output.status)
            };
            ChannelOutcome::fault(&self.method, message).with_metadata("exit_code", exit_code)
        }
    }

    async fn probe(&self, ctx: ProbeContext) -> Result<bool, ChannelError> {
        match &self.probe_port {
            Some(check) => port_open(&check.host, check.port, ctx.remaining()).await,
            None => Ok(self.resolvable()),
        }
    }
}
