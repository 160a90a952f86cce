//! Configuration Vault – reads/writes `~/.lifeline/config.toml`.
//!
//! The file describes the protected target, the alert surface, probe and
//! rehearsal tuning, and the ordered `[[channels]]` list.  Everything has a
//! default, so a missing file or a partial file is valid.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use lifeline_channels::{CommandChannel, HttpHealthChannel, SequenceChannel, TcpPortChannel};
use lifeline_kernel::{ChannelDescriptor, ChannelRegistry, RecoveryChannel, RegistryError};
use lifeline_notify::TelegramConfig;
use lifeline_runtime::{OrchestratorConfig, ProbeConfig, ScenarioConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Placeholders expanded in channel programs, arguments and URLs.
const HOST_PLACEHOLDER: &str = "{host}";
const INSTANCE_PLACEHOLDER: &str = "{instance_id}";
const HOME_PLACEHOLDER: &str = "{home}";

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config at {path}: {source}")]
    Read { path: String, source: std::io::Error },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to create config directory {path}: {source}")]
    CreateDir { path: String, source: std::io::Error },

    #[error("Failed to write config at {path}: {source}")]
    Write { path: String, source: std::io::Error },

    #[error("Invalid channel registry: {0}")]
    Registry(#[from] RegistryError),
}

// ─────────────────────────────────────────────────────────────────────────────
// Sections
// ─────────────────────────────────────────────────────────────────────────────

/// `[target]` – the system being protected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub name: String,
    pub host: String,
    /// Cloud instance id used by the `yc` channels.
    pub instance_id: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            name: "primary-server".to_string(),
            host: "127.0.0.1".to_string(),
            instance_id: String::new(),
        }
    }
}

impl TargetConfig {
    /// Expand `{host}`, `{instance_id}` and `{home}` in `raw`.
    pub fn expand(&self, raw: &str) -> String {
        raw.replace(HOST_PLACEHOLDER, &self.host)
            .replace(INSTANCE_PLACEHOLDER, &self.instance_id)
            .replace(HOME_PLACEHOLDER, &home_dir())
    }
}

fn home_dir() -> String {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string())
}

/// `[notify]` – Telegram alerting.  Empty token means log-only alerts.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub telegram_bot_token: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub telegram_chat_id: String,
    pub telegram_api_base: String,
    pub timeout_secs: u64,
    pub notify_on_start: bool,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            telegram_bot_token: String::new(),
            telegram_chat_id: String::new(),
            telegram_api_base: lifeline_notify::telegram::DEFAULT_API_BASE.to_string(),
            timeout_secs: 10,
            notify_on_start: true,
        }
    }
}

impl std::fmt::Debug for NotifyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifyConfig")
            .field(
                "telegram_bot_token",
                if self.telegram_bot_token.is_empty() { &"<not set>" } else { &"<redacted>" },
            )
            .field("telegram_chat_id", &self.telegram_chat_id)
            .field("telegram_api_base", &self.telegram_api_base)
            .field("timeout_secs", &self.timeout_secs)
            .field("notify_on_start", &self.notify_on_start)
            .finish()
    }
}

/// `[probe]` – readiness check tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeSection {
    pub timeout_secs: u64,
    pub readiness_threshold: usize,
}

impl Default for ProbeSection {
    fn default() -> Self {
        Self {
            timeout_secs: 3,
            readiness_threshold: 2,
        }
    }
}

/// `[scenario]` – rehearsal tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioSection {
    pub prefix_len: usize,
    pub step_delay_ms: u64,
}

impl Default for ScenarioSection {
    fn default() -> Self {
        Self {
            prefix_len: 3,
            step_delay_ms: 500,
        }
    }
}

/// Mechanism behind a `[[channels]]` entry, selected by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChannelKind {
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
        /// Target port the probe connects to, checked again before spawning.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        probe_port: Option<u16>,
        /// Target port that must accept connections after a zero exit.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        verify_port: Option<u16>,
        #[serde(default, skip_serializing_if = "is_zero")]
        settle_secs: u64,
    },
    Tcp {
        port: u16,
    },
    Http {
        url: String,
    },
    /// Ordered sub-steps; the first success wins.
    Sequence {
        steps: Vec<ChannelKind>,
    },
}

fn is_zero(v: &u64) -> bool {
    *v == 0
}

impl ChannelKind {
    /// A command with no port checks.
    pub fn command(program: &str, args: &[&str]) -> Self {
        ChannelKind::Command {
            program: program.to_string(),
            args: strings(args),
            probe_port: None,
            verify_port: None,
            settle_secs: 0,
        }
    }

    fn handler(&self, method: &str, target: &TargetConfig) -> Arc<dyn RecoveryChannel> {
        match self {
            ChannelKind::Command {
                program,
                args,
                probe_port,
                verify_port,
                settle_secs,
            } => {
                let args = args.iter().map(|a| target.expand(a)).collect();
                let mut channel = CommandChannel::new(target.expand(program), args).with_method(method);
                if let Some(port) = probe_port {
                    channel = channel.with_probe_port(&target.host, *port);
                }
                if let Some(port) = verify_port {
                    channel = channel.with_verify_port(&target.host, *port, Duration::from_secs(*settle_secs));
                }
                Arc::new(channel)
            }
            ChannelKind::Tcp { port } => Arc::new(TcpPortChannel::new(&target.host, *port)),
            ChannelKind::Http { url } => Arc::new(HttpHealthChannel::new(target.expand(url))),
            ChannelKind::Sequence { steps } => Arc::new(SequenceChannel::new(
                method,
                steps
                    .iter()
                    .enumerate()
                    .map(|(i, step)| step.handler(&format!("{method}.{}", i + 1), target))
                    .collect(),
            )),
        }
    }

    fn describe(&self, target: &TargetConfig) -> String {
        match self {
            ChannelKind::Command {
                program,
                args,
                probe_port,
                verify_port,
                ..
            } => {
                let mut line = target.expand(
                    &std::iter::once(program.as_str())
                        .chain(args.iter().map(String::as_str))
                        .collect::<Vec<_>>()
                        .join(" "),
                );
                if let Some(port) = probe_port {
                    line.push_str(&format!(" [needs :{port}]"));
                }
                if let Some(port) = verify_port {
                    line.push_str(&format!(" [verify :{port}]"));
                }
                line
            }
            ChannelKind::Tcp { port } => format!("tcp {}:{port}", target.host),
            ChannelKind::Http { url } => format!("GET {}", target.expand(url)),
            ChannelKind::Sequence { steps } => steps
                .iter()
                .map(|step| step.describe(target))
                .collect::<Vec<_>>()
                .join(", then "),
        }
    }
}

/// One `[[channels]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub name: String,
    pub priority: u32,
    pub timeout_secs: u64,
    #[serde(default)]
    pub alert_on_failure: bool,
    #[serde(flatten)]
    pub kind: ChannelKind,
}

impl ChannelConfig {
    /// Instantiate the handler with the target's placeholders expanded.
    fn handler(&self, target: &TargetConfig) -> Arc<dyn RecoveryChannel> {
        self.kind.handler(&self.name, target)
    }

    /// Short human description of the mechanism, placeholders expanded.
    pub fn describe(&self, target: &TargetConfig) -> String {
        self.kind.describe(target)
    }
}

fn channel(name: &str, priority: u32, timeout_secs: u64, kind: ChannelKind) -> ChannelConfig {
    ChannelConfig {
        name: name.to_string(),
        priority,
        timeout_secs,
        alert_on_failure: false,
        kind,
    }
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|a| a.to_string()).collect()
}

/// Restart-style step: run `yc` and require SSH to answer afterwards.
fn yc_and_verify_ssh(args: &[&str]) -> ChannelKind {
    ChannelKind::Command {
        program: "yc".to_string(),
        args: strings(args),
        probe_port: None,
        verify_port: Some(22),
        settle_secs: 30,
    }
}

fn default_channels() -> Vec<ChannelConfig> {
    let ssh = ChannelKind::Command {
        program: "ssh".to_string(),
        args: strings(&[
            "-o",
            "ConnectTimeout=10",
            "-o",
            "StrictHostKeyChecking=no",
            "-o",
            "BatchMode=yes",
            "yc-user@{host}",
            "echo ok",
        ]),
        probe_port: Some(22),
        verify_port: None,
        settle_secs: 0,
    };

    let emergency_vm = ChannelKind::command(
        "yc",
        &[
            "compute",
            "instance",
            "create",
            "--zone",
            "ru-central1-a",
            "--platform",
            "standard-v3",
            "--cores",
            "2",
            "--memory",
            "2GB",
            "--core-fraction",
            "5",
            "--preemptible",
            "--image-family",
            "ubuntu-2404-lts",
            "--ssh-key",
            "{home}/.ssh/id_ed25519.pub",
            "--format",
            "json",
        ],
    );

    let last_resort = ChannelKind::Sequence {
        steps: vec![
            yc_and_verify_ssh(&["compute", "instance", "restart", "--id", "{instance_id}"]),
            yc_and_verify_ssh(&["compute", "instance", "start", "--id", "{instance_id}"]),
        ],
    };

    vec![
        channel("ssh_os_login", 1, 30, ssh),
        channel(
            "yc_ssh",
            2,
            45,
            ChannelKind::command("yc", &["compute", "ssh", "--id", "{instance_id}", "--command", "echo ok"]),
        ),
        channel(
            "agent_tunnel",
            3,
            30,
            ChannelKind::Http {
                url: "http://{host}:8080/health".to_string(),
            },
        ),
        ChannelConfig {
            alert_on_failure: true,
            ..channel("emergency_vm", 4, 300, emergency_vm)
        },
        ChannelConfig {
            alert_on_failure: true,
            ..channel("last_resort", 5, 600, last_resort)
        },
    ]
}

// ─────────────────────────────────────────────────────────────────────────────
// Config
// ─────────────────────────────────────────────────────────────────────────────

/// Persisted configuration stored in `~/.lifeline/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub target: TargetConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub probe: ProbeSection,
    #[serde(default)]
    pub scenario: ScenarioSection,
    #[serde(default = "default_channels")]
    pub channels: Vec<ChannelConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target: TargetConfig::default(),
            notify: NotifyConfig::default(),
            probe: ProbeSection::default(),
            scenario: ScenarioSection::default(),
            channels: default_channels(),
        }
    }
}

impl Config {
    /// Build the validated, priority-ordered registry.
    pub fn build_registry(&self) -> Result<ChannelRegistry, ConfigError> {
        let mut builder = ChannelRegistry::builder();
        for channel in &self.channels {
            builder.register(
                ChannelDescriptor::new(
                    channel.name.clone(),
                    channel.priority,
                    Duration::from_secs(channel.timeout_secs),
                    channel.handler(&self.target),
                )
                .with_alert_on_failure(channel.alert_on_failure),
            );
        }
        Ok(builder.build()?)
    }

    /// `Some` when both a bot token and a chat id are configured.
    pub fn telegram(&self) -> Option<TelegramConfig> {
        let n = &self.notify;
        if n.telegram_bot_token.is_empty() || n.telegram_chat_id.is_empty() {
            return None;
        }
        Some(
            TelegramConfig::new(n.telegram_bot_token.clone(), n.telegram_chat_id.clone())
                .with_api_base(n.telegram_api_base.clone())
                .with_request_timeout(Duration::from_secs(n.timeout_secs)),
        )
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            target: self.target.name.clone(),
            notify_on_start: self.notify.notify_on_start,
            notify_timeout: Duration::from_secs(self.notify.timeout_secs),
        }
    }

    pub fn probe_config(&self) -> ProbeConfig {
        ProbeConfig {
            probe_timeout: Duration::from_secs(self.probe.timeout_secs),
            readiness_threshold: self.probe.readiness_threshold,
        }
    }

    pub fn scenario_config(&self) -> ScenarioConfig {
        ScenarioConfig {
            prefix_len: self.scenario.prefix_len,
            step_delay: Duration::from_millis(self.scenario.step_delay_ms),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Persistence
// ─────────────────────────────────────────────────────────────────────────────

/// Return the path to `~/.lifeline/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(&home_dir())
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".lifeline").join("config.toml")
}

/// Load the config, falling back to defaults when the file is absent.
/// Environment overrides apply either way.
pub fn load_or_default() -> Result<Config, ConfigError> {
    let mut cfg = load_from(&config_path())?.unwrap_or_default();
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Load the config from `path`.  Returns `None` if the file does not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    Ok(Some(toml::from_str(&raw)?))
}

/// Apply `LIFELINE_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `LIFELINE_TARGET_HOST` | `target.host` |
/// | `LIFELINE_TARGET_INSTANCE_ID` | `target.instance_id` |
/// | `LIFELINE_TELEGRAM_BOT_TOKEN` | `notify.telegram_bot_token` |
/// | `LIFELINE_TELEGRAM_CHAT_ID` | `notify.telegram_chat_id` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("LIFELINE_TARGET_HOST") {
        cfg.target.host = v;
    }
    if let Ok(v) = std::env::var("LIFELINE_TARGET_INSTANCE_ID") {
        cfg.target.instance_id = v;
    }
    if let Ok(v) = std::env::var("LIFELINE_TELEGRAM_BOT_TOKEN") {
        cfg.notify.telegram_bot_token = v;
    }
    if let Ok(v) = std::env::var("LIFELINE_TELEGRAM_CHAT_ID") {
        cfg.notify.telegram_chat_id = v;
    }
}

/// Save the config to `~/.lifeline/config.toml`.
pub fn save(cfg: &Config) -> Result<(), ConfigError> {
    save_to(cfg, &config_path())
}

/// Save the config to `path`, owner-only on Unix (0700 dir, 0600 file).
pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        let dir_err = |source| ConfigError::CreateDir {
            path: parent.display().to_string(),
            source,
        };
        fs::create_dir_all(parent).map_err(dir_err)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700)).map_err(dir_err)?;
        }
    }

    let raw = toml::to_string_pretty(cfg)?;
    let write_err = |source| ConfigError::Write {
        path: path.display().to_string(),
        source,
    };

    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(write_err)?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(write_err)?;

    Ok(())
}
