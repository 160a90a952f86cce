//! [`ScenarioRunner`] – rehearse an escalation without touching anything.
//!
//! The runner mirrors the first [`ScenarioConfig::prefix_len`] channels of the
//! live registry (names, priorities and timeouts) as [`SimChannel`]s and runs
//! the real [`EscalationOrchestrator`] over them with alerts suppressed.  The
//! live channel handlers are never called.
//!
//! Built-in scenarios script which channel of the prefix "recovers":
//!
//! | name | problem | succeeds at |
//! |---|---|---|
//! | `connection_lost` | SSH connection timeout | 2nd |
//! | `service_down` | API service not responding | 1st |
//! | `vm_unreachable` | VM completely unreachable | never |
//! | `network_issue` | Network connectivity problems | 3rd |
//!
//! Any other name is used verbatim as the problem and never recovers.

use std::sync::Arc;
use std::time::Duration;

use lifeline_channels::{SimBehavior, SimChannel};
use lifeline_kernel::{ChannelDescriptor, ChannelRegistry, RegistryError};
use lifeline_notify::NullNotifier;
use lifeline_types::ScenarioResult;
use tokio::time::Instant;
use tracing::info;

use crate::orchestrator::{EscalationOrchestrator, OrchestratorConfig};

/// Name used when none is given.
pub const DEFAULT_SCENARIO: &str = "connection_lost";

/// A built-in rehearsal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scenario {
    pub name: &'static str,
    pub problem: &'static str,
    /// Zero-based index into the channel prefix of the scripted success.
    pub succeeds_at: Option<usize>,
}

const CATALOGUE: &[Scenario] = &[
    Scenario {
        name: "connection_lost",
        problem: "SSH connection timeout",
        succeeds_at: Some(1),
    },
    Scenario {
        name: "service_down",
        problem: "API service not responding",
        succeeds_at: Some(0),
    },
    Scenario {
        name: "vm_unreachable",
        problem: "VM completely unreachable",
        succeeds_at: None,
    },
    Scenario {
        name: "network_issue",
        problem: "Network connectivity problems",
        succeeds_at: Some(2),
    },
];

/// Every built-in scenario.
pub fn catalogue() -> &'static [Scenario] {
    CATALOGUE
}

/// Resolve `name` to a catalogue entry, or an ad-hoc scenario that never
/// recovers.
fn resolve(name: &str) -> (String, Option<usize>) {
    CATALOGUE
        .iter()
        .find(|s| s.name == name)
        .map(|s| (s.problem.to_string(), s.succeeds_at))
        .unwrap_or_else(|| (name.to_string(), None))
}

#[derive(Debug, Clone)]
pub struct ScenarioConfig {
    /// How many channels from the head of the registry take part.
    pub prefix_len: usize,
    /// Synthetic latency of every simulated attempt.
    pub step_delay: Duration,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            prefix_len: 3,
            step_delay: Duration::from_millis(500),
        }
    }
}

pub struct ScenarioRunner {
    registry: ChannelRegistry,
    config: ScenarioConfig,
}

impl ScenarioRunner {
    pub fn new(registry: ChannelRegistry, config: ScenarioConfig) -> Self {
        Self { registry, config }
    }

    /// Rehearse `name` against the simulated prefix.
    ///
    /// # Errors
    ///
    /// [`RegistryError::Empty`] when `prefix_len` is zero.
    pub async fn run_scenario(&self, name: &str) -> Result<ScenarioResult, RegistryError> {
        let (problem, succeeds_at) = resolve(name);
        let shadow = self.shadow_registry(succeeds_at)?;
        let channels_tested = shadow.len();

        info!(scenario = name, channels = channels_tested, "rehearsal started");

        let orchestrator = EscalationOrchestrator::new(
            shadow,
            Arc::new(NullNotifier),
            OrchestratorConfig {
                target: format!("rehearsal:{name}"),
                notify_on_start: false,
                ..OrchestratorConfig::default()
            },
        );

        let clock = Instant::now();
        let session = orchestrator.recover(&problem).await;
        let duration = clock.elapsed();

        info!(scenario = name, recovered = session.succeeded(), "rehearsal finished");

        Ok(ScenarioResult {
            scenario: name.to_string(),
            problem,
            channels_tested,
            simulated: true,
            duration,
            session,
        })
    }

    fn shadow_registry(&self, succeeds_at: Option<usize>) -> Result<ChannelRegistry, RegistryError> {
        let mut builder = ChannelRegistry::builder();
        for (index, live) in self.registry.prefix(self.config.prefix_len).iter().enumerate() {
            let behavior = if succeeds_at == Some(index) {
                SimBehavior::Succeed
            } else {
                SimBehavior::Fail(format!("simulated failure of {}", live.name()))
            };
            let sim = SimChannel::new(live.name(), behavior).with_delay(self.config.step_delay);
            builder.register(
                ChannelDescriptor::new(live.name(), live.priority(), live.timeout(), Arc::new(sim))
                    .with_alert_on_failure(live.alert_on_failure()),
            );
        }
        builder.build()
    }
}
