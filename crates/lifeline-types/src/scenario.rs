//! Result of a simulated rehearsal run.

use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{RecoverySession, duration_secs};

/// Outcome of `ScenarioRunner::run_scenario`.
///
/// `session` is produced by the real escalation loop running over simulated
/// channels only; `simulated` is always `true` so that rehearsal output can
/// never be mistaken for a real recovery record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ScenarioResult {
    #[serde(rename = "test_scenario")]
    pub scenario: String,
    pub problem: String,
    pub channels_tested: usize,
    pub simulated: bool,
    #[serde(rename = "test_time", with = "duration_secs")]
    #[schemars(with = "f64")]
    pub duration: Duration,
    pub session: RecoverySession,
}

impl ScenarioResult {
    /// `true` when the rehearsal reached a successful channel.
    pub fn recovered(&self) -> bool {
        self.session.succeeded()
    }
}
