//! `lifeline-types` – shared data model for the Lifeline recovery stack.
//!
//! Everything a recovery run produces is described here: per-channel
//! [`ChannelOutcome`]s, the [`AttemptRecord`]s built from them, the aggregate
//! [`RecoverySession`] and the [`AvailabilityReport`] emitted by the prober.
//! All records serialise to the JSON audit schema consumed by downstream
//! tooling, so field names are part of the public contract.

pub mod availability;
pub mod outcome;
pub mod scenario;
pub mod session;

pub use availability::{AvailabilityReport, ChannelAvailability};
pub use outcome::{ChannelError, ChannelOutcome};
pub use scenario::ScenarioResult;
pub use session::{AttemptRecord, RecoverySession, SessionRecorder};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure taxonomy shared by channels, probes and notifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The channel did not return within its configured bound.
    Timeout,
    /// The channel reported (or suffered) an internal error.
    ChannelFault,
    /// An availability probe failed or did not answer in time.
    ProbeFault,
    /// Alert delivery failed.
    NotifyFault,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Timeout => write!(f, "timeout"),
            ErrorKind::ChannelFault => write!(f, "channel_fault"),
            ErrorKind::ProbeFault => write!(f, "probe_fault"),
            ErrorKind::NotifyFault => write!(f, "notify_fault"),
        }
    }
}

/// Errors raised while assembling recovery records.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifelineError {
    #[error("Session already resolved by '{resolved_by}'; refusing attempt on '{channel}'")]
    SessionResolved { resolved_by: String, channel: String },

    #[error("Serialization Error: {0}")]
    Serialization(String),
}

/// Serde adapter that writes a [`std::time::Duration`] as fractional seconds.
///
/// The audit schema stores every duration (`time`, `total_time`,
/// `check_time`) as a float number of seconds.
pub mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
