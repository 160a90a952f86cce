//! [`ChannelOutcome`] – the value every channel attempt resolves to.

use std::collections::BTreeMap;
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ErrorKind;

/// Classified failure attached to an unsuccessful outcome.
///
/// Serialised flat into its parent record as `error` (message) and
/// `error_kind`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ChannelError {
    #[serde(rename = "error_kind")]
    pub kind: ErrorKind,
    #[serde(rename = "error")]
    pub message: String,
}

impl ChannelError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ChannelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Result of one channel invocation.
///
/// Channels never raise to the orchestrator; every failure mode, including
/// internal faults, is expressed as `success = false` plus a
/// [`ChannelError`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ChannelOutcome {
    pub success: bool,
    /// Mechanism that produced the outcome (e.g. `"ssh"`, `"tcp"`).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub method: String,
    #[serde(flatten)]
    pub error: Option<ChannelError>,
    /// Method-specific details (exit codes, peer addresses, VM ids, …).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl ChannelOutcome {
    /// A successful outcome produced by `method`.
    pub fn success(method: impl Into<String>) -> Self {
        Self {
            success: true,
            method: method.into(),
            error: None,
            metadata: BTreeMap::new(),
        }
    }

    /// A failed outcome with an explicit error kind.
    pub fn failure(method: impl Into<String>, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            method: method.into(),
            error: Some(ChannelError::new(kind, message)),
            metadata: BTreeMap::new(),
        }
    }

    /// A [`ErrorKind::ChannelFault`] failure.
    pub fn fault(method: impl Into<String>, message: impl Into<String>) -> Self {
        Self::failure(method, ErrorKind::ChannelFault, message)
    }

    /// The outcome recorded when a channel exceeds its `timeout`.
    pub fn timed_out(timeout: Duration) -> Self {
        Self::failure(
            "",
            ErrorKind::Timeout,
            format!("Timeout after {:.1}s", timeout.as_secs_f64()),
        )
    }

    /// Attach a metadata entry, builder style.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Kind of the attached error, if any.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}
