//! Recovery session records.
//!
//! A [`SessionRecorder`] is the append-only, in-progress form of a run.  Once
//! [`SessionRecorder::finish`] is called the result is a [`RecoverySession`]
//! whose fields can only be read, which is how the "terminal once returned"
//! guarantee is expressed in the type system.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use chrono::Utc;
//! use lifeline_types::{AttemptRecord, ChannelOutcome, SessionRecorder};
//!
//! let mut recorder = SessionRecorder::new("Connection lost");
//! recorder
//!     .record(AttemptRecord::new(
//!         "ssh",
//!         Utc::now(),
//!         Duration::from_millis(120),
//!         ChannelOutcome::success("ssh"),
//!     ))
//!     .unwrap();
//!
//! let session = recorder.finish(Duration::from_millis(130));
//! assert!(session.succeeded());
//! assert_eq!(session.successful_channel(), Some("ssh"));
//! ```

use std::time::Duration;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{ChannelOutcome, ErrorKind, LifelineError, duration_secs};

// ─────────────────────────────────────────────────────────────────────────────
// AttemptRecord
// ─────────────────────────────────────────────────────────────────────────────

/// One bounded invocation of a channel within a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AttemptRecord {
    #[serde(rename = "channel")]
    pub channel_name: String,
    pub started_at: DateTime<Utc>,
    #[serde(rename = "time", with = "duration_secs")]
    #[schemars(with = "f64")]
    pub duration: Duration,
    #[serde(flatten)]
    pub outcome: ChannelOutcome,
}

impl AttemptRecord {
    pub fn new(
        channel_name: impl Into<String>,
        started_at: DateTime<Utc>,
        duration: Duration,
        outcome: ChannelOutcome,
    ) -> Self {
        Self {
            channel_name: channel_name.into(),
            started_at,
            duration,
            outcome,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.outcome.success
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.outcome.error_kind()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RecoverySession
// ─────────────────────────────────────────────────────────────────────────────

/// The complete, terminal record of one escalation run.
///
/// Serialises to the audit schema
/// `{start_time, problem, attempts, success, successful_channel?, total_time}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RecoverySession {
    #[serde(rename = "start_time")]
    started_at: DateTime<Utc>,
    problem: String,
    attempts: Vec<AttemptRecord>,
    #[serde(rename = "success")]
    succeeded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    successful_channel: Option<String>,
    #[serde(rename = "total_time", with = "duration_secs")]
    #[schemars(with = "f64")]
    total_duration: Duration,
}

impl RecoverySession {
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn problem(&self) -> &str {
        &self.problem
    }

    /// Attempts in the order they were made.
    pub fn attempts(&self) -> &[AttemptRecord] {
        &self.attempts
    }

    pub fn succeeded(&self) -> bool {
        self.succeeded
    }

    pub fn successful_channel(&self) -> Option<&str> {
        self.successful_channel.as_deref()
    }

    pub fn total_duration(&self) -> Duration {
        self.total_duration
    }

    /// Channel names in attempt order.
    pub fn attempted_channels(&self) -> Vec<&str> {
        self.attempts.iter().map(|a| a.channel_name.as_str()).collect()
    }

    /// Pretty-printed audit JSON.
    pub fn to_json_pretty(&self) -> Result<String, LifelineError> {
        serde_json::to_string_pretty(self).map_err(|e| LifelineError::Serialization(e.to_string()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SessionRecorder
// ─────────────────────────────────────────────────────────────────────────────

/// Append-only builder for a [`RecoverySession`].
///
/// Refuses further attempts once a successful attempt has been recorded.
#[derive(Debug)]
pub struct SessionRecorder {
    started_at: DateTime<Utc>,
    problem: String,
    attempts: Vec<AttemptRecord>,
    successful_channel: Option<String>,
}

impl SessionRecorder {
    /// Open a new session stamped with the current wall-clock time.
    pub fn new(problem: impl Into<String>) -> Self {
        Self {
            started_at: Utc::now(),
            problem: problem.into(),
            attempts: Vec::new(),
            successful_channel: None,
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn problem(&self) -> &str {
        &self.problem
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.len()
    }

    /// `true` once a successful attempt has been recorded.
    pub fn is_resolved(&self) -> bool {
        self.successful_channel.is_some()
    }

    /// Append `attempt`.
    ///
    /// # Errors
    ///
    /// Returns [`LifelineError::SessionResolved`] if a previous attempt already
    /// succeeded.
    pub fn record(&mut self, attempt: AttemptRecord) -> Result<(), LifelineError> {
        if let Some(resolved_by) = &self.successful_channel {
            return Err(LifelineError::SessionResolved {
                resolved_by: resolved_by.clone(),
                channel: attempt.channel_name,
            });
        }
        if attempt.succeeded() {
            self.successful_channel = Some(attempt.channel_name.clone());
        }
        self.attempts.push(attempt);
        Ok(())
    }

    /// Close the session.
    ///
    /// `total_duration` is raised to the sum of the attempt durations if the
    /// caller's measurement came out lower, so the total always covers every
    /// attempt.
    pub fn finish(self, total_duration: Duration) -> RecoverySession {
        let attempts_sum: Duration = self.attempts.iter().map(|a| a.duration).sum();
        RecoverySession {
            started_at: self.started_at,
            problem: self.problem,
            succeeded: self.successful_channel.is_some(),
            successful_channel: self.successful_channel,
            attempts: self.attempts,
            total_duration: total_duration.max(attempts_sum),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(name: &str, ok: bool, millis: u64) -> AttemptRecord {
        let outcome = if ok {
            ChannelOutcome::success(name)
        } else {
            ChannelOutcome::fault(name, "refused")
        };
        AttemptRecord::new(name, Utc::now(), Duration::from_millis(millis), outcome)
    }

    #[test]
    fn failed_session_has_no_successful_channel() {
        let mut rec = SessionRecorder::new("VM unreachable");
        rec.record(attempt("ssh", false, 10)).unwrap();
        rec.record(attempt("serial", false, 20)).unwrap();
        let session = rec.finish(Duration::from_millis(40));
        assert!(!session.succeeded());
        assert_eq!(session.successful_channel(), None);
        assert_eq!(session.attempted_channels(), vec!["ssh", "serial"]);
    }

    #[test]
    fn record_after_success_is_rejected() {
        let mut rec = SessionRecorder::new("Connection lost");
        rec.record(attempt("ssh", true, 10)).unwrap();
        assert!(rec.is_resolved());
        let err = rec.record(attempt("serial", false, 10)).unwrap_err();
        assert!(matches!(err, LifelineError::SessionResolved { .. }));
        assert_eq!(rec.attempt_count(), 1);
    }

    #[test]
    fn finish_covers_attempt_durations() {
        let mut rec = SessionRecorder::new("p");
        rec.record(attempt("a", false, 300)).unwrap();
        rec.record(attempt("b", false, 200)).unwrap();
        let session = rec.finish(Duration::from_millis(100));
        assert!(session.total_duration() >= Duration::from_millis(500));
    }

    #[test]
    fn session_json_uses_audit_field_names() {
        let mut rec = SessionRecorder::new("Connection lost");
        rec.record(attempt("ssh", false, 1500)).unwrap();
        rec.record(attempt("tunnel", true, 250)).unwrap();
        let session = rec.finish(Duration::from_millis(1800));

        let value = serde_json::to_value(&session).unwrap();
        for key in ["start_time", "problem", "attempts", "success", "successful_channel", "total_time"] {
            assert!(value.get(key).is_some(), "missing key {key}");
        }
        assert_eq!(value["success"], true);
        assert_eq!(value["successful_channel"], "tunnel");
        assert!((value["total_time"].as_f64().unwrap() - 1.8).abs() < 1e-9);

        let first = &value["attempts"][0];
        assert_eq!(first["channel"], "ssh");
        assert_eq!(first["success"], false);
        assert!((first["time"].as_f64().unwrap() - 1.5).abs() < 1e-9);
        assert_eq!(first["error"], "refused");
        assert!(value["attempts"][1].get("error").is_none());
    }

    #[test]
    fn failed_session_json_omits_successful_channel() {
        let mut rec = SessionRecorder::new("p");
        rec.record(attempt("a", false, 1)).unwrap();
        let value = serde_json::to_value(rec.finish(Duration::from_millis(1))).unwrap();
        assert!(value.get("successful_channel").is_none());
        assert_eq!(value["success"], false);
    }

    #[test]
    fn session_json_reads_back() {
        let mut rec = SessionRecorder::new("p");
        rec.record(attempt("a", false, 5)).unwrap();
        rec.record(attempt("b", true, 5)).unwrap();
        let session = rec.finish(Duration::from_millis(12));
        let json = session.to_json_pretty().unwrap();
        let back: RecoverySession = serde_json::from_str(&json).unwrap();
        assert_eq!(back.successful_channel(), Some("b"));
        assert_eq!(back.attempts().len(), 2);
        assert_eq!(back.attempts()[0].error_kind(), Some(ErrorKind::ChannelFault));
    }
}
