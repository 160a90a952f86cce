//! Channel readiness report produced by the availability prober.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{ChannelError, duration_secs};

/// Probe result for a single channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ChannelAvailability {
    pub available: bool,
    /// Wall time the probe took (bounded by the probe timeout).
    #[serde(rename = "check_time", with = "duration_secs")]
    #[schemars(with = "f64")]
    pub check_duration: Duration,
    /// The channel's full attempt timeout, for context on dashboards.
    #[serde(rename = "timeout", with = "duration_secs")]
    #[schemars(with = "f64")]
    pub attempt_timeout: Duration,
    #[serde(flatten)]
    pub error: Option<ChannelError>,
}

/// Aggregate readiness of every registered channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AvailabilityReport {
    pub check_time: DateTime<Utc>,
    pub total_channels: usize,
    pub available_channels: usize,
    pub readiness_threshold: usize,
    /// `available_channels >= readiness_threshold`.
    pub recovery_readiness: bool,
    pub channel_status: BTreeMap<String, ChannelAvailability>,
}

impl AvailabilityReport {
    /// Build a report from per-channel results, computing the counts and the
    /// readiness flag.
    pub fn new(
        check_time: DateTime<Utc>,
        readiness_threshold: usize,
        channel_status: BTreeMap<String, ChannelAvailability>,
    ) -> Self {
        let available_channels = channel_status.values().filter(|s| s.available).count();
        Self {
            check_time,
            total_channels: channel_status.len(),
            available_channels,
            readiness_threshold,
            recovery_readiness: available_channels >= readiness_threshold,
            channel_status,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.recovery_readiness
    }

    /// Availability of `channel`, or `None` if it was not probed.
    pub fn is_available(&self, channel: &str) -> Option<bool> {
        self.channel_status.get(channel).map(|s| s.available)
    }

    /// Names of channels that answered their probe positively.
    pub fn available_names(&self) -> Vec<&str> {
        self.channel_status
            .iter()
            .filter(|(_, s)| s.available)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn status(available: bool) -> ChannelAvailability {
        ChannelAvailability {
            available,
            check_duration: Duration::from_millis(40),
            attempt_timeout: Duration::from_secs(30),
            error: (!available).then(|| ChannelError::new(ErrorKind::ProbeFault, "refused")),
        }
    }

    #[test]
    fn readiness_requires_threshold() {
        let mut map = BTreeMap::new();
        map.insert("ssh".to_string(), status(true));
        map.insert("serial".to_string(), status(false));
        let report = AvailabilityReport::new(Utc::now(), 2, map.clone());
        assert_eq!(report.available_channels, 1);
        assert!(!report.is_ready());

        map.insert("tunnel".to_string(), status(true));
        let report = AvailabilityReport::new(Utc::now(), 2, map);
        assert_eq!(report.total_channels, 3);
        assert!(report.is_ready());
        assert_eq!(report.available_names(), vec!["ssh", "tunnel"]);
    }

    #[test]
    fn zero_threshold_is_always_ready() {
        let report = AvailabilityReport::new(Utc::now(), 0, BTreeMap::new());
        assert!(report.is_ready());
    }

    #[test]
    fn report_json_shape() {
        let mut map = BTreeMap::new();
        map.insert("serial".to_string(), status(false));
        let report = AvailabilityReport::new(Utc::now(), 2, map);
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["recovery_readiness"], false);
        let serial = &value["channel_status"]["serial"];
        assert_eq!(serial["available"], false);
        assert_eq!(serial["error_kind"], "probe_fault");
        assert!((serial["timeout"].as_f64().unwrap() - 30.0).abs() < 1e-9);
        assert_eq!(report.is_available("serial"), Some(false));
        assert_eq!(report.is_available("ghost"), None);
    }
}
