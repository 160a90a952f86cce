//! [`AvailabilityProber`] – concurrent readiness check of every channel.
//!
//! All probes are spawned at once and joined.  Each probe gets its own short
//! deadline, independent of the channel's attempt timeout, so a single slow
//! probe delays the report by at most [`ProbeConfig::probe_timeout`].

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::Utc;
use futures_util::future::join_all;
use lifeline_kernel::{CancelSignal, ChannelDescriptor, ChannelRegistry, ProbeContext};
use lifeline_types::{AvailabilityReport, ChannelAvailability, ChannelError, ErrorKind};
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub probe_timeout: Duration,
    /// Minimum number of available channels for the report to be "ready".
    pub readiness_threshold: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(3),
            readiness_threshold: 2,
        }
    }
}

pub struct AvailabilityProber {
    registry: ChannelRegistry,
    config: ProbeConfig,
}

impl AvailabilityProber {
    pub fn new(registry: ChannelRegistry, config: ProbeConfig) -> Self {
        Self { registry, config }
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Probe every registered channel concurrently.
    pub async fn check_all(&self) -> AvailabilityReport {
        let check_time = Utc::now();
        let probes = self.registry.channels().iter().map(|d| self.probe_one(d));
        let channel_status: BTreeMap<String, ChannelAvailability> = join_all(probes).await.into_iter().collect();

        let report = AvailabilityReport::new(check_time, self.config.readiness_threshold, channel_status);
        info!(
            available = report.available_channels,
            total = report.total_channels,
            ready = report.recovery_readiness,
            "availability check complete"
        );
        report
    }

    async fn probe_one(&self, descriptor: &ChannelDescriptor) -> (String, ChannelAvailability) {
        let limit = self.config.probe_timeout;
        let started = Instant::now();
        let (cancel, signal) = CancelSignal::pair();
        let ctx = ProbeContext::new(started + limit, signal);
        let handler = descriptor.handler();
        let mut task = tokio::spawn(async move { handler.probe(ctx).await });

        let result = match tokio::time::timeout(limit, &mut task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(ChannelError::new(ErrorKind::ProbeFault, format!("probe task failed: {join}"))),
            Err(_) => {
                cancel.cancel();
                task.abort();
                Err(ChannelError::new(
                    ErrorKind::ProbeFault,
                    format!("probe timed out after {:.1}s", limit.as_secs_f64()),
                ))
            }
        };
        let check_duration = started.elapsed().min(limit);

        let (available, error) = match result {
            Ok(available) => (available, None),
            Err(e) => {
                warn!(channel = descriptor.name(), kind = %e.kind, error = %e.message, "probe failed");
                (false, Some(e))
            }
        };
        debug!(channel = descriptor.name(), available, "probe finished");

        (
            descriptor.name().to_string(),
            ChannelAvailability {
                available,
                check_duration,
                attempt_timeout: descriptor.timeout(),
                error,
            },
        )
    }
}
