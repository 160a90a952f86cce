//! [`EscalationOrchestrator`] – the strictly sequential recovery loop.
//!
//! Each call to [`EscalationOrchestrator::recover`]:
//!
//! 1. **Open** – starts a [`SessionRecorder`] stamped with the current time
//!    and (optionally) announces the session through the [`Notifier`].
//! 2. **Escalate** – walks the [`ChannelRegistry`] in ascending priority.
//!    Every attempt runs on its own Tokio task, bounded by the channel's
//!    timeout.  When the timer fires the attempt's [`CancelSignal`] is
//!    tripped, a `timeout` attempt is recorded, and the loop moves on
//!    without waiting for the lagging task.
//! 3. **Resolve** – stops at the first success.  Exhaustion is returned as
//!    data (`succeeded == false`), never as an error and never retried.
//! 4. **Report** – closes the session and sends the terminal alert.
//!
//! Alerts are best-effort.  Each is bounded by
//! [`OrchestratorConfig::notify_timeout`]; a failed or slow delivery is logged
//! as a `notify_fault` and does not change the session.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use lifeline_channels::TcpPortChannel;
//! use lifeline_kernel::{ChannelDescriptor, ChannelRegistry};
//! use lifeline_notify::LogNotifier;
//! use lifeline_runtime::{EscalationOrchestrator, OrchestratorConfig};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = ChannelRegistry::builder()
//!     .with(ChannelDescriptor::new(
//!         "ssh_port",
//!         1,
//!         Duration::from_secs(10),
//!         Arc::new(TcpPortChannel::new("vm.internal", 22)),
//!     ))
//!     .build()?;
//!
//! let orchestrator =
//!     EscalationOrchestrator::new(registry, Arc::new(LogNotifier), OrchestratorConfig::default());
//! let session = orchestrator.recover("SSH connection timeout").await;
//! println!("{}", session.to_json_pretty()?);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use lifeline_kernel::{AttemptContext, CancelSignal, ChannelDescriptor, ChannelRegistry};
use lifeline_notify::Notifier;
use lifeline_types::{AttemptRecord, ChannelOutcome, ErrorKind, RecoverySession, SessionRecorder};
use tokio::time::Instant;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration bundle for [`EscalationOrchestrator`].
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Human-readable name of the protected system, used in alert text.
    pub target: String,
    /// Send an alert when a session opens.
    pub notify_on_start: bool,
    /// Upper bound on every notifier call.
    pub notify_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            target: "primary host".to_string(),
            notify_on_start: true,
            notify_timeout: Duration::from_secs(10),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// EscalationOrchestrator
// ─────────────────────────────────────────────────────────────────────────────

/// Runs recovery sessions over an immutable channel registry.
///
/// Holds no per-session state, so one instance can serve any number of
/// sequential or concurrent `recover` calls; each call replays from the first
/// channel.
pub struct EscalationOrchestrator {
    registry: ChannelRegistry,
    notifier: Arc<dyn Notifier>,
    config: OrchestratorConfig,
}

impl EscalationOrchestrator {
    pub fn new(registry: ChannelRegistry, notifier: Arc<dyn Notifier>, config: OrchestratorConfig) -> Self {
        Self {
            registry,
            notifier,
            config,
        }
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Escalate through every channel until one succeeds or all are spent.
    pub async fn recover(&self, problem: &str) -> RecoverySession {
        let session_id = Uuid::new_v4();
        let span = info_span!("recovery_session", %session_id, target_name = %self.config.target);
        self.run(problem).instrument(span).await
    }

    async fn run(&self, problem: &str) -> RecoverySession {
        let clock = Instant::now();
        let mut recorder = SessionRecorder::new(problem);
        let shared_problem: Arc<str> = Arc::from(problem);

        info!(problem, channels = self.registry.len(), "recovery session opened");
        if self.config.notify_on_start {
            self.alert(&format!(
                "Recovery started for {}\nProblem: {problem}\nChannels: {}",
                self.config.target,
                self.registry.names().join(" -> ")
            ))
            .await;
        }

        for descriptor in self.registry.channels() {
            let record = self.attempt(descriptor, shared_problem.clone()).await;
            let succeeded = record.succeeded();
            let failure = record.outcome.error.clone();

            if let Err(e) = recorder.record(record) {
                // Only reachable if the loop kept going after a success.
                error!(error = %e, "attempt rejected by session recorder");
                break;
            }
            if succeeded {
                break;
            }
            if descriptor.alert_on_failure() {
                let reason = failure.map(|e| e.to_string()).unwrap_or_else(|| "unknown".to_string());
                self.alert(&format!("Channel {} failed: {reason}", descriptor.name())).await;
            }
        }

        let session = recorder.finish(clock.elapsed());
        let total = session.total_duration().as_secs_f64();

        match session.successful_channel() {
            Some(channel) => {
                info!(channel, total_secs = total, "recovery succeeded");
                self.alert(&format!(
                    "{} recovered via {channel} in {total:.1}s",
                    self.config.target
                ))
                .await;
            }
            None => {
                error!(
                    attempts = session.attempts().len(),
                    total_secs = total,
                    "all recovery channels exhausted"
                );
                self.alert(&format!(
                    "Recovery FAILED for {}: {} channels attempted in {total:.1}s\nProblem: {problem}\nManual intervention required",
                    self.config.target,
                    session.attempts().len()
                ))
                .await;
            }
        }

        session
    }

    /// One bounded attempt.  Never fails; every failure mode becomes data.
    async fn attempt(&self, descriptor: &ChannelDescriptor, problem: Arc<str>) -> AttemptRecord {
        let name = descriptor.name();
        let limit = descriptor.timeout();
        let started_at = Utc::now();
        let started = Instant::now();

        info!(channel = name, priority = descriptor.priority(), timeout_secs = limit.as_secs_f64(), "attempting channel");

        let (cancel, signal) = CancelSignal::pair();
        let ctx = AttemptContext::new(problem, started + limit, signal);
        let handler = descriptor.handler();
        let mut task = tokio::spawn(async move { handler.attempt(ctx).await });

        let (outcome, duration) = match tokio::time::timeout(limit, &mut task).await {
            Ok(Ok(outcome)) => (outcome, started.elapsed()),
            Ok(Err(join)) => {
                let outcome = ChannelOutcome::failure("", ErrorKind::ChannelFault, format!("channel task failed: {join}"));
                (outcome, started.elapsed())
            }
            Err(_) => {
                // The task is detached; it observes the signal and winds down
                // on its own while escalation continues.
                cancel.cancel();
                (ChannelOutcome::timed_out(limit), started.elapsed().max(limit))
            }
        };

        match &outcome.error {
            None => info!(channel = name, secs = duration.as_secs_f64(), "channel succeeded"),
            Some(e) => warn!(
                channel = name,
                kind = %e.kind,
                secs = duration.as_secs_f64(),
                error = %e.message,
                "channel failed"
            ),
        }

        AttemptRecord::new(name, started_at, duration, outcome)
    }

    /// Best-effort, bounded alert.
    async fn alert(&self, message: &str) {
        let notifier = self.notifier.clone();
        let message = message.to_string();
        let mut task = tokio::spawn(async move { notifier.notify(&message).await }.in_current_span());

        match tokio::time::timeout(self.config.notify_timeout, &mut task).await {
            Ok(Ok(true)) => {}
            Ok(Ok(false)) => warn!(kind = %ErrorKind::NotifyFault, "alert not delivered"),
            Ok(Err(e)) => warn!(kind = %ErrorKind::NotifyFault, error = %e, "notifier panicked"),
            Err(_) => {
                task.abort();
                warn!(
                    kind = %ErrorKind::NotifyFault,
                    timeout_secs = self.config.notify_timeout.as_secs_f64(),
                    "alert timed out"
                );
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use lifeline_channels::{SimBehavior, SimChannel};
    use lifeline_notify::NullNotifier;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sim(name: &str, behavior: SimBehavior) -> Arc<SimChannel> {
        Arc::new(SimChannel::new(name, behavior))
    }

    fn registry(channels: &[(&Arc<SimChannel>, u64)]) -> ChannelRegistry {
        let mut builder = ChannelRegistry::builder();
        for (priority, (ch, timeout)) in channels.iter().enumerate() {
            builder.register(ChannelDescriptor::new(
                ch.name(),
                priority as u32 + 1,
                Duration::from_secs(*timeout),
                (*ch).clone(),
            ));
        }
        builder.build().unwrap()
    }

    fn orchestrator(registry: ChannelRegistry, notifier: Arc<dyn Notifier>) -> EscalationOrchestrator {
        EscalationOrchestrator::new(registry, notifier, OrchestratorConfig::default())
    }

    /// Records every message and answers with a fixed result.
    struct Recording {
        delivered: bool,
        messages: Mutex<Vec<String>>,
    }

    impl Recording {
        fn new(delivered: bool) -> Arc<Self> {
            Arc::new(Self { delivered, messages: Mutex::new(Vec::new()) })
        }

        fn messages(&self) -> Vec<String> {
            self.messages.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for Recording {
        async fn notify(&self, message: &str) -> bool {
            self.messages.lock().unwrap().push(message.to_string());
            self.delivered
        }
    }

    /// Never answers.
    struct Stalled(AtomicUsize);

    #[async_trait]
    impl Notifier for Stalled {
        async fn notify(&self, _message: &str) -> bool {
            self.0.fetch_add(1, Ordering::SeqCst);
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn first_success_stops_escalation() {
        let a = sim("ssh", SimBehavior::Fail("refused".into()));
        let b = sim("agent", SimBehavior::Succeed);
        let c = sim("reboot", SimBehavior::Succeed);
        let orch = orchestrator(registry(&[(&a, 5), (&b, 5), (&c, 5)]), Arc::new(NullNotifier));

        let session = orch.recover("SSH connection timeout").await;

        assert!(session.succeeded());
        assert_eq!(session.successful_channel(), Some("agent"));
        assert_eq!(session.attempted_channels(), vec!["ssh", "agent"]);
        assert_eq!(c.attempts(), 0);
        assert_eq!(session.problem(), "SSH connection timeout");
    }

    #[tokio::test]
    async fn exhaustion_is_returned_as_data() {
        let a = sim("ssh", SimBehavior::Fail("refused".into()));
        let b = sim("agent", SimBehavior::Fail("no route".into()));
        let orch = orchestrator(registry(&[(&a, 5), (&b, 5)]), Arc::new(NullNotifier));

        let session = orch.recover("VM completely unreachable").await;

        assert!(!session.succeeded());
        assert_eq!(session.successful_channel(), None);
        assert_eq!(session.attempts().len(), 2);
        assert!(session.attempts().iter().all(|a| a.error_kind() == Some(ErrorKind::ChannelFault)));
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_channel_times_out_and_escalation_continues() {
        let a = sim("tunnel", SimBehavior::Hang);
        let b = sim("ssh", SimBehavior::Succeed);
        let orch = orchestrator(registry(&[(&a, 2), (&b, 5)]), Arc::new(NullNotifier));

        let session = orch.recover("agent down").await;

        let hung = &session.attempts()[0];
        assert_eq!(hung.error_kind(), Some(ErrorKind::Timeout));
        assert!(hung.duration >= Duration::from_secs(2));
        assert!(hung.duration <= Duration::from_secs(2) + Duration::from_millis(50));
        assert_eq!(session.successful_channel(), Some("ssh"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn uncancellable_channel_does_not_hold_the_loop() {
        let a = sim("stuck", SimBehavior::Block(Duration::from_secs(3)));
        let b = sim("fallback", SimBehavior::Succeed);
        let orch = orchestrator(registry(&[(&a, 1), (&b, 5)]), Arc::new(NullNotifier));

        let wall = std::time::Instant::now();
        let session = orch.recover("blocked handler").await;

        assert_eq!(session.attempts()[0].error_kind(), Some(ErrorKind::Timeout));
        assert_eq!(session.successful_channel(), Some("fallback"));
        assert!(wall.elapsed() < Duration::from_millis(2500));
    }

    #[tokio::test]
    async fn panicking_channel_is_a_channel_fault() {
        let a = sim("broken", SimBehavior::Panic);
        let b = sim("ssh", SimBehavior::Succeed);
        let orch = orchestrator(registry(&[(&a, 5), (&b, 5)]), Arc::new(NullNotifier));

        let session = orch.recover("panic").await;

        assert_eq!(session.attempts()[0].error_kind(), Some(ErrorKind::ChannelFault));
        assert!(session.succeeded());
    }

    #[tokio::test(start_paused = true)]
    async fn total_covers_every_attempt() {
        let a = Arc::new(SimChannel::new("a", SimBehavior::Fail("x".into())).with_delay(Duration::from_millis(300)));
        let b = Arc::new(SimChannel::new("b", SimBehavior::Hang));
        let c = Arc::new(SimChannel::new("c", SimBehavior::Fail("y".into())).with_delay(Duration::from_millis(700)));
        let orch = orchestrator(registry(&[(&a, 5), (&b, 1), (&c, 5)]), Arc::new(NullNotifier));

        let session = orch.recover("slow").await;

        let sum: Duration = session.attempts().iter().map(|a| a.duration).sum();
        assert_eq!(session.attempts().len(), 3);
        assert!(session.total_duration() >= sum);
        assert!(sum >= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn recover_is_idempotent() {
        let a = sim("a", SimBehavior::Fail("x".into()));
        let b = sim("b", SimBehavior::Fail("y".into()));
        let c = sim("c", SimBehavior::Fail("z".into()));
        let orch = orchestrator(registry(&[(&a, 5), (&b, 5), (&c, 5)]), Arc::new(NullNotifier));

        let first = orch.recover("flapping").await;
        let second = orch.recover("flapping").await;

        assert_eq!(first.attempted_channels(), second.attempted_channels());
        assert_eq!(first.attempts().len(), 3);
        assert_eq!(a.attempts(), 2);
    }

    #[tokio::test]
    async fn failing_notifier_does_not_change_the_session() {
        let notifier = Recording::new(false);
        let a = sim("ssh", SimBehavior::Succeed);
        let orch = orchestrator(registry(&[(&a, 5)]), notifier.clone());

        let session = orch.recover("SSH connection timeout").await;

        assert!(session.succeeded());
        // Start and success alerts were both attempted.
        assert_eq!(notifier.messages().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_notifier_is_bounded() {
        let notifier = Arc::new(Stalled(AtomicUsize::new(0)));
        let a = sim("ssh", SimBehavior::Succeed);
        let config = OrchestratorConfig {
            notify_timeout: Duration::from_secs(1),
            ..OrchestratorConfig::default()
        };
        let orch = EscalationOrchestrator::new(registry(&[(&a, 5)]), notifier.clone(), config);

        let clock = Instant::now();
        let session = orch.recover("stall").await;

        assert!(session.succeeded());
        assert_eq!(notifier.0.load(Ordering::SeqCst), 2);
        assert!(clock.elapsed() < Duration::from_secs(3));
    }

    struct Panicking;

    #[async_trait]
    impl Notifier for Panicking {
        async fn notify(&self, _message: &str) -> bool {
            panic!("alert surface crashed");
        }
    }

    #[tokio::test]
    async fn panicking_notifier_still_yields_a_session() {
        let a = sim("ssh", SimBehavior::Fail("refused".into()));
        let b = sim("agent", SimBehavior::Succeed);
        let orch = orchestrator(registry(&[(&a, 5), (&b, 5)]), Arc::new(Panicking));

        let session = tokio::spawn(async move { orch.recover("x").await }).await.unwrap();

        assert!(session.succeeded());
        assert_eq!(session.successful_channel(), Some("agent"));
        assert_eq!(session.attempted_channels(), vec!["ssh", "agent"]);
    }

    #[tokio::test]
    async fn alert_texts_follow_the_session() {
        let notifier = Recording::new(true);
        let a = sim("ssh", SimBehavior::Fail("refused".into()));
        let b = sim("agent", SimBehavior::Fail("down".into()));
        let mut builder = ChannelRegistry::builder();
        builder
            .register(ChannelDescriptor::new("ssh", 1, Duration::from_secs(5), a.clone()).with_alert_on_failure(true))
            .register(ChannelDescriptor::new("agent", 2, Duration::from_secs(5), b.clone()));
        let config = OrchestratorConfig {
            target: "tpu-vm".into(),
            ..OrchestratorConfig::default()
        };
        let orch = EscalationOrchestrator::new(builder.build().unwrap(), notifier.clone(), config);

        orch.recover("Network connectivity problems").await;

        let messages = notifier.messages();
        assert_eq!(messages.len(), 3);
        assert!(messages[0].contains("ssh -> agent"));
        assert!(messages[1].starts_with("Channel ssh failed"));
        assert!(messages[2].contains("FAILED for tpu-vm: 2 channels"));
    }

    #[tokio::test]
    async fn start_alert_can_be_disabled() {
        let notifier = Recording::new(true);
        let a = sim("ssh", SimBehavior::Succeed);
        let config = OrchestratorConfig {
            notify_on_start: false,
            ..OrchestratorConfig::default()
        };
        let orch = EscalationOrchestrator::new(registry(&[(&a, 5)]), notifier.clone(), config);

        orch.recover("x").await;

        let messages = notifier.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("recovered via ssh"));
    }
}
