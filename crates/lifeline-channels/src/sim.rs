//! In-process simulated channel for rehearsals and tests.
//!
//! [`SimChannel`] performs no I/O.  It waits for a synthetic delay, then
//! resolves according to a scripted [`SimBehavior`], and counts how often it
//! was invoked.  The scenario runner builds its rehearsal registry entirely
//! out of these, so a rehearsal can never touch real infrastructure.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use lifeline_channels::sim::{SimBehavior, SimChannel};
//! use lifeline_kernel::ChannelDescriptor;
//!
//! let ssh = Arc::new(
//!     SimChannel::new("ssh", SimBehavior::Fail("port 22 closed".into()))
//!         .with_delay(Duration::from_millis(500)),
//! );
//! let descriptor = ChannelDescriptor::new("ssh", 1, Duration::from_secs(30), ssh.clone());
//! assert_eq!(descriptor.name(), "ssh");
//! assert_eq!(ssh.attempts(), 0);
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use lifeline_kernel::{AttemptContext, ProbeContext, RecoveryChannel};
use lifeline_types::{ChannelError, ChannelOutcome, ErrorKind};

const METHOD: &str = "simulated";

/// Scripted result of [`SimChannel::attempt`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimBehavior {
    /// Resolve successfully after the delay.
    Succeed,
    /// Resolve with a [`ErrorKind::ChannelFault`] carrying the message.
    Fail(String),
    /// Never resolve on its own; return only once cancelled.
    Hang,
    /// Block the executor thread for the given time, ignoring cancellation.
    Block(Duration),
    /// Panic inside the attempt.
    Panic,
}

/// Scripted result of [`SimChannel::probe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimProbe {
    Available,
    Unavailable,
    /// Never answer.
    Hang,
    Fault(String),
}

/// A channel double with scripted behaviour and invocation counters.
#[derive(Debug)]
pub struct SimChannel {
    name: String,
    behavior: SimBehavior,
    delay: Duration,
    probe: SimProbe,
    probe_delay: Duration,
    attempts: AtomicUsize,
    probes: AtomicUsize,
}

impl SimChannel {
    pub fn new(name: impl Into<String>, behavior: SimBehavior) -> Self {
        Self {
            name: name.into(),
            behavior,
            delay: Duration::ZERO,
            probe: SimProbe::Available,
            probe_delay: Duration::ZERO,
            attempts: AtomicUsize::new(0),
            probes: AtomicUsize::new(0),
        }
    }

    /// Synthetic latency applied before the scripted behaviour.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_probe(mut self, probe: SimProbe) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_probe_delay(mut self, delay: Duration) -> Self {
        self.probe_delay = delay;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of times `attempt` has been invoked.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Number of times `probe` has been invoked.
    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    fn cancelled(&self) -> ChannelOutcome {
        ChannelOutcome::failure(METHOD, ErrorKind::Timeout, format!("{} cancelled", self.name))
    }
}

#[async_trait]
impl RecoveryChannel for SimChannel {
    async fn attempt(&self, ctx: AttemptContext) -> ChannelOutcome {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if ctx.until_cancelled(tokio::time::sleep(self.delay)).await.is_none() {
            return self.cancelled();
        }

        match &self.behavior {
            SimBehavior::Succeed => ChannelOutcome::success(METHOD).with_metadata("channel", &self.name),
            SimBehavior::Fail(message) => ChannelOutcome::fault(METHOD, message.clone()),
            SimBehavior::Hang => {
                ctx.cancelled().await;
                self.cancelled()
            }
            SimBehavior::Block(duration) => {
                std::thread::sleep(*duration);
                ChannelOutcome::fault(METHOD, format!("{} blocked for {duration:?}", self.name))
            }
            SimBehavior::Panic => panic!("simulated panic in channel '{}'", self.name),
        }
    }

    async fn probe(&self, _ctx: ProbeContext) -> Result<bool, ChannelError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.probe_delay).await;
        match &self.probe {
            SimProbe::Available => Ok(true),
            SimProbe::Unavailable => Ok(false),
            SimProbe::Hang => std::future::pending().await,
            SimProbe::Fault(message) => Err(ChannelError::new(ErrorKind::ProbeFault, message.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lifeline_kernel::CancelSignal;
    use std::sync::Arc;
    use tokio::time::Instant;

    fn ctx(signal: CancelSignal) -> AttemptContext {
        AttemptContext::new(Arc::from("rehearsal"), Instant::now() + Duration::from_secs(5), signal)
    }

    fn probe_ctx() -> ProbeContext {
        ProbeContext::new(Instant::now() + Duration::from_secs(3), CancelSignal::never())
    }

    #[tokio::test(start_paused = true)]
    async fn succeed_after_delay() {
        let ch = SimChannel::new("ssh", SimBehavior::Succeed).with_delay(Duration::from_millis(500));
        let start = Instant::now();
        let outcome = ch.attempt(ctx(CancelSignal::never())).await;
        assert!(outcome.success);
        assert_eq!(start.elapsed(), Duration::from_millis(500));
        assert_eq!(ch.attempts(), 1);
    }

    #[tokio::test]
    async fn fail_carries_message() {
        let ch = SimChannel::new("serial", SimBehavior::Fail("interactive only".into()));
        let outcome = ch.attempt(ctx(CancelSignal::never())).await;
        assert!(!outcome.success);
        assert_eq!(outcome.error_kind(), Some(ErrorKind::ChannelFault));
        assert_eq!(outcome.error.unwrap().message, "interactive only");
    }

    #[tokio::test(start_paused = true)]
    async fn hang_returns_on_cancel() {
        let ch = Arc::new(SimChannel::new("tunnel", SimBehavior::Hang));
        let (handle, signal) = CancelSignal::pair();
        let task = {
            let ch = ch.clone();
            tokio::spawn(async move { ch.attempt(ctx(signal)).await })
        };
        tokio::time::sleep(Duration::from_secs(10)).await;
        handle.cancel();
        let outcome = task.await.unwrap();
        assert_eq!(outcome.error_kind(), Some(ErrorKind::Timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_delay_short_circuits() {
        let ch = SimChannel::new("vm", SimBehavior::Succeed).with_delay(Duration::from_secs(300));
        let (handle, signal) = CancelSignal::pair();
        handle.cancel();
        let outcome = ch.attempt(ctx(signal)).await;
        assert!(!outcome.success);
    }

    #[tokio::test]
    async fn probe_scripts() {
        let up = SimChannel::new("a", SimBehavior::Succeed);
        let down = SimChannel::new("b", SimBehavior::Succeed).with_probe(SimProbe::Unavailable);
        let broken = SimChannel::new("c", SimBehavior::Succeed).with_probe(SimProbe::Fault("dns".into()));
        assert_eq!(up.probe(probe_ctx()).await, Ok(true));
        assert_eq!(down.probe(probe_ctx()).await, Ok(false));
        let err = broken.probe(probe_ctx()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::ProbeFault);
        assert_eq!(up.probes(), 1);
        assert_eq!(up.attempts(), 0);
    }
}
