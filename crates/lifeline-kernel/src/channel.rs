//! The channel capability contract.
//!
//! Every recovery mechanism (SSH login, cloud CLI, serial console, agent
//! tunnel, emergency provisioning, …) is reduced to a [`RecoveryChannel`]
//! implementation.  The orchestrator drives all of them through this one
//! trait and never inspects which mechanism sits behind it.
//!
//! # Contract
//!
//! * `attempt` – try to regain control of the target.  Must honour the
//!   deadline carried by [`AttemptContext`] and return promptly once
//!   [`AttemptContext::cancelled`] resolves.  Must not panic; internal faults
//!   are returned as a failed [`ChannelOutcome`].
//!
//! * `probe` – a cheap, non-destructive reachability check.  A probe must
//!   never change the target's state.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lifeline_types::{ChannelError, ChannelOutcome};
use tokio::sync::watch;
use tokio::time::Instant;

// ─────────────────────────────────────────────────────────────────────────────
// Cancellation
// ─────────────────────────────────────────────────────────────────────────────

/// Orchestrator side of a cancellation pair.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Signal cancellation to every clone of the paired [`CancelSignal`].
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Channel side of a cancellation pair.  Cheap to clone.
///
/// Dropping the paired [`CancelHandle`] counts as cancellation, so work
/// spawned for an abandoned attempt winds down on its own.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
    // Only set by `never()`, which has no handle to drop.
    _keepalive: Option<Arc<watch::Sender<bool>>>,
}

impl CancelSignal {
    /// Create a linked handle/signal pair.
    pub fn pair() -> (CancelHandle, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx }, CancelSignal { rx, _keepalive: None })
    }

    /// A signal that is never cancelled.
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        CancelSignal {
            rx,
            _keepalive: Some(Arc::new(tx)),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolve once cancellation has been requested or the handle is gone.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Contexts
// ─────────────────────────────────────────────────────────────────────────────

/// Everything a channel receives for one recovery attempt.
#[derive(Debug, Clone)]
pub struct AttemptContext {
    problem: Arc<str>,
    deadline: Instant,
    cancel: CancelSignal,
}

impl AttemptContext {
    pub fn new(problem: Arc<str>, deadline: Instant, cancel: CancelSignal) -> Self {
        Self {
            problem,
            deadline,
            cancel,
        }
    }

    /// Description of the problem that triggered the escalation.
    pub fn problem(&self) -> &str {
        &self.problem
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left before the orchestrator stops waiting.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Drive `work` until it completes or the attempt is cancelled.
    ///
    /// Returns `None` on cancellation; `work` is dropped at that point.
    pub async fn until_cancelled<F: Future>(&self, work: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            out = work => Some(out),
        }
    }
}

/// Everything a channel receives for one availability probe.
#[derive(Debug, Clone)]
pub struct ProbeContext {
    deadline: Instant,
    cancel: CancelSignal,
}

impl ProbeContext {
    pub fn new(deadline: Instant, cancel: CancelSignal) -> Self {
        Self { deadline, cancel }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RecoveryChannel
// ─────────────────────────────────────────────────────────────────────────────

/// Capability every recovery mechanism implements.
#[async_trait]
pub trait RecoveryChannel: Send + Sync + 'static {
    /// Try to regain control of the target.
    async fn attempt(&self, ctx: AttemptContext) -> ChannelOutcome;

    /// Cheap, non-destructive availability check.
    ///
    /// `Ok(available)` on a completed check, `Err` when the check itself
    /// failed.  Channels without a meaningful cheap check are optimistically
    /// reported available.
    async fn probe(&self, _ctx: ProbeContext) -> Result<bool, ChannelError> {
        Ok(true)
    }
}
