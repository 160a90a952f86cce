//! The notifier contract and the in-process notifiers.
//!
//! A [`Notifier`] is a best-effort side effect: it reports delivery as a
//! `bool` and never returns an error.  Callers log a `false` and move on.

use async_trait::async_trait;
use lifeline_types::ErrorKind;
use tracing::{info, warn};

/// Every alerting surface implements this trait.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `message`.  Returns `true` when the surface acknowledged it.
    async fn notify(&self, message: &str) -> bool;
}

/// Writes alerts to the `tracing` log.  Used when no external surface is
/// configured.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, message: &str) -> bool {
        info!(target: "lifeline::alert", "{}", message.replace('\n', " | "));
        true
    }
}

/// Discards every alert and reports success.  Used for rehearsals.
#[derive(Debug, Default, Clone)]
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn notify(&self, _message: &str) -> bool {
        true
    }
}

/// Sends each alert to every inner notifier; succeeds if at least one did.
#[derive(Default)]
pub struct FanoutNotifier {
    targets: Vec<Box<dyn Notifier>>,
}

impl FanoutNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.targets.push(notifier);
        self
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

#[async_trait]
impl Notifier for FanoutNotifier {
    async fn notify(&self, message: &str) -> bool {
        let mut delivered = 0usize;
        for target in &self.targets {
            if target.notify(message).await {
                delivered += 1;
            }
        }
        if delivered < self.targets.len() {
            warn!(
                kind = %ErrorKind::NotifyFault,
                delivered,
                total = self.targets.len(),
                "some alert targets failed"
            );
        }
        delivered > 0
    }
}
