//! [`ChannelRegistry`] – the ordered, immutable list of recovery channels.
//!
//! Channels are registered through a [`ChannelRegistryBuilder`], validated,
//! and then frozen in ascending priority order (ties keep registration
//! order).  The frozen registry is an `Arc` slice, so clones are cheap and
//! can be shared by any number of concurrent escalation runs and probes.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::channel::RecoveryChannel;

/// Construction-time defects of a channel registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Channel registry is empty")]
    Empty,

    #[error("Channel at registration index {0} has an empty name")]
    EmptyName(usize),

    #[error("Duplicate channel name '{0}'")]
    DuplicateName(String),

    #[error("Channel '{0}' has a zero timeout")]
    ZeroTimeout(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// ChannelDescriptor
// ─────────────────────────────────────────────────────────────────────────────

/// Static description of one recovery channel.
#[derive(Clone)]
pub struct ChannelDescriptor {
    name: String,
    priority: u32,
    timeout: Duration,
    alert_on_failure: bool,
    handler: Arc<dyn RecoveryChannel>,
}

impl ChannelDescriptor {
    /// Lower `priority` values are attempted first.
    pub fn new(
        name: impl Into<String>,
        priority: u32,
        timeout: Duration,
        handler: Arc<dyn RecoveryChannel>,
    ) -> Self {
        Self {
            name: name.into(),
            priority,
            timeout,
            alert_on_failure: false,
            handler,
        }
    }

    /// Mark the channel as high-visibility: each of its failures is notified.
    pub fn with_alert_on_failure(mut self, alert: bool) -> Self {
        self.alert_on_failure = alert;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> u32 {
        self.priority
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn alert_on_failure(&self) -> bool {
        self.alert_on_failure
    }

    pub fn handler(&self) -> Arc<dyn RecoveryChannel> {
        Arc::clone(&self.handler)
    }
}

impl fmt::Debug for ChannelDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelDescriptor")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("timeout", &self.timeout)
            .field("alert_on_failure", &self.alert_on_failure)
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ChannelRegistry
// ─────────────────────────────────────────────────────────────────────────────

/// Validated channel list in attempt order.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use async_trait::async_trait;
/// use lifeline_kernel::{AttemptContext, ChannelDescriptor, ChannelRegistry, RecoveryChannel};
/// use lifeline_types::ChannelOutcome;
///
/// struct Noop;
///
/// #[async_trait]
/// impl RecoveryChannel for Noop {
///     async fn attempt(&self, _ctx: AttemptContext) -> ChannelOutcome {
///         ChannelOutcome::fault("noop", "not implemented")
///     }
/// }
///
/// let registry = ChannelRegistry::builder()
///     .with(ChannelDescriptor::new("serial", 3, Duration::from_secs(60), Arc::new(Noop)))
///     .with(ChannelDescriptor::new("ssh", 1, Duration::from_secs(30), Arc::new(Noop)))
///     .build()
///     .unwrap();
///
/// assert_eq!(registry.names(), vec!["ssh", "serial"]);
/// ```
#[derive(Clone, Debug)]
pub struct ChannelRegistry {
    channels: Arc<[ChannelDescriptor]>,
}

impl ChannelRegistry {
    pub fn builder() -> ChannelRegistryBuilder {
        ChannelRegistryBuilder::default()
    }

    /// Channels in attempt order.
    pub fn channels(&self) -> &[ChannelDescriptor] {
        &self.channels
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ChannelDescriptor> {
        self.channels.iter().find(|c| c.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name.as_str()).collect()
    }

    /// The first `n` channels in attempt order (fewer if the registry is
    /// shorter).
    pub fn prefix(&self, n: usize) -> &[ChannelDescriptor] {
        &self.channels[..n.min(self.channels.len())]
    }
}

/// Collects descriptors and validates them into a [`ChannelRegistry`].
#[derive(Default)]
pub struct ChannelRegistryBuilder {
    pending: Vec<ChannelDescriptor>,
}

impl ChannelRegistryBuilder {
    pub fn register(&mut self, descriptor: ChannelDescriptor) -> &mut Self {
        self.pending.push(descriptor);
        self
    }

    pub fn with(mut self, descriptor: ChannelDescriptor) -> Self {
        self.pending.push(descriptor);
        self
    }

    /// Validate and freeze the registry.
    ///
    /// # Errors
    ///
    /// Returns a [`RegistryError`] for an empty registry, an empty or
    /// duplicated channel name, or a zero timeout.
    pub fn build(self) -> Result<ChannelRegistry, RegistryError> {
        if self.pending.is_empty() {
            return Err(RegistryError::Empty);
        }
        for (idx, channel) in self.pending.iter().enumerate() {
            if channel.name.trim().is_empty() {
                return Err(RegistryError::EmptyName(idx));
            }
            if channel.timeout.is_zero() {
                return Err(RegistryError::ZeroTimeout(channel.name.clone()));
            }
            if self.pending[..idx].iter().any(|c| c.name == channel.name) {
                return Err(RegistryError::DuplicateName(channel.name.clone()));
            }
        }

        let mut channels = self.pending;
        // Stable sort: equal priorities keep registration order.
        channels.sort_by_key(|c| c.priority);
        debug!(count = channels.len(), "channel registry frozen");
        Ok(ChannelRegistry {
            channels: channels.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::AttemptContext;
    use async_trait::async_trait;
    use lifeline_types::ChannelOutcome;

    struct Stub;

    #[async_trait]
    impl RecoveryChannel for Stub {
        async fn attempt(&self, _ctx: AttemptContext) -> ChannelOutcome {
            ChannelOutcome::fault("stub", "unused")
        }
    }

    fn desc(name: &str, priority: u32) -> ChannelDescriptor {
        ChannelDescriptor::new(name, priority, Duration::from_secs(1), Arc::new(Stub))
    }

    #[test]
    fn sorts_by_priority() {
        let reg = ChannelRegistry::builder()
            .with(desc("vm", 5))
            .with(desc("ssh", 1))
            .with(desc("serial", 3))
            .build()
            .unwrap();
        assert_eq!(reg.names(), vec!["ssh", "serial", "vm"]);
    }

    #[test]
    fn equal_priorities_keep_registration_order() {
        let reg = ChannelRegistry::builder()
            .with(desc("b", 1))
            .with(desc("a", 1))
            .with(desc("first", 0))
            .with(desc("c", 1))
            .build()
            .unwrap();
        assert_eq!(reg.names(), vec!["first", "b", "a", "c"]);
    }

    #[test]
    fn empty_registry_is_rejected() {
        assert_eq!(ChannelRegistry::builder().build().unwrap_err(), RegistryError::Empty);
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let err = ChannelRegistry::builder()
            .with(desc("ssh", 1))
            .with(desc("ssh", 2))
            .build()
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateName("ssh".to_string()));
    }

    #[test]
    fn blank_name_is_rejected() {
        let err = ChannelRegistry::builder()
            .with(desc("ssh", 1))
            .with(desc("  ", 2))
            .build()
            .unwrap_err();
        assert_eq!(err, RegistryError::EmptyName(1));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let zero = ChannelDescriptor::new("serial", 1, Duration::ZERO, Arc::new(Stub));
        let err = ChannelRegistry::builder().with(zero).build().unwrap_err();
        assert_eq!(err, RegistryError::ZeroTimeout("serial".to_string()));
    }

    #[test]
    fn register_by_reference() {
        let mut builder = ChannelRegistry::builder();
        builder.register(desc("ssh", 1)).register(desc("tunnel", 2));
        let reg = builder.build().unwrap();
        assert_eq!(reg.len(), 2);
        assert!(reg.get("tunnel").is_some());
        assert!(reg.get("ghost").is_none());
    }

    #[test]
    fn prefix_is_clamped() {
        let reg = ChannelRegistry::builder()
            .with(desc("a", 1))
            .with(desc("b", 2))
            .build()
            .unwrap();
        assert_eq!(reg.prefix(1).len(), 1);
        assert_eq!(reg.prefix(10).len(), 2);
    }

    #[test]
    fn clones_share_channels() {
        let reg = ChannelRegistry::builder().with(desc("a", 1)).build().unwrap();
        let clone = reg.clone();
        assert!(std::ptr::eq(reg.channels().as_ptr(), clone.channels().as_ptr()));
    }

    #[test]
    fn descriptor_debug_omits_handler() {
        let d = desc("ssh", 1).with_alert_on_failure(true);
        let dbg = format!("{d:?}");
        assert!(dbg.contains("ssh"));
        assert!(dbg.contains("alert_on_failure: true"));
        assert!(d.alert_on_failure());
    }
}
