//! `lifeline-kernel` – Channel Contract & Registry
//!
//! The fixed point every recovery mechanism plugs into.  It knows nothing
//! about SSH, cloud CLIs or serial consoles; it only defines how a mechanism
//! is invoked and in which order.
//!
//! # Modules
//!
//! - [`channel`] – [`RecoveryChannel`][channel::RecoveryChannel]: the
//!   capability trait (`attempt` + `probe`), together with the
//!   [`AttemptContext`][channel::AttemptContext] /
//!   [`ProbeContext`][channel::ProbeContext] values and the
//!   [`CancelSignal`][channel::CancelSignal] used to abandon lagging work.
//! - [`registry`] – [`ChannelRegistry`][registry::ChannelRegistry]: the
//!   validated, priority-ordered, immutable channel list shared by the
//!   orchestrator, the prober and the scenario runner.

pub mod channel;
pub mod registry;

pub use channel::{AttemptContext, CancelHandle, CancelSignal, ProbeContext, RecoveryChannel};
pub use registry::{ChannelDescriptor, ChannelRegistry, ChannelRegistryBuilder, RegistryError};
