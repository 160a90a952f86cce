//! `lifeline-channels` – Concrete Recovery Channels
//!
//! Generic [`RecoveryChannel`][lifeline_kernel::RecoveryChannel]
//! implementations.  Deployment-specific channels (SSH to a given VM, a cloud
//! provider reboot) are expressed through these by configuration rather than
//! by new code.
//!
//! # Modules
//!
//! - [`command`] – [`CommandChannel`]: run an external program; exit 0 wins.
//! - [`tcp`] – [`TcpPortChannel`]: a TCP port accepts a connection.
//! - [`http`] – [`HttpHealthChannel`]: a health endpoint answers 2xx.
//! - [`sequence`] – [`SequenceChannel`]: ordered sub-steps, first success
//!   wins.
//! - [`sim`] – [`SimChannel`]: scripted, I/O-free double for rehearsals and
//!   tests.

pub mod command;
pub mod http;
pub mod sequence;
pub mod sim;
pub mod tcp;

pub use command::{CommandChannel, PortCheck};
pub use http::HttpHealthChannel;
pub use sequence::SequenceChannel;
pub use sim::{SimBehavior, SimChannel, SimProbe};
pub use tcp::TcpPortChannel;
