//! `lifeline-notify` – Alerting Adapters
//!
//! The orchestrator never talks to a messaging platform directly.  It holds a
//! [`Notifier`] and treats every delivery as a best-effort side effect.
//!
//! # Modules
//!
//! - [`notifier`] – the [`Notifier`] trait plus [`LogNotifier`],
//!   [`NullNotifier`] and [`FanoutNotifier`].
//! - [`telegram`] – [`TelegramNotifier`]: Bot API `sendMessage` delivery.

pub mod notifier;
pub mod telegram;

pub use notifier::{FanoutNotifier, LogNotifier, Notifier, NullNotifier};
pub use telegram::{TelegramConfig, TelegramNotifier};
