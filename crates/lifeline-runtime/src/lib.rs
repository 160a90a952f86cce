//! `lifeline-runtime` – The Recovery Engine
//!
//! Drives the channel registry: real escalations, readiness checks and
//! rehearsals all run through the same loop.
//!
//! # Modules
//!
//! - [`orchestrator`] – [`EscalationOrchestrator`][orchestrator::EscalationOrchestrator]:
//!   walks the registry in priority order, one bounded attempt at a time,
//!   stopping at the first success and alerting through a
//!   [`Notifier`][lifeline_notify::Notifier].
//! - [`prober`] – [`AvailabilityProber`][prober::AvailabilityProber]:
//!   probes every channel concurrently under a short per-probe deadline and
//!   reports recovery readiness.
//! - [`scenario`] – [`ScenarioRunner`][scenario::ScenarioRunner]:
//!   rehearses the escalation over simulated copies of the leading channels.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]:
//!   installs the `tracing` subscriber with an optional OTLP span exporter.

pub mod orchestrator;
pub mod prober;
pub mod scenario;
pub mod telemetry;

pub use orchestrator::{EscalationOrchestrator, OrchestratorConfig};
pub use prober::{AvailabilityProber, ProbeConfig};
pub use scenario::{DEFAULT_SCENARIO, Scenario, ScenarioConfig, ScenarioRunner, catalogue};
pub use telemetry::{LogFormat, TracerProviderGuard, init_tracing};
