//! [`SequenceChannel`] – several recovery steps behind one channel.
//!
//! Steps run in order against the same attempt context and the first
//! successful step wins.  The whole sequence shares the channel's single
//! timeout, so a slow early step leaves less time for the later ones.

use std::sync::Arc;

use async_trait::async_trait;
use lifeline_kernel::{AttemptContext, ProbeContext, RecoveryChannel};
use lifeline_types::{ChannelError, ChannelOutcome, ErrorKind};
use tracing::info;

pub struct SequenceChannel {
    method: String,
    steps: Vec<Arc<dyn RecoveryChannel>>,
}

impl SequenceChannel {
    pub fn new(method: impl Into<String>, steps: Vec<Arc<dyn RecoveryChannel>>) -> Self {
        Self {
            method: method.into(),
            steps,
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl std::fmt::Debug for SequenceChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequenceChannel")
            .field("method", &self.method)
            .field("steps", &self.steps.len())
            .finish()
    }
}

#[async_trait]
impl RecoveryChannel for SequenceChannel {
    async fn attempt(&self, ctx: AttemptContext) -> ChannelOutcome {
        let total = self.steps.len();
        let mut failures = Vec::with_capacity(total);

        for (i, step) in self.steps.iter().enumerate() {
            if ctx.is_cancelled() {
                return ChannelOutcome::failure(
                    &self.method,
                    ErrorKind::Timeout,
                    format!("cancelled before step {}/{total}", i + 1),
                );
            }
            info!(channel = %self.method, step = i + 1, total, "running recovery step");

            let outcome = step.attempt(ctx.clone()).await;
            if outcome.success {
                let mut result = ChannelOutcome::success(&self.method)
                    .with_metadata("successful_step", (i + 1).to_string())
                    .with_metadata("step_method", outcome.method);
                result.metadata.extend(outcome.metadata);
                return result;
            }
            let reason = outcome.error.map(|e| e.message).unwrap_or_else(|| "no detail".to_string());
            failures.push(format!("step {}: {reason}", i + 1));
        }

        if failures.is_empty() {
            return ChannelOutcome::fault(&self.method, "sequence has no steps");
        }
        ChannelOutcome::fault(
            &self.method,
            format!("all {total} steps failed ({})", failures.join("; ")),
        )
    }

    /// Available when any step reports available.
    async fn probe(&self, ctx: ProbeContext) -> Result<bool, ChannelError> {
        let mut answered = false;
        let mut last_fault = None;
        for step in &self.steps {
            match step.probe(ctx.clone()).await {
                Ok(true) => return Ok(true),
                Ok(false) => answered = true,
                Err(e) => last_fault = Some(e),
            }
        }
        match last_fault {
            Some(e) if !answered => Err(e),
            _ => Ok(false),
        }
    }
}
