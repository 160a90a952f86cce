//! [`HttpHealthChannel`] – succeed when an HTTP health endpoint answers 2xx.

use std::time::Duration;

use async_trait::async_trait;
use lifeline_kernel::{AttemptContext, ProbeContext, RecoveryChannel};
use lifeline_types::{ChannelError, ChannelOutcome, ErrorKind};

const METHOD: &str = "http";
const BODY_EXCERPT: usize = 200;

#[derive(Debug, Clone)]
pub struct HttpHealthChannel {
    url: String,
    client: reqwest::Client,
}

impl HttpHealthChannel {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn get(&self, timeout: Duration) -> reqwest::Result<reqwest::Response> {
        self.client.get(&self.url).timeout(timeout).send().await
    }
}

#[async_trait]
impl RecoveryChannel for HttpHealthChannel {
    async fn attempt(&self, ctx: AttemptContext) -> ChannelOutcome {
        let response = match ctx.until_cancelled(self.get(ctx.remaining())).await {
            Some(Ok(response)) => response,
            Some(Err(e)) => return ChannelOutcome::fault(METHOD, format!("GET {} failed: {e}", self.url)),
            None => return ChannelOutcome::failure(METHOD, ErrorKind::Timeout, "request cancelled"),
        };

        let status = response.status();
        if !status.is_success() {
            return ChannelOutcome::fault(METHOD, format!("health endpoint returned {status}"))
                .with_metadata("status", status.as_u16().to_string());
        }

        let mut outcome = ChannelOutcome::success(METHOD).with_metadata("status", status.as_u16().to_string());
        if let Some(Ok(body)) = ctx.until_cancelled(response.text()).await {
            let body: String = body.trim().chars().take(BODY_EXCERPT).collect();
            if !body.is_empty() {
                outcome = outcome.with_metadata("body", body);
            }
        }
        outcome
    }

    async fn probe(&self, ctx: ProbeContext) -> Result<bool, ChannelError> {
        match self.get(ctx.remaining()).await {
            Ok(response) => Ok(response.status().is_success()),
            Err(e) if e.is_connect() || e.is_timeout() => Ok(false),
            Err(e) => Err(ChannelError::new(ErrorKind::ProbeFault, format!("GET {} failed: {e}", self.url))),
        }
    }
}
