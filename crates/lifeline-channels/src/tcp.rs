//! [`TcpPortChannel`] – succeed when a TCP port accepts a connection.
//!
//! Useful as a last-resort "is anything alive" channel and as the probe for
//! tunnel or agent endpoints.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use lifeline_kernel::{AttemptContext, ProbeContext, RecoveryChannel};
use lifeline_types::{ChannelError, ChannelOutcome, ErrorKind};
use tokio::net::TcpStream;

#[derive(Debug, Clone)]
pub struct TcpPortChannel {
    host: String,
    port: u16,
}

impl TcpPortChannel {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn method(&self) -> String {
        format!("tcp:{}", self.port)
    }
}

#[async_trait]
impl RecoveryChannel for TcpPortChannel {
    async fn attempt(&self, ctx: AttemptContext) -> ChannelOutcome {
        match ctx.until_cancelled(TcpStream::connect((self.host.as_str(), self.port))).await {
            Some(Ok(stream)) => {
                let mut outcome = ChannelOutcome::success(self.method());
                if let Ok(peer) = stream.peer_addr() {
                    outcome = outcome.with_metadata("peer", peer.to_string());
                }
                outcome
            }
            Some(Err(e)) => ChannelOutcome::fault(self.method(), format!("connect to {} failed: {e}", self.address())),
            None => ChannelOutcome::failure(self.method(), ErrorKind::Timeout, "connect cancelled"),
        }
    }

    async fn probe(&self, ctx: ProbeContext) -> Result<bool, ChannelError> {
        port_open(&self.host, self.port, ctx.remaining()).await
    }
}

/// Whether `host:port` accepts a TCP connection within `limit`.
///
/// A refused or unanswered connect is `Ok(false)`; any other connect error
/// is a [`ErrorKind::ProbeFault`].
pub(crate) async fn port_open(host: &str, port: u16, limit: Duration) -> Result<bool, ChannelError> {
    match tokio::time::timeout(limit, TcpStream::connect((host, port))).await {
        Ok(Ok(_)) => Ok(true),
        Ok(Err(e)) if e.kind() == io::ErrorKind::ConnectionRefused => Ok(false),
        Ok(Err(e)) => Err(ChannelError::new(
            ErrorKind::ProbeFault,
            format!("connect to {host}:{port} failed: {e}"),
        )),
        Err(_) => Ok(false),
    }
}
