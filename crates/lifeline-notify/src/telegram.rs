//! [`TelegramNotifier`] – alert delivery through the Telegram Bot API.
//!
//! Posts each alert to `{api_base}/bot{token}/sendMessage` as JSON.  Any
//! transport error or non-2xx status is logged as a
//! [`NotifyFault`][lifeline_types::ErrorKind::NotifyFault] and reported as
//! `false`; it never propagates.
//!
//! # Example
//!
//! ```rust,no_run
//! use lifeline_notify::{Notifier, TelegramConfig, TelegramNotifier};
//!
//! # async fn demo() {
//! let notifier = TelegramNotifier::new(TelegramConfig::new("123:ABC", "6878699213"));
//! // Requires network access to api.telegram.org.
//! let delivered = notifier.notify("primary host unreachable").await;
//! # let _ = delivered;
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use lifeline_types::ErrorKind;
use serde::Serialize;
use tracing::{debug, warn};

use crate::notifier::Notifier;

/// Public Bot API endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Header prepended to every alert so recovery traffic stands out in a chat.
const MESSAGE_HEADER: &str = "RECOVERY SYSTEM";

/// Connection settings for [`TelegramNotifier`].
#[derive(Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
    /// Override for tests and self-hosted Bot API servers.
    pub api_base: String,
    pub request_timeout: Duration,
}

impl TelegramConfig {
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field(
                "bot_token",
                if self.bot_token.is_empty() { &"<not set>" } else { &"<redacted>" },
            )
            .field("chat_id", &self.chat_id)
            .field("api_base", &self.api_base)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: String,
}

/// Sends alerts to a Telegram chat.
#[derive(Debug)]
pub struct TelegramNotifier {
    config: TelegramConfig,
    client: reqwest::Client,
}

impl TelegramNotifier {
    pub fn new(config: TelegramConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.config.api_base.trim_end_matches('/'),
            self.config.bot_token
        )
    }

    fn body<'a>(&'a self, message: &str) -> SendMessage<'a> {
        SendMessage {
            chat_id: &self.config.chat_id,
            text: format!("{MESSAGE_HEADER}\n\n{message}"),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, message: &str) -> bool {
        if self.config.bot_token.is_empty() {
            warn!(kind = %ErrorKind::NotifyFault, "telegram bot token not configured");
            return false;
        }

        let result = self
            .client
            .post(self.endpoint())
            .timeout(self.config.request_timeout)
            .json(&self.body(message))
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                debug!(chat_id = %self.config.chat_id, "telegram alert delivered");
                true
            }
            Ok(response) => {
                warn!(
                    kind = %ErrorKind::NotifyFault,
                    status = %response.status(),
                    "telegram rejected alert"
                );
                false
            }
            Err(e) => {
                // reqwest errors embed the URL, which contains the token.
                warn!(
                    kind = %ErrorKind::NotifyFault,
                    error = %e.without_url(),
                    "telegram request failed"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    /// Serve exactly one HTTP request, answer with `status`, and hand the raw
    /// request text back through the returned receiver.
    async fn one_shot_server(status: &'static str) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&buf);
                if let Some(head_end) = text.find("\r\n\r\n") {
                    let content_length = text[..head_end]
                        .lines()
                        .find_map(|l| {
                            let (name, value) = l.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if buf.len() >= head_end + 4 + content_length {
                        break;
                    }
                }
            }
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: 11\r\nConnection: close\r\n\r\n{{\"ok\":true}}"
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = tx.send(String::from_utf8_lossy(&buf).to_string());
        });
        (format!("http://{addr}"), rx)
    }

    #[test]
    fn endpoint_embeds_token() {
        let n = TelegramNotifier::new(
            TelegramConfig::new("123:ABC", "42").with_api_base("http://localhost:9999/"),
        );
        assert_eq!(n.endpoint(), "http://localhost:9999/bot123:ABC/sendMessage");
    }

    #[test]
    fn body_has_header_and_chat() {
        let n = TelegramNotifier::new(TelegramConfig::new("t", "6878699213"));
        let json = serde_json::to_value(n.body("host down")).unwrap();
        assert_eq!(json["chat_id"], "6878699213");
        assert_eq!(json["text"], "RECOVERY SYSTEM\n\nhost down");
    }

    #[test]
    fn debug_redacts_token() {
        let cfg = TelegramConfig::new("super-secret-token", "42");
        let dbg = format!("{cfg:?}");
        assert!(!dbg.contains("super-secret-token"));
        assert!(dbg.contains("<redacted>"));
    }

    #[tokio::test]
    async fn missing_token_is_not_delivered() {
        let n = TelegramNotifier::new(TelegramConfig::new("", "42"));
        assert!(!n.notify("hello").await);
    }

    #[tokio::test]
    async fn delivers_to_bot_api() {
        let (base, rx) = one_shot_server("200 OK").await;
        let n = TelegramNotifier::new(TelegramConfig::new("123:ABC", "42").with_api_base(base));
        assert!(n.notify("recovered via ssh").await);
        let request = rx.await.unwrap();
        assert!(request.starts_with("POST /bot123:ABC/sendMessage"));
        assert!(request.contains("recovered via ssh"));
        assert!(request.contains("\"chat_id\":\"42\""));
    }

    #[tokio::test]
    async fn non_success_status_is_not_delivered() {
        let (base, _rx) = one_shot_server("401 Unauthorized").await;
        let n = TelegramNotifier::new(TelegramConfig::new("bad", "42").with_api_base(base));
        assert!(!n.notify("hello").await);
    }

    #[tokio::test]
    async fn unreachable_api_is_not_delivered() {
        // Bind then drop to obtain a port with nothing listening.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let n = TelegramNotifier::new(
            TelegramConfig::new("t", "42")
                .with_api_base(format!("http://{addr}"))
                .with_request_timeout(Duration::from_secs(2)),
        );
        assert!(!n.notify("hello").await);
    }
}
