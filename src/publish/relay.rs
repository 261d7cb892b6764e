//! RemoteRelay channel: one JSON-RPC `tools/call` over HTTP POST.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::PublishRequest;
use crate::config::RelayConfig;
use crate::error::ChannelError;

/// Configuration for retry behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    /// Base delay in milliseconds for exponential backoff.
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
        }
    }
}

impl RetryConfig {
    /// Delay after the given failed attempt using exponential backoff.
    /// delay = base_delay_ms * 2^(attempt - 1), saturating at `u64::MAX`.
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        2u64.checked_pow(attempt.saturating_sub(1))
            .map_or(u64::MAX, |factor| self.base_delay_ms.saturating_mul(factor))
    }
}

/// How a single attempt failed.
#[derive(Debug)]
enum Failure {
    Transient(String),
    Fatal(String),
}

pub struct RelayClient {
    client: Client,
    url: String,
    tool: String,
    retry: RetryConfig,
}

impl RelayClient {
    pub fn new(config: &RelayConfig) -> Result<Self, ChannelError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ChannelError::RelayFatal(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: config.url.clone(),
            tool: config.tool.clone(),
            retry: RetryConfig {
                max_attempts: config.max_attempts.max(1),
                base_delay_ms: config.base_delay_ms,
            },
        })
    }

    fn envelope(&self, request: &PublishRequest) -> Value {
        let images: Vec<String> = request
            .images
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/call",
            "params": {
                "name": self.tool,
                "arguments": {
                    "title": request.title,
                    "content": request.body,
                    "tags": request.tags,
                    "images": images,
                }
            }
        })
    }

    /// Sends the note, retrying transient failures with exponential backoff.
    ///
    /// Returns the parsed response body (or `Null` for a non-JSON 2xx body).
    pub async fn publish(&self, request: &PublishRequest) -> Result<Value, ChannelError> {
        let body = self.envelope(request);
        let mut attempt = 1;
        loop {
            debug!(attempt, url = %self.url, "relay attempt");
            match self.attempt(&body).await {
                Ok(value) => {
                    info!(attempt, "relay accepted the note");
                    return Ok(value);
                }
                Err(Failure::Fatal(message)) => {
                    warn!(attempt, %message, "relay rejected the note");
                    return Err(ChannelError::RelayFatal(message));
                }
                Err(Failure::Transient(message)) if attempt >= self.retry.max_attempts => {
                    warn!(attempt, %message, "relay retries exhausted");
                    return Err(ChannelError::RelayTransient {
                        attempts: attempt,
                        message,
                    });
                }
                Err(Failure::Transient(message)) => {
                    let delay_ms = self.retry.delay_for_attempt(attempt);
                    warn!(
                        attempt,
                        max = self.retry.max_attempts,
                        delay_ms,
                        %message,
                        "relay attempt failed, retrying"
                    );
                    sleep(Duration::from_millis(delay_ms)).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn attempt(&self, body: &Value) -> Result<Value, Failure> {
        let response = self
            .client
            .post(&self.url)
            .json(body)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Failure::Fatal(format!("HTTP {status}: {}", detail.trim())));
        }
        let text = response.text().await.map_err(classify)?;

        let value: Value = match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(_) => {
                debug!("relay returned a non-JSON success body");
                return Ok(Value::Null);
            }
        };
        match value.get("error") {
            Some(error) if !error.is_null() => Err(Failure::Fatal(format!("application error: {error}"))),
            _ => Ok(value),
        }
    }
}

fn classify(err: reqwest::Error) -> Failure {
    if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
        Failure::Transient(err.to_string())
    } else {
        Failure::Fatal(err.to_string())
    }
}
