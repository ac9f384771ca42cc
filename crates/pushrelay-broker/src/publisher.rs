//! Reliable-publish policy on top of a broker transport.
//!
//! At-least-once from the caller's perspective: retriable transport faults
//! trigger a bounded reconnect-and-retry cycle with increasing backoff;
//! broker-reported rejections surface immediately. Nothing is buffered
//! across process lifetimes.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use pushrelay_domain::Message;

use crate::config::BrokerConfig;
use crate::error::{BrokerError, BrokerResult};
use crate::stomp::StompConnector;
use crate::transport::{BrokerConnector, BrokerTransport};

/// Bounded retry with linearly increasing backoff.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts per operation, first try included. Never zero.
    pub max_attempts: u32,
    /// Backoff before retry n is `n * backoff_base`.
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            backoff_base: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    fn backoff(&self, completed_attempts: u32) -> Duration {
        self.backoff_base * completed_attempts
    }
}

/// Delivery confirmation for one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishReceipt {
    /// How many attempts the message took, 1 for a clean first send.
    pub attempts: u32,
}

/// Owns one broker session and the retry policy around it.
///
/// The session lives for one hook invocation: `connect` once, `publish` the
/// batch, `close`. Not reused across invocations.
pub struct BrokerPublisher {
    connector: Arc<dyn BrokerConnector>,
    transport: Option<Box<dyn BrokerTransport>>,
    retry: RetryPolicy,
    publish_timeout: Duration,
}

impl BrokerPublisher {
    pub fn new(
        connector: Arc<dyn BrokerConnector>,
        retry: RetryPolicy,
        publish_timeout: Duration,
    ) -> Self {
        BrokerPublisher {
            connector,
            transport: None,
            retry,
            publish_timeout,
        }
    }

    /// Publisher over the configured STOMP backend.
    pub fn for_config(config: &BrokerConfig) -> Self {
        BrokerPublisher::new(
            Arc::new(StompConnector::new(config.clone())),
            config.retry_policy(),
            config.publish_timeout(),
        )
    }

    /// Establish the session, retrying retriable connect failures under the
    /// same bounded policy as publishes.
    pub async fn connect(&mut self) -> BrokerResult<()> {
        if self.transport.is_some() {
            return Ok(());
        }
        let max_attempts = self.retry.max_attempts.max(1);
        let mut last: Option<BrokerError> = None;
        for attempt in 1..=max_attempts {
            match self.connector.connect().await {
                Ok(transport) => {
                    self.transport = Some(transport);
                    return Ok(());
                }
                Err(e) if !e.is_retriable() => return Err(e),
                Err(e) => {
                    warn!(attempt, error = %e, "broker connect failed");
                    last = Some(e);
                }
            }
            if attempt < max_attempts {
                tokio::time::sleep(self.retry.backoff(attempt)).await;
            }
        }
        Err(BrokerError::RetriesExhausted {
            attempts: max_attempts,
            last: Box::new(
                last.unwrap_or_else(|| BrokerError::Transport("retry cycle exhausted".to_string())),
            ),
        })
    }

    /// Publish one message, reconnecting and retrying on retriable faults.
    ///
    /// Returns the number of attempts consumed so callers (and tests) can
    /// observe delivery behavior. Non-retriable broker rejections are
    /// returned after exactly one attempt.
    pub async fn publish(&mut self, message: &Message) -> BrokerResult<PublishReceipt> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut last: Option<BrokerError> = None;
        for attempt in 1..=max_attempts {
            match self.try_send(message).await {
                Ok(()) => return Ok(PublishReceipt { attempts: attempt }),
                Err(e) if !e.is_retriable() => return Err(e),
                Err(e) => {
                    warn!(
                        attempt,
                        routing_key = %message.routing_key,
                        error = %e,
                        "publish attempt failed"
                    );
                    // The session is suspect after any transport fault.
                    self.transport = None;
                    last = Some(e);
                }
            }
            if attempt < max_attempts {
                tokio::time::sleep(self.retry.backoff(attempt)).await;
            }
        }
        Err(BrokerError::RetriesExhausted {
            attempts: max_attempts,
            last: Box::new(
                last.unwrap_or_else(|| BrokerError::Transport("retry cycle exhausted".to_string())),
            ),
        })
    }

    async fn try_send(&mut self, message: &Message) -> BrokerResult<()> {
        if self.transport.is_none() {
            self.transport = Some(self.connector.connect().await?);
        }
        let Some(transport) = self.transport.as_mut() else {
            return Err(BrokerError::Transport("no broker session".to_string()));
        };
        match tokio::time::timeout(self.publish_timeout, transport.send(message)).await {
            Ok(result) => result,
            Err(_) => Err(BrokerError::PublishTimeout {
                timeout_ms: self.publish_timeout.as_millis() as u64,
            }),
        }
    }

    /// Close the session. Safe on every exit path, including after failures;
    /// close problems are logged, not surfaced.
    pub async fn close(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.close().await {
                debug!(error = %e, "broker close failed");
            }
        }
    }
}
