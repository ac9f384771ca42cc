//! Error types for broker operations

use thiserror::Error;

use crate::config::BrokerProtocol;

#[derive(Error, Debug)]
pub enum BrokerError {
    /// Could not establish a session (network refusal, auth rejection).
    #[error("connection to {addr} failed: {reason}")]
    Connection { addr: String, reason: String },

    /// The connect handshake did not finish inside the configured bound.
    #[error("connect timed out after {timeout_ms} ms")]
    ConnectTimeout { timeout_ms: u64 },

    /// The configured protocol has no transport in this build.
    #[error("broker protocol {0} is not supported by this build")]
    UnsupportedProtocol(BrokerProtocol),

    /// Transient transport failure during a send (dropped connection,
    /// broken pipe). Subject to the retry policy.
    #[error("transport failure during publish: {0}")]
    Transport(String),

    /// A send did not complete inside the configured bound. Subject to the
    /// retry policy.
    #[error("publish timed out after {timeout_ms} ms")]
    PublishTimeout { timeout_ms: u64 },

    /// The broker rejected the message (protocol/validation error). Fatal
    /// for the message, never retried.
    #[error("broker rejected publish: {reason}")]
    Rejected { reason: String },

    /// The target exchange is missing or not a topic exchange. Fatal.
    #[error("exchange not usable: {reason}")]
    ExchangeNotFound { reason: String },

    /// A malformed frame arrived from the broker. Fatal for the session.
    #[error("protocol violation from broker: {0}")]
    Protocol(String),

    /// The bounded retry cycle was exhausted; carries the last failure.
    #[error("publish failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<BrokerError>,
    },
}

impl BrokerError {
    /// Whether the retry policy may reconnect and try again after this
    /// error. Broker-reported rejections and protocol violations are final.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            BrokerError::Connection { .. }
                | BrokerError::ConnectTimeout { .. }
                | BrokerError::Transport(_)
                | BrokerError::PublishTimeout { .. }
        )
    }
}

/// Result type for broker operations
pub type BrokerResult<T> = std::result::Result<T, BrokerError>;
