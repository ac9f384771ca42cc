//! Broker connection and delivery configuration.
//!
//! Always passed in explicitly (deserialized from the host's settings file
//! by the integration layer), never read from ambient process state, so the
//! publisher stays testable without a filesystem or environment.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::publisher::RetryPolicy;

/// Wire protocol used to reach the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerProtocol {
    /// STOMP 1.2 over TCP, the implemented backend.
    #[default]
    Stomp,
    /// Recognized for configuration compatibility; connecting reports
    /// `UnsupportedProtocol` until an AMQP transport exists.
    Amqp,
}

impl fmt::Display for BrokerProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrokerProtocol::Stomp => write!(f, "stomp"),
            BrokerProtocol::Amqp => write!(f, "amqp"),
        }
    }
}

/// Connection, credential, and delivery tuning for one broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    pub username: String,
    pub password: String,

    /// Virtual host / namespace on the broker.
    #[serde(default = "default_vhost")]
    pub vhost: String,

    /// Name of the pre-provisioned topic exchange.
    pub exchange: String,

    #[serde(default)]
    pub protocol: BrokerProtocol,

    /// Request persistent delivery from the broker. Durability beyond that
    /// is the exchange/queue's responsibility.
    #[serde(default = "default_true")]
    pub persistent: bool,

    /// Bound on the connect handshake.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Bound on each individual publish.
    #[serde(default = "default_publish_timeout_ms")]
    pub publish_timeout_ms: u64,

    /// Total attempts per message (first try included).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff before retry n is `n * backoff_base_ms`.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

fn default_port() -> u16 {
    61613
}

fn default_vhost() -> String {
    "/".to_string()
}

fn default_true() -> bool {
    true
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_publish_timeout_ms() -> u64 {
    30_000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    250
}

impl BrokerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            backoff_base: Duration::from_millis(self.backoff_base_ms),
        }
    }
}
