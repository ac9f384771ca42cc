//! Pushrelay Broker Layer
//!
//! Owns the connection to the message broker and the reliable-publish
//! policy:
//! - `BrokerTransport` / `BrokerConnector`: the seam between publish policy
//!   and wire protocol
//! - `StompTransport`: concrete STOMP 1.2 session against a broker's STOMP
//!   listener, publishing through `/exchange/<name>/<routing-key>`
//! - `BrokerPublisher`: per-message send timeout plus bounded
//!   reconnect-and-retry with increasing backoff for retriable failures
//! - `fakes`: scripted in-memory broker for driver and policy tests
//!
//! The publisher assumes the target topic exchange already exists; it never
//! declares exchanges, queues, or bindings, and it never buffers messages
//! across process lifetimes.

pub mod config;
pub mod error;
pub mod fakes;
pub mod publisher;
pub mod stomp;
pub mod transport;

pub use config::{BrokerConfig, BrokerProtocol};
pub use error::{BrokerError, BrokerResult};
pub use publisher::{BrokerPublisher, PublishReceipt, RetryPolicy};
pub use stomp::StompConnector;
pub use transport::{BrokerConnector, BrokerTransport};

/// Pushrelay broker layer version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
