//! Transport trait definitions for broker publishing.
//!
//! `BrokerConnector` opens sessions; `BrokerTransport` is one open session.
//! The publisher drives these through trait objects so the retry policy,
//! the hook driver, and the tests are all independent of the wire protocol.
//! In-memory fakes live in the `fakes` module.

use async_trait::async_trait;

use pushrelay_domain::Message;

use crate::error::BrokerResult;

/// One established session with the broker.
///
/// Guarantees:
/// - `send` either delivers the message to the exchange or returns an error;
///   broker rejections surface as `Rejected` / `ExchangeNotFound`, transport
///   faults as `Transport`.
/// - After any error the session is considered dead; callers reconnect
///   rather than reuse it.
#[async_trait]
pub trait BrokerTransport: Send + std::fmt::Debug {
    /// Deliver one message to the configured exchange.
    async fn send(&mut self, message: &Message) -> BrokerResult<()>;

    /// Graceful shutdown. Best effort: a failure to close an already-broken
    /// session is not an error worth surfacing.
    async fn close(&mut self) -> BrokerResult<()>;
}

/// Factory for broker sessions, used both for the initial connect and for
/// reconnects inside the retry cycle.
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    async fn connect(&self) -> BrokerResult<Box<dyn BrokerTransport>>;
}
