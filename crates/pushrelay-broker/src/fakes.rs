//! In-memory fakes for the broker traits (testing only)
//!
//! `FakeBroker` records everything delivered to it and can be scripted to
//! fail sends or connects, which is how the retry policy and the hook
//! driver's failure paths are exercised without a real broker.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use pushrelay_domain::Message;

use crate::error::{BrokerError, BrokerResult};
use crate::transport::{BrokerConnector, BrokerTransport};

/// One successfully delivered message, as the broker saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedMessage {
    pub routing_key: String,
    pub payload: Vec<u8>,
    pub content_type: String,
}

/// Scripted outcome for one send attempt.
#[derive(Debug, Clone)]
pub enum SendOutcome {
    Deliver,
    FailRetriable(String),
    Reject(String),
    ExchangeMissing(String),
}

#[derive(Debug, Default)]
struct FakeBrokerState {
    delivered: Mutex<Vec<RecordedMessage>>,
    send_script: Mutex<VecDeque<SendOutcome>>,
    connect_failures: AtomicUsize,
    connects: AtomicUsize,
    send_attempts: AtomicUsize,
    closes: AtomicUsize,
}

/// Scripted in-memory broker. Clone-cheap handle; connectors and transports
/// share the same state.
#[derive(Clone, Default)]
pub struct FakeBroker {
    state: Arc<FakeBrokerState>,
}

impl FakeBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connector handle to hand to a publisher.
    pub fn connector(&self) -> Arc<dyn BrokerConnector> {
        Arc::new(FakeConnector {
            state: self.state.clone(),
        })
    }

    /// Queue an outcome for the next unscripted send attempt. Attempts
    /// beyond the script deliver normally.
    pub fn script_send(&self, outcome: SendOutcome) {
        self.state.send_script.lock().unwrap().push_back(outcome);
    }

    /// Fail the next `n` send attempts with a retriable transport error.
    pub fn fail_next_sends(&self, n: usize) {
        for _ in 0..n {
            self.script_send(SendOutcome::FailRetriable("connection reset".to_string()));
        }
    }

    /// Fail the next `n` connect attempts.
    pub fn fail_next_connects(&self, n: usize) {
        self.state.connect_failures.store(n, Ordering::SeqCst);
    }

    /// Everything successfully delivered, in order.
    pub fn delivered(&self) -> Vec<RecordedMessage> {
        self.state.delivered.lock().unwrap().clone()
    }

    pub fn connect_count(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    pub fn send_attempt_count(&self) -> usize {
        self.state.send_attempts.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }
}

struct FakeConnector {
    state: Arc<FakeBrokerState>,
}

#[async_trait]
impl BrokerConnector for FakeConnector {
    async fn connect(&self) -> BrokerResult<Box<dyn BrokerTransport>> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        let remaining = self.state.connect_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.state
                .connect_failures
                .store(remaining - 1, Ordering::SeqCst);
            return Err(BrokerError::Connection {
                addr: "fake:61613".to_string(),
                reason: "scripted connect failure".to_string(),
            });
        }
        Ok(Box::new(FakeTransport {
            state: self.state.clone(),
        }))
    }
}

#[derive(Debug)]
struct FakeTransport {
    state: Arc<FakeBrokerState>,
}

#[async_trait]
impl BrokerTransport for FakeTransport {
    async fn send(&mut self, message: &Message) -> BrokerResult<()> {
        self.state.send_attempts.fetch_add(1, Ordering::SeqCst);
        let outcome = self
            .state
            .send_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(SendOutcome::Deliver);
        match outcome {
            SendOutcome::Deliver => {
                self.state
                    .delivered
                    .lock()
                    .unwrap()
                    .push(RecordedMessage {
                        routing_key: message.routing_key.as_str().to_string(),
                        payload: message.payload.clone(),
                        content_type: message.content_type.to_string(),
                    });
                Ok(())
            }
            SendOutcome::FailRetriable(reason) => Err(BrokerError::Transport(reason)),
            SendOutcome::Reject(reason) => Err(BrokerError::Rejected { reason }),
            SendOutcome::ExchangeMissing(reason) => Err(BrokerError::ExchangeNotFound { reason }),
        }
    }

    async fn close(&mut self) -> BrokerResult<()> {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
