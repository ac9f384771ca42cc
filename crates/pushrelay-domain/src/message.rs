//! The unit of delivery to the broker.

use crate::routing::RoutingKey;

/// Content type tag for JSON payloads, the only serializer in wire version 1.
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// A built, ready-to-publish message.
///
/// The payload is opaque bytes from the transport's point of view; the
/// content type tag always matches the serialization actually used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub routing_key: RoutingKey,
    pub payload: Vec<u8>,
    pub content_type: &'static str,
}

impl Message {
    pub fn json(routing_key: RoutingKey, payload: Vec<u8>) -> Self {
        Message {
            routing_key,
            payload,
            content_type: CONTENT_TYPE_JSON,
        }
    }
}
