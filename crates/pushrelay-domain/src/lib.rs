//! Pushrelay Domain Model
//!
//! Defines the data that flows from a repository push to a broker topic
//! exchange:
//! - ChangesetEvent: one committed revision, as extracted from the repository
//! - PushContext: one hook invocation (repository, ordered changeset ids)
//! - RoutingKey: sanitized dot-separated key for topic-exchange matching
//! - Message: the unit of delivery (routing key + payload bytes + content type)
//! - MessageBuilder: pure construction of wire messages from events
//!
//! Everything in this crate is side-effect free. Building the same logical
//! event twice yields byte-identical payloads, which is what makes the wire
//! format a testable contract with subscribers.

pub mod builder;
pub mod error;
pub mod event;
pub mod message;
pub mod routing;
pub mod schema;

pub use builder::{BuilderConfig, MessageBuilder};
pub use error::{DomainError, Result};
pub use event::{ChangesetEvent, PushContext};
pub use message::{Message, CONTENT_TYPE_JSON};
pub use routing::{RoutingKey, EVENT_KIND_CHANGESET, EVENT_KIND_PUSH};
pub use schema::{AuthorDetail, ChangesetPayload, Envelope, EnvelopeMeta, PushSummaryPayload};

/// Wire format version. Bump on any incompatible payload change.
pub const WIRE_VERSION: &str = "1";

/// Pushrelay domain version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
