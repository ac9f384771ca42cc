//! Pure construction of wire messages from extracted events.

use serde::Serialize;

use crate::error::{DomainError, Result};
use crate::event::{ChangesetEvent, PushContext};
use crate::message::Message;
use crate::routing::RoutingKey;
use crate::schema::{AuthorDetail, ChangesetPayload, Envelope, EnvelopeMeta, PushSummaryPayload};
use crate::WIRE_VERSION;

/// Static configuration for message construction.
#[derive(Debug, Clone)]
pub struct BuilderConfig {
    /// Exchange name, recorded in envelope metadata. The builder never talks
    /// to the broker; this is informational for consumers.
    pub exchange: String,

    /// Wrap payloads in an [`Envelope`] with delivery metadata.
    pub use_envelope: bool,

    /// Optional routing-key prefix, sanitized like any other key segment.
    pub routing_prefix: String,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        BuilderConfig {
            exchange: String::new(),
            use_envelope: false,
            routing_prefix: String::new(),
        }
    }
}

/// Builds one message per changeset plus one summary per push.
///
/// A pure function of its inputs and configuration: no I/O, no clocks, no
/// randomness. Equal inputs yield byte-identical payloads and routing keys.
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    config: BuilderConfig,
}

impl MessageBuilder {
    pub fn new(config: BuilderConfig) -> Self {
        MessageBuilder { config }
    }

    /// Build the message for one changeset.
    pub fn build_changeset_message(
        &self,
        ctx: &PushContext,
        event: &ChangesetEvent,
    ) -> Result<Message> {
        let key = RoutingKey::changeset(
            &self.config.routing_prefix,
            &ctx.repository_identifier,
            &event.branch,
        );
        let payload = ChangesetPayload {
            version: WIRE_VERSION.to_string(),
            repository: ctx.repository_identifier.clone(),
            changeset: event.clone(),
            author_detail: AuthorDetail::parse(&event.author),
        };
        let bytes = self.encode(&event.changeset_id, &key, ctx, &payload)?;
        Ok(Message::json(key, bytes))
    }

    /// Build the per-push summary message.
    pub fn build_summary_message(&self, ctx: &PushContext) -> Result<Message> {
        let key = RoutingKey::push_summary(
            &self.config.routing_prefix,
            &ctx.repository_identifier,
            &ctx.branch,
        );
        let payload = PushSummaryPayload {
            version: WIRE_VERSION.to_string(),
            repository: ctx.repository_identifier.clone(),
            changeset_ids: ctx.changeset_ids.clone(),
            changeset_count: ctx.changeset_ids.len(),
            branch: ctx.branch.clone(),
            source: ctx.source.clone(),
            pushed_at: ctx.pushed_at,
        };
        let bytes = self.encode(&ctx.repository_identifier, &key, ctx, &payload)?;
        Ok(Message::json(key, bytes))
    }

    fn encode<T: Serialize>(
        &self,
        subject: &str,
        key: &RoutingKey,
        ctx: &PushContext,
        payload: &T,
    ) -> Result<Vec<u8>> {
        let encoded = if self.config.use_envelope {
            serde_json::to_vec(&Envelope {
                payload,
                meta: EnvelopeMeta {
                    exchange: self.config.exchange.clone(),
                    routing_key: key.as_str().to_string(),
                    sent: ctx.pushed_at,
                    serializer: "json".to_string(),
                },
            })
        } else {
            serde_json::to_vec(payload)
        };
        encoded.map_err(|source| DomainError::Serialization {
            subject: subject.to_string(),
            source,
        })
    }
}
