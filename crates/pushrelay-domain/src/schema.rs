//! Wire payload schema - the JSON contract with all subscribers.
//!
//! Field names and nesting must not change silently; bump
//! [`crate::WIRE_VERSION`] on any incompatible change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::ChangesetEvent;

/// Author string split into its conventional parts so consumers don't have
/// to re-parse `Name <email>` themselves. `raw` is always the unmodified
/// repository value; `name`/`email` are present only when the raw string
/// follows the convention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorDetail {
    pub raw: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl AuthorDetail {
    /// Parse a `Name <email>` author string. Anything that does not match
    /// the convention keeps only `raw`.
    pub fn parse(raw: &str) -> Self {
        let parsed = raw
            .rfind('<')
            .and_then(|open| raw[open..].find('>').map(|close| (open, open + close)))
            .and_then(|(open, close)| {
                let name = raw[..open].trim();
                let email = raw[open + 1..close].trim();
                if email.is_empty() {
                    None
                } else {
                    Some((
                        (!name.is_empty()).then(|| name.to_string()),
                        Some(email.to_string()),
                    ))
                }
            });
        match parsed {
            Some((name, email)) => AuthorDetail {
                raw: raw.to_string(),
                name,
                email,
            },
            None => AuthorDetail {
                raw: raw.to_string(),
                name: None,
                email: None,
            },
        }
    }
}

/// Payload of one changeset message.
///
/// Embeds the [`ChangesetEvent`] whole so consumers can round-trip it back
/// to an equal record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangesetPayload {
    /// Wire format version, see [`crate::WIRE_VERSION`].
    pub version: String,

    /// Repository identifier from the push context.
    pub repository: String,

    /// The extracted changeset record.
    pub changeset: ChangesetEvent,

    /// Convenience parse of `changeset.author`.
    pub author_detail: AuthorDetail,
}

/// Payload of the per-push summary message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushSummaryPayload {
    /// Wire format version, see [`crate::WIRE_VERSION`].
    pub version: String,

    /// Repository identifier from the push context.
    pub repository: String,

    /// All changeset ids in the push, oldest first.
    pub changeset_ids: Vec<String>,

    pub changeset_count: usize,

    /// Branch attributed to the push (tip changeset's branch).
    pub branch: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// When the host received the push.
    pub pushed_at: DateTime<Utc>,
}

/// Optional wrapper around a payload carrying delivery metadata, for
/// consumers that want self-describing messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub payload: T,
    #[serde(rename = "_meta")]
    pub meta: EnvelopeMeta,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeMeta {
    /// Exchange the message was published to.
    pub exchange: String,

    /// The routing key the message was published with.
    pub routing_key: String,

    /// Push instant from the context, not build-time wall clock, so envelope
    /// construction stays deterministic.
    pub sent: DateTime<Utc>,

    /// Serializer name, always `json` in wire version 1.
    pub serializer: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_conventional_author() {
        let detail = AuthorDetail::parse("Alice Jones <alice@example.com>");
        assert_eq!(detail.raw, "Alice Jones <alice@example.com>");
        assert_eq!(detail.name.as_deref(), Some("Alice Jones"));
        assert_eq!(detail.email.as_deref(), Some("alice@example.com"));
    }

    #[test]
    fn bare_author_keeps_only_raw() {
        let detail = AuthorDetail::parse("buildbot");
        assert_eq!(detail.raw, "buildbot");
        assert!(detail.name.is_none());
        assert!(detail.email.is_none());
    }

    #[test]
    fn email_only_author() {
        let detail = AuthorDetail::parse("<alice@example.com>");
        assert!(detail.name.is_none());
        assert_eq!(detail.email.as_deref(), Some("alice@example.com"));
    }

    #[test]
    fn empty_angle_brackets_are_not_an_email() {
        let detail = AuthorDetail::parse("alice <>");
        assert!(detail.email.is_none());
        assert_eq!(detail.raw, "alice <>");
    }
}
