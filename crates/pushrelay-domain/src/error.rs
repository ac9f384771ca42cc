//! Error types for domain operations

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    /// A payload could not be encoded. Carries the id of the changeset or
    /// push being built so the failure can be attributed upstream.
    #[error("serialization failed for {subject}: {source}")]
    Serialization {
        subject: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Result type for domain operations
pub type Result<T> = std::result::Result<T, DomainError>;
