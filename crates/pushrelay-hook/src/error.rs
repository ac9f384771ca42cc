//! Error types for extraction and hook orchestration

use thiserror::Error;

use pushrelay_broker::BrokerError;
use pushrelay_domain::DomainError;

/// Failures while reading changeset metadata from the repository.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// The changeset identifier does not resolve in this repository.
    #[error("changeset {changeset_id} could not be resolved: {reason}")]
    Extraction { changeset_id: String, reason: String },

    /// The changeset resolved but a required field is absent or unparsable.
    #[error("changeset {changeset_id} has malformed {field}: {reason}")]
    MalformedData {
        changeset_id: String,
        field: String,
        reason: String,
    },
}

/// A hook run failure, decorated with enough identity to diagnose which
/// changeset or message broke the push.
#[derive(Error, Debug)]
pub enum HookError {
    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error("building message for {subject} failed: {source}")]
    Build {
        subject: String,
        #[source]
        source: DomainError,
    },

    #[error("broker connection failed: {0}")]
    Connect(#[source] BrokerError),

    #[error("publishing {routing_key} failed: {source}")]
    Publish {
        routing_key: String,
        #[source]
        source: BrokerError,
    },
}

impl HookError {
    /// The driver stage this error belongs to.
    pub fn stage(&self) -> crate::driver::HookStage {
        match self {
            HookError::Extract(_) => crate::driver::HookStage::ExtractingChangesets,
            HookError::Build { .. } => crate::driver::HookStage::BuildingMessages,
            HookError::Connect(_) | HookError::Publish { .. } => {
                crate::driver::HookStage::Publishing
            }
        }
    }
}
