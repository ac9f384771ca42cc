//! In-memory fakes for the extraction trait (testing only)

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;

use pushrelay_domain::ChangesetEvent;

use crate::error::ExtractError;
use crate::reader::ChangesetReader;

/// Reader over a fixed set of changesets. Unknown ids fail with
/// `Extraction`; ids registered as malformed fail with `MalformedData`.
#[derive(Debug, Default)]
pub struct MemoryChangesetReader {
    order: Vec<String>,
    events: HashMap<String, ChangesetEvent>,
    malformed: HashMap<String, String>,
}

impl MemoryChangesetReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a changeset, appended to the push order.
    pub fn insert(&mut self, event: ChangesetEvent) {
        self.order.push(event.changeset_id.clone());
        self.events.insert(event.changeset_id.clone(), event);
    }

    /// Register an id whose extraction reports malformed data in `field`.
    pub fn insert_malformed(&mut self, changeset_id: &str, field: &str) {
        self.order.push(changeset_id.to_string());
        self.malformed
            .insert(changeset_id.to_string(), field.to_string());
    }
}

#[async_trait]
impl ChangesetReader for MemoryChangesetReader {
    async fn incoming(
        &self,
        _repo: &Path,
        first_changeset_id: &str,
    ) -> Result<Vec<String>, ExtractError> {
        let start = self
            .order
            .iter()
            .position(|id| id == first_changeset_id)
            .ok_or_else(|| ExtractError::Extraction {
                changeset_id: first_changeset_id.to_string(),
                reason: "changeset not found".to_string(),
            })?;
        Ok(self.order[start..].to_vec())
    }

    async fn read(
        &self,
        _repo: &Path,
        changeset_id: &str,
    ) -> Result<ChangesetEvent, ExtractError> {
        if let Some(field) = self.malformed.get(changeset_id) {
            return Err(ExtractError::MalformedData {
                changeset_id: changeset_id.to_string(),
                field: field.clone(),
                reason: "scripted malformed field".to_string(),
            });
        }
        self.events
            .get(changeset_id)
            .cloned()
            .ok_or_else(|| ExtractError::Extraction {
                changeset_id: changeset_id.to_string(),
                reason: "changeset not found".to_string(),
            })
    }
}
