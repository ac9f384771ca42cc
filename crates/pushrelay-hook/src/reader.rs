//! Extraction seam between the hook driver and a repository model.

use std::path::Path;

use async_trait::async_trait;

use pushrelay_domain::ChangesetEvent;

use crate::error::ExtractError;

/// Reads changeset metadata out of one repository model.
///
/// Implementations must never mutate repository state, must tolerate root
/// (zero-parent) and merge (two-parent) changesets, and must substitute a
/// documented default when the repository reports no branch. Supporting
/// another repository model means another implementation of this trait, not
/// a change to the driver.
#[async_trait]
pub trait ChangesetReader: Send + Sync {
    /// Enumerate the changesets introduced by a push, oldest first,
    /// starting from the first new changeset id the host handed us.
    async fn incoming(
        &self,
        repo: &Path,
        first_changeset_id: &str,
    ) -> Result<Vec<String>, ExtractError>;

    /// Extract one changeset's metadata.
    async fn read(&self, repo: &Path, changeset_id: &str)
        -> Result<ChangesetEvent, ExtractError>;
}
