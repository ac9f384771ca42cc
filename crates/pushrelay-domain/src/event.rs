//! Changeset and push records as extracted from the repository.

use std::collections::BTreeSet;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

/// One committed revision, read from the repository transaction.
///
/// Immutable once created: the reader builds it, the builder serializes it,
/// nothing mutates it in between. `files_touched` is a `BTreeSet` so the
/// serialized file list is ordered the same way on every build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangesetEvent {
    /// Content-derived unique identifier (40-char hex for Mercurial).
    pub changeset_id: String,

    /// Zero (root), one, or two (merge) parent identifiers, in repository
    /// order.
    pub parent_ids: Vec<String>,

    /// Author exactly as recorded, typically `Name <email>`.
    pub author: String,

    /// Commit instant with the committer's timezone offset preserved.
    pub timestamp: DateTime<FixedOffset>,

    /// Named branch. Never empty: readers substitute a configured default
    /// when the repository reports none.
    pub branch: String,

    /// Commit message, may be empty.
    pub message: String,

    /// Paths touched by this changeset.
    pub files_touched: BTreeSet<String>,
}

/// One hook invocation: the push being committed.
///
/// Created once per run and treated as read-only while the run executes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushContext {
    /// Configured name or root-relative path of the repository.
    pub repository_identifier: String,

    /// New changeset ids in commit order, oldest first.
    pub changeset_ids: Vec<String>,

    /// Originating host/user, when the host exposes it.
    pub source: Option<String>,

    /// Instant the push was received, set by the host glue. Carried here
    /// rather than sampled at build time so message construction stays
    /// deterministic.
    pub pushed_at: DateTime<Utc>,

    /// Branch attributed to the push as a whole; drives the summary routing
    /// key. The driver resolves this from the tip changeset of the push.
    pub branch: String,
}

impl PushContext {
    /// Replace the push-level branch, used once extraction has revealed the
    /// tip changeset's branch.
    pub fn with_branch(mut self, branch: String) -> Self {
        self.branch = branch;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn files_touched_serializes_in_path_order() {
        let event = ChangesetEvent {
            changeset_id: "a1b2".into(),
            parent_ids: vec![],
            author: "alice".into(),
            timestamp: "2023-01-01T00:00:00+00:00".parse().unwrap(),
            branch: "default".into(),
            message: String::new(),
            files_touched: ["z.rs", "a.rs", "m.rs"].iter().map(|s| s.to_string()).collect(),
        };
        let json = serde_json::to_string(&event).unwrap();
        let a = json.find("a.rs").unwrap();
        let m = json.find("m.rs").unwrap();
        let z = json.find("z.rs").unwrap();
        assert!(a < m && m < z);
    }
}
