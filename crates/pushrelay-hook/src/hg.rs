//! Mercurial-backed changeset reader.
//!
//! Shells out to `hg log` with a control-character-delimited template and
//! parses the records. Read-only: nothing here writes to the repository.

use std::collections::BTreeSet;
use std::path::Path;

use async_trait::async_trait;
use chrono::DateTime;
use tokio::process::Command;
use tracing::debug;

use pushrelay_domain::ChangesetEvent;

use crate::error::ExtractError;
use crate::reader::ChangesetReader;

/// The all-zeros id Mercurial uses for an absent parent.
const NULL_ID: &str = "0000000000000000000000000000000000000000";

/// Field separator inside one record; `\x1e` separates file paths.
const FIELD_SEP: char = '\x1f';
const FILE_SEP: char = '\x1e';

/// `hg log` template producing one parseable record per changeset. Field
/// order: node, p1, p2, branch, date, author, files, description. The
/// description comes last because it is the one field that may contain
/// anything.
const RECORD_TEMPLATE: &str =
    "{node}\x1f{p1node}\x1f{p2node}\x1f{branch}\x1f{date|rfc3339date}\x1f{author}\x1f{join(files,'\x1e')}\x1f{desc}";

/// Reads pushed changesets from a Mercurial repository via the `hg` binary.
pub struct HgChangesetReader {
    default_branch: String,
}

impl HgChangesetReader {
    /// `default_branch` is substituted whenever the repository reports an
    /// empty branch name; Mercurial's conventional value is `"default"`.
    pub fn new(default_branch: impl Into<String>) -> Self {
        HgChangesetReader {
            default_branch: default_branch.into(),
        }
    }

    async fn run_hg(
        &self,
        repo: &Path,
        changeset_id: &str,
        args: &[&str],
    ) -> Result<Vec<u8>, ExtractError> {
        let output = Command::new("hg")
            .args(args)
            .current_dir(repo)
            .output()
            .await
            .map_err(|e| ExtractError::Extraction {
                changeset_id: changeset_id.to_string(),
                reason: format!("failed to run hg: {e}"),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractError::Extraction {
                changeset_id: changeset_id.to_string(),
                reason: format!("hg {} failed: {}", args.first().unwrap_or(&""), stderr.trim()),
            });
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl ChangesetReader for HgChangesetReader {
    async fn incoming(
        &self,
        repo: &Path,
        first_changeset_id: &str,
    ) -> Result<Vec<String>, ExtractError> {
        // Everything from the first new changeset through tip is part of
        // this push, in commit order.
        let range = format!("{first_changeset_id}:tip");
        let stdout = self
            .run_hg(
                repo,
                first_changeset_id,
                &["log", "-r", range.as_str(), "-T", "{node}\\n"],
            )
            .await?;
        let text = String::from_utf8_lossy(&stdout);
        let ids: Vec<String> = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        debug!(first = %first_changeset_id, count = ids.len(), "enumerated pushed changesets");
        Ok(ids)
    }

    async fn read(
        &self,
        repo: &Path,
        changeset_id: &str,
    ) -> Result<ChangesetEvent, ExtractError> {
        let stdout = self
            .run_hg(
                repo,
                changeset_id,
                &["log", "-r", changeset_id, "-T", RECORD_TEMPLATE],
            )
            .await?;
        if stdout.is_empty() {
            return Err(ExtractError::Extraction {
                changeset_id: changeset_id.to_string(),
                reason: "changeset not found".to_string(),
            });
        }
        parse_record(changeset_id, &self.default_branch, &stdout)
    }
}

/// Parse one `RECORD_TEMPLATE` record. Pure, so it is testable without a
/// Mercurial installation.
fn parse_record(
    changeset_id: &str,
    default_branch: &str,
    raw: &[u8],
) -> Result<ChangesetEvent, ExtractError> {
    let malformed = |field: &str, reason: String| ExtractError::MalformedData {
        changeset_id: changeset_id.to_string(),
        field: field.to_string(),
        reason,
    };

    // Required fields are text; refusing non-UTF-8 beats silently mangling
    // what subscribers receive.
    let text = std::str::from_utf8(raw)
        .map_err(|e| malformed("encoding", format!("record is not valid UTF-8: {e}")))?;

    let fields: Vec<&str> = text.splitn(8, FIELD_SEP).collect();
    if fields.len() != 8 {
        return Err(ExtractError::Extraction {
            changeset_id: changeset_id.to_string(),
            reason: format!("expected 8 record fields, got {}", fields.len()),
        });
    }
    let [node, p1, p2, branch, date, author, files, desc] =
        [fields[0], fields[1], fields[2], fields[3], fields[4], fields[5], fields[6], fields[7]];

    let parent_ids: Vec<String> = [p1, p2]
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty() && *p != NULL_ID)
        .map(str::to_string)
        .collect();

    let author = author.trim();
    if author.is_empty() {
        return Err(malformed("author", "author is missing".to_string()));
    }

    let timestamp = DateTime::parse_from_rfc3339(date.trim())
        .map_err(|e| malformed("timestamp", format!("unparsable date {:?}: {e}", date.trim())))?;

    let branch = branch.trim();
    let branch = if branch.is_empty() {
        default_branch.to_string()
    } else {
        branch.to_string()
    };

    let files_touched: BTreeSet<String> = files
        .split(FILE_SEP)
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .collect();

    Ok(ChangesetEvent {
        changeset_id: node.trim().to_string(),
        parent_ids,
        author: author.to_string(),
        timestamp,
        branch,
        message: desc.trim_end_matches('\n').to_string(),
        files_touched,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(fields: [&str; 8]) -> Vec<u8> {
        fields.join("\x1f").into_bytes()
    }

    const P1: &str = "1111111111111111111111111111111111111111";
    const P2: &str = "2222222222222222222222222222222222222222";

    #[test]
    fn ordinary_changeset_parses() {
        let raw = record([
            "a1b2",
            P1,
            NULL_ID,
            "default",
            "2023-01-01T00:00:00+00:00",
            "Alice <alice@example.com>",
            "src/lib.rs\x1eREADME",
            "fix the thing",
        ]);
        let event = parse_record("a1b2", "default", &raw).unwrap();
        assert_eq!(event.changeset_id, "a1b2");
        assert_eq!(event.parent_ids, vec![P1.to_string()]);
        assert_eq!(event.author, "Alice <alice@example.com>");
        assert_eq!(event.branch, "default");
        assert_eq!(event.message, "fix the thing");
        assert_eq!(event.files_touched.len(), 2);
    }

    #[test]
    fn root_changeset_has_no_parents() {
        let raw = record([
            "a1b2",
            NULL_ID,
            NULL_ID,
            "default",
            "2023-01-01T00:00:00+00:00",
            "alice",
            "",
            "init",
        ]);
        let event = parse_record("a1b2", "default", &raw).unwrap();
        assert!(event.parent_ids.is_empty());
        assert!(event.files_touched.is_empty());
    }

    #[test]
    fn merge_changeset_keeps_both_parents_in_order() {
        let raw = record([
            "a1b2",
            P1,
            P2,
            "stable",
            "2023-01-01T00:00:00+00:00",
            "alice",
            "",
            "merge",
        ]);
        let event = parse_record("a1b2", "default", &raw).unwrap();
        assert_eq!(event.parent_ids, vec![P1.to_string(), P2.to_string()]);
    }

    #[test]
    fn empty_branch_gets_the_configured_default() {
        let raw = record([
            "a1b2",
            P1,
            NULL_ID,
            "",
            "2023-01-01T00:00:00+00:00",
            "alice",
            "",
            "msg",
        ]);
        let event = parse_record("a1b2", "trunk", &raw).unwrap();
        assert_eq!(event.branch, "trunk");
        // Substitution is deterministic.
        let again = parse_record("a1b2", "trunk", &raw).unwrap();
        assert_eq!(again.branch, "trunk");
    }

    #[test]
    fn unparsable_timestamp_is_malformed_data() {
        let raw = record([
            "a1b2", P1, NULL_ID, "default", "yesterday-ish", "alice", "", "msg",
        ]);
        let err = parse_record("a1b2", "default", &raw).unwrap_err();
        match err {
            ExtractError::MalformedData {
                changeset_id,
                field,
                ..
            } => {
                assert_eq!(changeset_id, "a1b2");
                assert_eq!(field, "timestamp");
            }
            other => panic!("expected MalformedData, got {other:?}"),
        }
    }

    #[test]
    fn missing_author_is_malformed_data() {
        let raw = record([
            "a1b2",
            P1,
            NULL_ID,
            "default",
            "2023-01-01T00:00:00+00:00",
            "  ",
            "",
            "msg",
        ]);
        let err = parse_record("a1b2", "default", &raw).unwrap_err();
        assert!(matches!(
            err,
            ExtractError::MalformedData { ref field, .. } if field == "author"
        ));
    }

    #[test]
    fn timezone_offset_is_preserved() {
        let raw = record([
            "a1b2",
            P1,
            NULL_ID,
            "default",
            "2023-06-15T12:30:00+09:00",
            "alice",
            "",
            "msg",
        ]);
        let event = parse_record("a1b2", "default", &raw).unwrap();
        assert_eq!(event.timestamp.offset().local_minus_utc(), 9 * 3600);
    }

    #[test]
    fn description_may_contain_separator_bytes() {
        let raw = record([
            "a1b2",
            P1,
            NULL_ID,
            "default",
            "2023-01-01T00:00:00+00:00",
            "alice",
            "a.rs",
            "odd\x1fmessage",
        ]);
        let event = parse_record("a1b2", "default", &raw).unwrap();
        assert_eq!(event.message, "odd\x1fmessage");
    }

    #[test]
    fn non_utf8_record_is_rejected_not_truncated() {
        let mut raw = record([
            "a1b2",
            P1,
            NULL_ID,
            "default",
            "2023-01-01T00:00:00+00:00",
            "alice",
            "",
            "msg",
        ]);
        raw.push(0xff);
        let err = parse_record("a1b2", "default", &raw).unwrap_err();
        assert!(matches!(
            err,
            ExtractError::MalformedData { ref field, .. } if field == "encoding"
        ));
    }
}
