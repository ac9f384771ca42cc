//! Routing key derivation for topic-exchange matching.
//!
//! Key rule (version 1, a contract with every subscriber's binding pattern):
//! tokens are lowercased, path separators become token separators, `*`, `#`,
//! and whitespace are substituted with `-`, and tokens are ordered
//! `repository.branch.event_kind`. An optional configured prefix is
//! sanitized the same way and prepended.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Event kind token for a single-changeset message.
pub const EVENT_KIND_CHANGESET: &str = "changeset";

/// Event kind token for the per-push summary message.
pub const EVENT_KIND_PUSH: &str = "push";

/// A dot-separated topic-exchange routing key.
///
/// The inner string is private so a key can only be produced through
/// [`RoutingKey::changeset`] / [`RoutingKey::push_summary`], which guarantee
/// the charset `[a-z0-9._-]` with no wildcards and no whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoutingKey(String);

impl RoutingKey {
    /// Key for one changeset message: `[prefix.]repository.branch.changeset`.
    pub fn changeset(prefix: &str, repository: &str, branch: &str) -> Self {
        Self::from_parts(prefix, repository, branch, EVENT_KIND_CHANGESET)
    }

    /// Key for the push summary message: `[prefix.]repository.branch.push`.
    pub fn push_summary(prefix: &str, repository: &str, branch: &str) -> Self {
        Self::from_parts(prefix, repository, branch, EVENT_KIND_PUSH)
    }

    fn from_parts(prefix: &str, repository: &str, branch: &str, kind: &str) -> Self {
        let mut tokens = Vec::with_capacity(4);
        if !prefix.is_empty() {
            tokens.push(sanitize_segment(prefix));
        }
        tokens.push(sanitize_segment(repository));
        tokens.push(sanitize_segment(branch));
        tokens.push(kind.to_string());
        RoutingKey(tokens.join("."))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sanitize one raw segment (repository name, branch, prefix) into one or
/// more dot-separated tokens.
///
/// - ASCII alphanumerics are lowercased and kept, as are `-` and `_`
/// - `/`, `\` and `.` become the token separator `.`
/// - everything else (`*`, `#`, whitespace, non-ASCII) becomes `-`
/// - runs of separators collapse; leading/trailing separators are trimmed
/// - a segment that sanitizes to nothing becomes `unnamed` so the key keeps
///   its fixed token positions
fn sanitize_segment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut prev_dot = true;
    for c in raw.chars() {
        match c {
            'a'..='z' | '0'..='9' | '-' | '_' => {
                out.push(c);
                prev_dot = false;
            }
            'A'..='Z' => {
                out.push(c.to_ascii_lowercase());
                prev_dot = false;
            }
            '/' | '\\' | '.' => {
                if !prev_dot {
                    out.push('.');
                    prev_dot = true;
                }
            }
            _ => {
                out.push('-');
                prev_dot = false;
            }
        }
    }
    let trimmed = out.trim_matches('.');
    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_tokens_pass_through_lowercased() {
        let key = RoutingKey::changeset("", "Proj", "Default");
        assert_eq!(key.as_str(), "proj.default.changeset");
    }

    #[test]
    fn path_separators_become_token_separators() {
        let key = RoutingKey::changeset("", "team/proj", "default");
        assert_eq!(key.as_str(), "team.proj.default.changeset");
    }

    #[test]
    fn wildcards_and_whitespace_are_substituted() {
        let key = RoutingKey::changeset("", "pro*j", "my branch#2");
        assert_eq!(key.as_str(), "pro-j.my-branch-2.changeset");
    }

    #[test]
    fn no_generated_key_contains_wildcards_or_whitespace() {
        let hostile = ["a*b", "#", "x y\tz", "*.#", "  ", "a/.b", "ä.ö"];
        for repo in hostile {
            for branch in hostile {
                let key = RoutingKey::push_summary("hg.", repo, branch);
                assert!(
                    !key.as_str().contains(['*', '#', ' ', '\t', '\n']),
                    "unsafe key {:?} from repo {:?} branch {:?}",
                    key,
                    repo,
                    branch
                );
            }
        }
    }

    #[test]
    fn prefix_is_sanitized_and_prepended() {
        let key = RoutingKey::changeset("hg.", "proj", "default");
        assert_eq!(key.as_str(), "hg.proj.default.changeset");
    }

    #[test]
    fn empty_segments_keep_token_positions() {
        let key = RoutingKey::changeset("", "///", "default");
        assert_eq!(key.as_str(), "unnamed.default.changeset");
    }

    #[test]
    fn repeated_separators_collapse() {
        let key = RoutingKey::changeset("", "a//b..c", "default");
        assert_eq!(key.as_str(), "a.b.c.default.changeset");
    }
}
