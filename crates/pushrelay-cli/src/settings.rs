//! Settings file for the hook binary.
//!
//! The core never reads configuration itself; this module loads a TOML file
//! and hands explicit config values to the builder, publisher, and driver.

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use pushrelay_broker::BrokerConfig;

/// Top-level settings file: a `[broker]` table for the connection and a
/// `[hook]` table for extraction and policy.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub broker: BrokerConfig,
    pub hook: HookSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HookSettings {
    /// Root under which repositories live; stripped from repository paths
    /// to form the repository identifier in routing keys and payloads.
    pub repo_root: String,

    /// Branch name substituted when the repository reports none.
    #[serde(default = "default_branch_name")]
    pub default_branch: String,

    /// Emit the per-push summary message.
    #[serde(default = "default_true")]
    pub send_summary: bool,

    /// Optional routing-key prefix, e.g. `"hg"`.
    #[serde(default)]
    pub routing_prefix: String,

    /// Wrap payloads in the self-describing envelope.
    #[serde(default = "default_true")]
    pub use_envelope: bool,

    /// Whether a failed run blocks the push (exit 1) or is logged and
    /// waved through (exit 0). Defaults to fail-open: most sites prefer a
    /// missed notification over a rejected push.
    #[serde(default)]
    pub fail_on_error: bool,
}

fn default_branch_name() -> String {
    "default".to_string()
}

fn default_true() -> bool {
    true
}

impl Settings {
    pub fn load(path: &Path) -> anyhow::Result<Settings> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading settings file {}", path.display()))?;
        let settings: Settings = toml::from_str(&raw)
            .with_context(|| format!("parsing settings file {}", path.display()))?;
        Ok(settings)
    }
}

impl HookSettings {
    /// Repository identifier for a repository path: the path with the
    /// configured root stripped. Falls back to the full path when the
    /// repository lives outside the root.
    pub fn repository_identifier(&self, repo: &Path) -> String {
        let repo = repo.to_string_lossy();
        let root = self.repo_root.trim_end_matches('/');
        let stripped = repo
            .strip_prefix(root)
            .map(|rest| rest.trim_start_matches('/'))
            .filter(|rest| !rest.is_empty())
            .unwrap_or(&repo);
        stripped.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
        [broker]
        host = "broker.internal"
        username = "hg"
        password = "secret"
        exchange = "hg-events"

        [hook]
        repo_root = "/srv/hg"
        routing_prefix = "hg"
    "#;

    #[test]
    fn sample_settings_parse_with_defaults() {
        let settings: Settings = toml::from_str(SAMPLE).unwrap();
        assert_eq!(settings.broker.host, "broker.internal");
        assert_eq!(settings.broker.port, 61613);
        assert_eq!(settings.hook.default_branch, "default");
        assert!(settings.hook.send_summary);
        assert!(settings.hook.use_envelope);
        assert!(!settings.hook.fail_on_error);
        assert_eq!(settings.hook.routing_prefix, "hg");
    }

    #[test]
    fn missing_required_broker_values_fail_loudly() {
        let result: Result<Settings, _> = toml::from_str(
            r#"
            [broker]
            host = "broker.internal"

            [hook]
            repo_root = "/srv/hg"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn loads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let settings = Settings::load(file.path()).unwrap();
        assert_eq!(settings.broker.exchange, "hg-events");
    }

    #[test]
    fn repository_identifier_strips_the_root() {
        let settings: Settings = toml::from_str(SAMPLE).unwrap();
        let hook = settings.hook;
        assert_eq!(
            hook.repository_identifier(Path::new("/srv/hg/team/proj")),
            "team/proj"
        );
        assert_eq!(
            hook.repository_identifier(Path::new("/elsewhere/proj")),
            "/elsewhere/proj"
        );
        assert_eq!(hook.repository_identifier(Path::new("/srv/hg")), "/srv/hg");
    }
}
