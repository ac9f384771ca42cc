//! Per-push orchestration: extract, build, publish, report.

use std::fmt;
use std::path::Path;

use tracing::{debug, info};

use pushrelay_broker::BrokerPublisher;
use pushrelay_domain::{ChangesetEvent, Message, MessageBuilder, PushContext};

use crate::error::HookError;
use crate::reader::ChangesetReader;

/// Driver stage, named in diagnostics when a run fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStage {
    ExtractingChangesets,
    BuildingMessages,
    Publishing,
}

impl fmt::Display for HookStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookStage::ExtractingChangesets => write!(f, "extracting-changesets"),
            HookStage::BuildingMessages => write!(f, "building-messages"),
            HookStage::Publishing => write!(f, "publishing"),
        }
    }
}

/// Explicit run result handed back to the host integration layer, which
/// translates it into whatever the host's hook protocol needs.
#[derive(Debug)]
pub enum HookOutcome {
    /// Every message for the push was delivered.
    Succeeded { published: usize },
    /// The run stopped; `reason` names the failing stage and changeset or
    /// routing key. Messages already delivered stay delivered.
    Failed { stage: HookStage, reason: String },
}

impl HookOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, HookOutcome::Succeeded { .. })
    }
}

/// Driver tuning, separate from broker settings.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Emit the per-push summary message after the changeset messages.
    pub send_summary: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig { send_summary: true }
    }
}

/// Runs one push transaction: `Start -> ExtractingChangesets ->
/// BuildingMessages -> Publishing -> Succeeded | Failed`.
///
/// Fail-fast: any extraction or build error stops the run before anything
/// is published. Publishing connects once, sends changeset messages oldest
/// first and the summary last over that one session, and closes the session
/// on every exit path.
pub struct HookDriver<R: ChangesetReader> {
    reader: R,
    builder: MessageBuilder,
    publisher: BrokerPublisher,
    config: DriverConfig,
}

impl<R: ChangesetReader> HookDriver<R> {
    pub fn new(
        reader: R,
        builder: MessageBuilder,
        publisher: BrokerPublisher,
        config: DriverConfig,
    ) -> Self {
        HookDriver {
            reader,
            builder,
            publisher,
            config,
        }
    }

    /// Execute the run. Never panics on bad input; every failure becomes a
    /// `HookOutcome::Failed` with the offending stage and identifier.
    pub async fn run(&mut self, repo: &Path, ctx: PushContext) -> HookOutcome {
        if ctx.changeset_ids.is_empty() {
            // A no-op push is not an error.
            info!(repository = %ctx.repository_identifier, "empty push, nothing to publish");
            return HookOutcome::Succeeded { published: 0 };
        }
        match self.execute(repo, ctx).await {
            Ok(published) => HookOutcome::Succeeded { published },
            Err(e) => HookOutcome::Failed {
                stage: e.stage(),
                reason: e.to_string(),
            },
        }
    }

    async fn execute(&mut self, repo: &Path, ctx: PushContext) -> Result<usize, HookError> {
        let events = self.extract(repo, &ctx).await?;

        // The push as a whole is attributed to its tip changeset's branch;
        // that drives the summary routing key.
        let tip_branch = events
            .last()
            .map(|e| e.branch.clone())
            .unwrap_or_else(|| ctx.branch.clone());
        let ctx = ctx.with_branch(tip_branch);

        let messages = self.build(&ctx, &events)?;
        self.publish(&ctx, messages).await
    }

    async fn extract(
        &self,
        repo: &Path,
        ctx: &PushContext,
    ) -> Result<Vec<ChangesetEvent>, HookError> {
        let mut events = Vec::with_capacity(ctx.changeset_ids.len());
        for changeset_id in &ctx.changeset_ids {
            let event = self.reader.read(repo, changeset_id).await?;
            debug!(changeset_id = %event.changeset_id, branch = %event.branch, "extracted changeset");
            events.push(event);
        }
        Ok(events)
    }

    fn build(
        &self,
        ctx: &PushContext,
        events: &[ChangesetEvent],
    ) -> Result<Vec<Message>, HookError> {
        let mut messages = Vec::with_capacity(events.len() + 1);
        for event in events {
            let message =
                self.builder
                    .build_changeset_message(ctx, event)
                    .map_err(|source| HookError::Build {
                        subject: event.changeset_id.clone(),
                        source,
                    })?;
            messages.push(message);
        }
        if self.config.send_summary {
            let summary = self
                .builder
                .build_summary_message(ctx)
                .map_err(|source| HookError::Build {
                    subject: format!("push summary for {}", ctx.repository_identifier),
                    source,
                })?;
            messages.push(summary);
        }
        Ok(messages)
    }

    async fn publish(
        &mut self,
        ctx: &PushContext,
        messages: Vec<Message>,
    ) -> Result<usize, HookError> {
        self.publisher.connect().await.map_err(HookError::Connect)?;

        let mut published = 0usize;
        let mut failure: Option<HookError> = None;
        for message in &messages {
            match self.publisher.publish(message).await {
                Ok(receipt) => {
                    debug!(
                        routing_key = %message.routing_key,
                        attempts = receipt.attempts,
                        "published"
                    );
                    published += 1;
                }
                Err(source) => {
                    // No recall of already-delivered messages; stop and
                    // report.
                    failure = Some(HookError::Publish {
                        routing_key: message.routing_key.as_str().to_string(),
                        source,
                    });
                    break;
                }
            }
        }

        // Scoped session: closed on success and on failure alike.
        self.publisher.close().await;

        match failure {
            Some(e) => Err(e),
            None => {
                info!(
                    repository = %ctx.repository_identifier,
                    changesets = ctx.changeset_ids.len(),
                    published,
                    "push fully notified"
                );
                Ok(published)
            }
        }
    }
}
