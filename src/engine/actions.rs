use async_trait::async_trait;
use tracing::debug;

use crate::agents::Agent;

/// External collaborator that performs one live action (a browser automation
/// step, a CLI command, ...). This crate only sequences the calls and
/// interprets success/failure; the action semantics live outside it.
///
/// `Ok(Some(text))` attaches result text to the completion log entry.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, agent: &Agent, action: &str) -> anyhow::Result<Option<String>>;
}

/// Executor that performs nothing and always succeeds. Useful while wiring a
/// context up for sandbox-only use.
pub struct NoopExecutor;

#[async_trait]
impl ActionExecutor for NoopExecutor {
    async fn execute(&self, agent: &Agent, action: &str) -> anyhow::Result<Option<String>> {
        debug!("NoopExecutor skipping action '{}' for [{}]", action, agent.name);
        Ok(None)
    }
}
