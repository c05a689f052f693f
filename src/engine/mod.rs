//! Execution engine: runs an agent's action sequence in sandbox or live
//! mode, drives the per-run state machine and commits schedule updates.
//!
//! State machine per invocation: rest status (draft/active/paused) ->
//! `Running` -> transient `Completed` -> back to the pre-run rest status on
//! success, or straight back to the rest status on failure/cancellation.
//! `last_run`/`next_run` are committed atomically and only on success.

mod actions;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::agents::{Agent, AgentRegistry, AgentStatus};
use crate::clock::Clock;
use crate::error::{EngineError, Result};
use crate::logs::{LogLevel, LogStore};

pub use actions::{ActionExecutor, NoopExecutor};

/// External evaluator for `custom` schedules. No cron parser ships in this
/// crate; without an evaluator (or when it declines, or yields a time that
/// is not in the future) the next run falls back to +24h like the original.
pub trait CustomScheduleEvaluator: Send + Sync {
    fn next_run(&self, expression: &str, after: DateTime<Utc>) -> Option<DateTime<Utc>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Fixed simulated stage sequence, no real side effects.
    Sandbox,
    /// Sequence the agent's action list through the `ActionExecutor`.
    Live,
}

/// The original assistant's simulation script: message and the delay that
/// follows it.
const SANDBOX_STAGES: &[(&str, u64)] = &[
    ("Simulating: Searching for trending topics...", 1000),
    ("Simulating: Generating content...", 1000),
    ("Simulating: Preview generated (sandbox - no actual posting)", 500),
];

const LIVE_ACTION_DELAY_MS: u64 = 1000;

pub struct ExecutionEngine {
    registry: Arc<AgentRegistry>,
    logs: Arc<LogStore>,
    clock: Arc<dyn Clock>,
    actions: Arc<dyn ActionExecutor>,
    evaluator: Option<Arc<dyn CustomScheduleEvaluator>>,
    // std mutex so the drop guard can release its slot on any exit path
    in_flight: Mutex<HashMap<Uuid, CancellationToken>>,
}

/// Releases the per-agent run slot when the run ends, however it ends.
struct RunGuard<'a> {
    engine: &'a ExecutionEngine,
    id: Uuid,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.engine
            .in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.id);
    }
}

impl ExecutionEngine {
    pub(crate) fn new(
        registry: Arc<AgentRegistry>,
        logs: Arc<LogStore>,
        clock: Arc<dyn Clock>,
        actions: Arc<dyn ActionExecutor>,
        evaluator: Option<Arc<dyn CustomScheduleEvaluator>>,
    ) -> Self {
        Self {
            registry,
            logs,
            clock,
            actions,
            evaluator,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Run one agent to completion. At most one run per agent id may be in
    /// flight; runs of different agents proceed concurrently.
    ///
    /// On success the agent's `last_run` is the run's start time and
    /// `next_run` is `last_run` plus the schedule offset. On failure or
    /// cancellation both are left untouched and the status reverts to the
    /// pre-run rest status.
    pub async fn run_agent(&self, id: Uuid, mode: RunMode) -> Result<Agent> {
        let agent = self.registry.get(id).await?;
        let token = self.begin(id)?;
        let _guard = RunGuard { engine: self, id };

        let prior = if agent.status.is_rest() {
            agent.status
        } else {
            AgentStatus::Draft
        };
        let started_at = self.clock.now();

        info!("Agent [{}] run starting ({:?} mode)", agent.name, mode);
        self.registry.set_status(id, AgentStatus::Running).await?;

        let result = match mode {
            RunMode::Sandbox => self.run_sandbox(&agent, &token).await,
            RunMode::Live => self.run_live(&agent, &token).await,
        };

        match result {
            Ok(()) => {
                let next_run = self.next_run_after(&agent, started_at);
                self.registry.set_status(id, AgentStatus::Completed).await?;
                let updated = self
                    .registry
                    .finish_run(id, prior, Some((started_at, next_run)))
                    .await?;
                self.logs
                    .append(
                        Some(id),
                        LogLevel::Success,
                        "Agent executed successfully",
                        None,
                    )
                    .await;
                Ok(updated)
            }
            Err(EngineError::Canceled) => {
                self.registry.finish_run(id, prior, None).await?;
                self.logs
                    .append(Some(id), LogLevel::Warning, "Agent run canceled", None)
                    .await;
                Err(EngineError::Canceled)
            }
            Err(err) => {
                self.registry.finish_run(id, prior, None).await?;
                let details = match &err {
                    EngineError::ActionFailed { action, source } => Some(serde_json::json!({
                        "action": action,
                        "cause": source.to_string(),
                    })),
                    _ => None,
                };
                self.logs
                    .append(
                        Some(id),
                        LogLevel::Error,
                        format!("Execution failed: {err}"),
                        details,
                    )
                    .await;
                Err(err)
            }
        }
    }

    /// Best-effort cancellation of an in-flight run: the current stage or
    /// action completes, then the run stops, reverts the status and emits a
    /// warning log entry. Returns `false` if no run was in flight.
    pub fn cancel(&self, id: Uuid) -> bool {
        let in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        match in_flight.get(&id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    fn begin(&self, id: Uuid) -> Result<CancellationToken> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if in_flight.contains_key(&id) {
            return Err(EngineError::AlreadyRunning(id));
        }
        let token = CancellationToken::new();
        in_flight.insert(id, token.clone());
        Ok(token)
    }

    async fn run_sandbox(&self, agent: &Agent, token: &CancellationToken) -> Result<()> {
        for (message, delay_ms) in SANDBOX_STAGES {
            self.logs
                .append(Some(agent.id), LogLevel::Info, *message, None)
                .await;
            self.pause(token, *delay_ms).await?;
        }
        Ok(())
    }

    async fn run_live(&self, agent: &Agent, token: &CancellationToken) -> Result<()> {
        for action in &agent.actions {
            if token.is_cancelled() {
                return Err(EngineError::Canceled);
            }

            self.logs
                .append(
                    Some(agent.id),
                    LogLevel::Info,
                    format!("Running action: {action}"),
                    None,
                )
                .await;

            match self.actions.execute(agent, action).await {
                Ok(result) => {
                    let details = result.map(|text| serde_json::json!({ "result": text }));
                    self.logs
                        .append(
                            Some(agent.id),
                            LogLevel::Info,
                            format!("Action completed: {action}"),
                            details,
                        )
                        .await;
                }
                Err(source) => {
                    return Err(EngineError::ActionFailed {
                        action: action.clone(),
                        source,
                    });
                }
            }

            self.pause(token, LIVE_ACTION_DELAY_MS).await?;
        }
        Ok(())
    }

    /// Cancellable wait between stages/actions. These waits are the run's
    /// only suspension points.
    async fn pause(&self, token: &CancellationToken, millis: u64) -> Result<()> {
        if token.is_cancelled() {
            return Err(EngineError::Canceled);
        }
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(EngineError::Canceled),
            _ = self.clock.sleep(Duration::from_millis(millis)) => Ok(()),
        }
    }

    fn next_run_after(&self, agent: &Agent, started_at: DateTime<Utc>) -> DateTime<Utc> {
        match agent.schedule.offset() {
            Some(offset) => started_at + offset,
            None => agent
                .cron_expression
                .as_deref()
                .zip(self.evaluator.as_ref())
                .and_then(|(expr, evaluator)| evaluator.next_run(expr, started_at))
                .filter(|next| *next > started_at)
                .unwrap_or(started_at + TimeDelta::hours(24)),
        }
    }
}
