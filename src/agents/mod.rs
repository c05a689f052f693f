//! Agent registry: CRUD over agent definitions and their status.
//!
//! The registry is the single owner of the canonical agent records. Every
//! successful caller-facing mutation emits one info-level log entry and
//! enqueues a fire-and-forget snapshot request; run-driven mutations go
//! through the `pub(crate)` contract methods, which stay silent so a run's
//! log output is exactly its stage/outcome entries.

pub mod types;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{EngineError, Result};
use crate::logs::{LogLevel, LogStore};
use crate::persistence::PersistenceHandle;

pub use types::{Agent, AgentPatch, AgentSpec, AgentStatus, Schedule};

pub struct AgentRegistry {
    // Vec keeps creation order for list(); the population is small.
    agents: Mutex<Vec<Agent>>,
    logs: Arc<LogStore>,
    clock: Arc<dyn Clock>,
    persistence: PersistenceHandle,
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(EngineError::Validation(format!(
            "agent {field} must not be empty"
        )));
    }
    Ok(())
}

impl AgentRegistry {
    pub(crate) fn new(
        logs: Arc<LogStore>,
        clock: Arc<dyn Clock>,
        persistence: PersistenceHandle,
    ) -> Self {
        Self {
            agents: Mutex::new(Vec::new()),
            logs,
            clock,
            persistence,
        }
    }

    /// Create a new agent in `Draft` status with a fresh id. Fails with
    /// `Validation` if name, role or goal are empty; nothing is stored then.
    pub async fn create(&self, spec: AgentSpec) -> Result<Agent> {
        require("name", &spec.name)?;
        require("role", &spec.role)?;
        require("goal", &spec.goal)?;

        let agent = Agent {
            id: Uuid::new_v4(),
            name: spec.name,
            description: spec.description,
            role: spec.role,
            goal: spec.goal,
            tools: spec.tools,
            actions: spec.actions,
            schedule: spec.schedule,
            cron_expression: spec.cron_expression,
            status: AgentStatus::Draft,
            created_at: self.clock.now(),
            last_run: None,
            next_run: None,
        };

        self.agents.lock().await.push(agent.clone());
        info!("Agent [{}] created ({})", agent.name, agent.id);
        self.logs
            .append(
                Some(agent.id),
                LogLevel::Info,
                format!("Agent created: {}", agent.name),
                None,
            )
            .await;
        self.persistence.request_snapshot();
        Ok(agent)
    }

    pub async fn get(&self, id: Uuid) -> Result<Agent> {
        self.agents
            .lock()
            .await
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .ok_or(EngineError::NotFound(id))
    }

    /// All agents in creation order.
    pub async fn list(&self) -> Vec<Agent> {
        self.agents.lock().await.clone()
    }

    /// Merge the provided fields into an existing record. `id` and
    /// `created_at` cannot change. Patching `status` only accepts rest
    /// statuses; `Running`/`Completed` are owned by the execution engine.
    pub async fn update(&self, id: Uuid, patch: AgentPatch) -> Result<Agent> {
        if let Some(ref name) = patch.name {
            require("name", name)?;
        }
        if let Some(ref role) = patch.role {
            require("role", role)?;
        }
        if let Some(ref goal) = patch.goal {
            require("goal", goal)?;
        }
        if let Some(status) = patch.status
            && !status.is_rest()
        {
            return Err(EngineError::Validation(
                "agent status can only be patched to draft, active or paused".into(),
            ));
        }

        let updated = {
            let mut agents = self.agents.lock().await;
            let agent = agents
                .iter_mut()
                .find(|a| a.id == id)
                .ok_or(EngineError::NotFound(id))?;

            if let Some(name) = patch.name {
                agent.name = name;
            }
            if let Some(description) = patch.description {
                agent.description = description;
            }
            if let Some(role) = patch.role {
                agent.role = role;
            }
            if let Some(goal) = patch.goal {
                agent.goal = goal;
            }
            if let Some(tools) = patch.tools {
                agent.tools = tools;
            }
            if let Some(actions) = patch.actions {
                agent.actions = actions;
            }
            if let Some(schedule) = patch.schedule {
                agent.schedule = schedule;
            }
            if let Some(cron) = patch.cron_expression {
                agent.cron_expression = Some(cron);
            }
            if let Some(status) = patch.status {
                agent.status = status;
            }
            agent.clone()
        };

        info!("Agent [{}] updated ({})", updated.name, updated.id);
        self.logs
            .append(
                Some(id),
                LogLevel::Info,
                format!("Agent updated: {}", updated.name),
                None,
            )
            .await;
        self.persistence.request_snapshot();
        Ok(updated)
    }

    /// Remove an agent. Returns `false` (not an error) if it was absent, so
    /// deletion is idempotent.
    pub async fn delete(&self, id: Uuid) -> bool {
        let removed = {
            let mut agents = self.agents.lock().await;
            match agents.iter().position(|a| a.id == id) {
                Some(index) => Some(agents.remove(index)),
                None => None,
            }
        };

        match removed {
            Some(agent) => {
                info!("Agent [{}] deleted ({})", agent.name, agent.id);
                self.logs
                    .append(
                        Some(id),
                        LogLevel::Info,
                        format!("Agent deleted: {}", agent.name),
                        None,
                    )
                    .await;
                self.persistence.request_snapshot();
                true
            }
            None => false,
        }
    }

    /// Engine-only status transition (entering `Running`, transient
    /// `Completed`). Emits no caller-facing log entry and no snapshot:
    /// transient statuses must never be the persisted state.
    pub(crate) async fn set_status(&self, id: Uuid, status: AgentStatus) -> Result<()> {
        let mut agents = self.agents.lock().await;
        let agent = agents
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(EngineError::NotFound(id))?;
        agent.status = status;
        Ok(())
    }

    /// Engine-only end-of-run commit. Restores the rest status and, on
    /// success, atomically sets `last_run`/`next_run`; on failure or
    /// cancellation `run_times` is `None` and the schedule fields stay
    /// untouched. Requests a snapshot of the now-consistent state.
    pub(crate) async fn finish_run(
        &self,
        id: Uuid,
        status: AgentStatus,
        run_times: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> Result<Agent> {
        let updated = {
            let mut agents = self.agents.lock().await;
            let agent = agents
                .iter_mut()
                .find(|a| a.id == id)
                .ok_or(EngineError::NotFound(id))?;
            agent.status = status;
            if let Some((last_run, next_run)) = run_times {
                agent.last_run = Some(last_run);
                agent.next_run = Some(next_run);
            }
            agent.clone()
        };
        self.persistence.request_snapshot();
        Ok(updated)
    }

    pub(crate) async fn snapshot_agents(&self) -> Vec<Agent> {
        self.agents.lock().await.clone()
    }

    /// Replace the whole population (restore path).
    pub(crate) async fn replace_all(&self, agents: Vec<Agent>) {
        *self.agents.lock().await = agents;
    }
}
