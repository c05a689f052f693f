use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Schedule {
    Hourly,
    #[default]
    Daily,
    Weekly,
    /// Interpreted by an external evaluator via the agent's cron expression.
    Custom,
}

impl Schedule {
    /// Fixed offset added to a run's start time to get the next run, or
    /// `None` for `Custom` (evaluator-defined).
    pub fn offset(&self) -> Option<TimeDelta> {
        match self {
            Schedule::Hourly => Some(TimeDelta::hours(1)),
            Schedule::Daily => Some(TimeDelta::hours(24)),
            Schedule::Weekly => Some(TimeDelta::days(7)),
            Schedule::Custom => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Draft,
    Active,
    Paused,
    /// Transient: only while a run is in flight.
    Running,
    /// Transient: set between a run finishing and its result being committed.
    Completed,
}

impl AgentStatus {
    /// Rest statuses are the ones an agent can be stored with between runs.
    pub fn is_rest(&self) -> bool {
        matches!(
            self,
            AgentStatus::Draft | AgentStatus::Active | AgentStatus::Paused
        )
    }
}

/// A named automation task. Owned exclusively by the registry; the execution
/// engine mutates it only through the registry's update contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub role: String,
    pub goal: String,
    pub tools: Vec<String>,
    pub actions: Vec<String>,
    pub schedule: Schedule,
    pub cron_expression: Option<String>,
    pub status: AgentStatus,
    pub created_at: DateTime<Utc>,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
}

/// Creation payload. `name`, `role` and `goal` are required; everything else
/// defaults to the original assistant's defaults (daily schedule, no tools).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub role: String,
    pub goal: String,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default)]
    pub schedule: Schedule,
    #[serde(default)]
    pub cron_expression: Option<String>,
}

/// Partial update. `id` and `created_at` are not patchable; `last_run` and
/// `next_run` are owned by the execution engine and not patchable either.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub role: Option<String>,
    pub goal: Option<String>,
    pub tools: Option<Vec<String>>,
    pub actions: Option<Vec<String>>,
    pub schedule: Option<Schedule>,
    pub cron_expression: Option<String>,
    pub status: Option<AgentStatus>,
}
