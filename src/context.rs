//! The context object owning registry, log store, execution engine and
//! persistence. Constructed once at process start and passed to callers —
//! there are no module-level singletons in this crate.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::agents::{Agent, AgentPatch, AgentRegistry, AgentSpec};
use crate::clock::Clock;
use crate::engine::{ActionExecutor, CustomScheduleEvaluator, ExecutionEngine, RunMode};
use crate::error::Result;
use crate::logs::{DEFAULT_LOG_CAPACITY, LogEntry, LogStore};
use crate::persistence::{KeyValueStore, PersistenceAdapter, PersistenceHandle, spawn_worker};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum retained log entries; oldest are trimmed first.
    pub log_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_capacity: DEFAULT_LOG_CAPACITY,
        }
    }
}

pub struct EngineContext {
    registry: Arc<AgentRegistry>,
    logs: Arc<LogStore>,
    engine: Arc<ExecutionEngine>,
    adapter: Arc<PersistenceAdapter>,
    persistence: PersistenceHandle,
    errors: broadcast::Sender<String>,
}

impl EngineContext {
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn KeyValueStore>,
        actions: Arc<dyn ActionExecutor>,
        evaluator: Option<Arc<dyn CustomScheduleEvaluator>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let persistence = PersistenceHandle::new(tx);
        let logs = Arc::new(LogStore::new(clock.clone(), config.log_capacity));
        let registry = Arc::new(AgentRegistry::new(
            logs.clone(),
            clock.clone(),
            persistence.clone(),
        ));
        let engine = Arc::new(ExecutionEngine::new(
            registry.clone(),
            logs.clone(),
            clock,
            actions,
            evaluator,
        ));
        let adapter = Arc::new(PersistenceAdapter::new(
            registry.clone(),
            logs.clone(),
            store,
        ));

        let (errors, _) = broadcast::channel(64);
        // the worker exits on its own once this context (the last sender) drops
        spawn_worker(adapter.clone(), logs.clone(), rx, errors.clone());

        Self {
            registry,
            logs,
            engine,
            adapter,
            persistence,
            errors,
        }
    }

    // --- Registry ---

    pub async fn create_agent(&self, spec: AgentSpec) -> Result<Agent> {
        self.registry.create(spec).await
    }

    pub async fn get_agent(&self, id: Uuid) -> Result<Agent> {
        self.registry.get(id).await
    }

    pub async fn list_agents(&self) -> Vec<Agent> {
        self.registry.list().await
    }

    pub async fn update_agent(&self, id: Uuid, patch: AgentPatch) -> Result<Agent> {
        self.registry.update(id, patch).await
    }

    pub async fn delete_agent(&self, id: Uuid) -> bool {
        self.registry.delete(id).await
    }

    // --- Execution ---

    pub async fn run_agent(&self, id: Uuid, mode: RunMode) -> Result<Agent> {
        self.engine.run_agent(id, mode).await
    }

    pub fn cancel_run(&self, id: Uuid) -> bool {
        self.engine.cancel(id)
    }

    // --- Logs ---

    pub async fn get_logs(&self, agent_id: Option<Uuid>) -> Vec<LogEntry> {
        self.logs.query(agent_id).await
    }

    pub async fn clear_logs(&self) {
        self.logs.clear().await;
        self.persistence.request_snapshot();
    }

    // --- Persistence ---

    /// Synchronous snapshot on the caller's initiative (e.g. on shutdown),
    /// in addition to the queued snapshots mutations request themselves.
    pub async fn snapshot(&self) -> anyhow::Result<()> {
        self.adapter.snapshot().await
    }

    /// Replace all in-memory state from the store (e.g. at startup).
    pub async fn restore(&self) -> anyhow::Result<()> {
        self.adapter.restore().await
    }

    /// Subscribe to persistence failures. Snapshot errors never propagate to
    /// the mutation that queued them; they land here and in a warning log.
    pub fn persistence_errors(&self) -> broadcast::Receiver<String> {
        self.errors.subscribe()
    }

    pub fn engine(&self) -> Arc<ExecutionEngine> {
        self.engine.clone()
    }
}
