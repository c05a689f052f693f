//! Snapshot/restore of registry + log store state through an external
//! key-value collaborator.
//!
//! Snapshots are requested fire-and-forget on an internal queue drained by a
//! background worker, so a slow or broken store can never block or corrupt
//! the in-memory mutation that triggered it. Failures surface as a warning
//! log entry plus a message on the observable error channel, never as an
//! error to the caller.

mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::agents::{Agent, AgentRegistry};
use crate::logs::{LogEntry, LogLevel, LogStore};

pub use sqlite::SqliteStore;

/// Storage keys, kept from the original assistant so existing installs
/// restore cleanly.
pub const AGENTS_KEY: &str = "openclaw_agents";
pub const LOGS_KEY: &str = "openclaw_logs";

/// External key-value surface (settings store, file store, ...). The engine
/// only needs opaque string blobs under fixed keys.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn put(&self, key: &str, value: &str) -> anyhow::Result<()>;
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
}

/// Clonable sender side of the snapshot queue. Held by the registry (and the
/// context) so any mutation can request a snapshot without waiting on it.
#[derive(Clone)]
pub struct PersistenceHandle {
    tx: mpsc::UnboundedSender<()>,
}

impl PersistenceHandle {
    pub(crate) fn new(tx: mpsc::UnboundedSender<()>) -> Self {
        Self { tx }
    }

    #[cfg(test)]
    pub(crate) fn disconnected() -> Self {
        let (tx, _) = mpsc::unbounded_channel();
        Self { tx }
    }

    pub(crate) fn request_snapshot(&self) {
        if self.tx.send(()).is_err() {
            debug!("Persistence worker stopped; snapshot request dropped");
        }
    }
}

pub struct PersistenceAdapter {
    registry: Arc<AgentRegistry>,
    logs: Arc<LogStore>,
    store: Arc<dyn KeyValueStore>,
}

impl PersistenceAdapter {
    pub(crate) fn new(
        registry: Arc<AgentRegistry>,
        logs: Arc<LogStore>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self {
            registry,
            logs,
            store,
        }
    }

    /// Write the current registry and log store state as two JSON blobs.
    /// Every agent and log field round-trips losslessly.
    pub async fn snapshot(&self) -> anyhow::Result<()> {
        let agents = serde_json::to_string(&self.registry.snapshot_agents().await)?;
        self.store.put(AGENTS_KEY, &agents).await?;

        let entries = serde_json::to_string(&self.logs.snapshot_entries().await)?;
        self.store.put(LOGS_KEY, &entries).await?;
        Ok(())
    }

    /// Repopulate registry and log store from the stored blobs, replacing
    /// in-memory state entirely. A missing key restores that half as empty
    /// (fresh install).
    pub async fn restore(&self) -> anyhow::Result<()> {
        let agents: Vec<Agent> = match self.store.get(AGENTS_KEY).await? {
            Some(raw) => serde_json::from_str(&raw)?,
            None => Vec::new(),
        };
        self.registry.replace_all(agents).await;

        let entries: Vec<LogEntry> = match self.store.get(LOGS_KEY).await? {
            Some(raw) => serde_json::from_str(&raw)?,
            None => Vec::new(),
        };
        self.logs.replace_all(entries).await;
        Ok(())
    }
}

/// Drain the snapshot queue. Bursts of requests (e.g. a run committing right
/// after a status change) coalesce into a single snapshot.
pub(crate) fn spawn_worker(
    adapter: Arc<PersistenceAdapter>,
    logs: Arc<LogStore>,
    mut rx: mpsc::UnboundedReceiver<()>,
    errors: broadcast::Sender<String>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while rx.recv().await.is_some() {
            while rx.try_recv().is_ok() {}

            if let Err(err) = adapter.snapshot().await {
                warn!("State snapshot failed: {err:#}");
                logs.append(
                    None,
                    LogLevel::Warning,
                    format!("Failed to persist state: {err}"),
                    None,
                )
                .await;
                let _ = errors.send(err.to_string());
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{AgentSpec, AgentStatus, Schedule};
    use crate::clock::{Clock, ManualClock};
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    /// In-memory stand-in for the external settings store.
    struct MemoryStore {
        map: Mutex<HashMap<String, String>>,
        fail: bool,
    }

    impl MemoryStore {
        fn new() -> Self {
            Self {
                map: Mutex::new(HashMap::new()),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                map: Mutex::new(HashMap::new()),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl KeyValueStore for MemoryStore {
        async fn put(&self, key: &str, value: &str) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("disk full");
            }
            self.map.lock().await.insert(key.into(), value.into());
            Ok(())
        }

        async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
            if self.fail {
                anyhow::bail!("disk full");
            }
            Ok(self.map.lock().await.get(key).cloned())
        }
    }

    fn fixture(store: Arc<dyn KeyValueStore>) -> (Arc<AgentRegistry>, Arc<LogStore>, PersistenceAdapter) {
        let clock: Arc<dyn Clock> =
            Arc::new(ManualClock::new("2025-06-01T00:00:00Z".parse().unwrap()));
        let logs = Arc::new(LogStore::new(clock.clone(), 100));
        let registry = Arc::new(AgentRegistry::new(
            logs.clone(),
            clock,
            PersistenceHandle::disconnected(),
        ));
        let adapter = PersistenceAdapter::new(registry.clone(), logs.clone(), store);
        (registry, logs, adapter)
    }

    fn spec() -> AgentSpec {
        AgentSpec {
            name: "Poster".into(),
            description: "posts things".into(),
            role: "Content Creator".into(),
            goal: "post daily".into(),
            tools: vec!["LinkedIn".into()],
            actions: vec!["search".into(), "post".into()],
            schedule: Schedule::Weekly,
            cron_expression: None,
        }
    }

    #[tokio::test]
    async fn snapshot_restore_round_trips_all_fields() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let (registry, logs, adapter) = fixture(store.clone());

        let created = registry.create(spec()).await.unwrap();
        adapter.snapshot().await.unwrap();

        // wipe and restore into the same components
        registry.replace_all(Vec::new()).await;
        logs.clear().await;
        adapter.restore().await.unwrap();

        let restored = registry.get(created.id).await.unwrap();
        assert_eq!(restored.name, created.name);
        assert_eq!(restored.description, created.description);
        assert_eq!(restored.role, created.role);
        assert_eq!(restored.goal, created.goal);
        assert_eq!(restored.tools, created.tools);
        assert_eq!(restored.actions, created.actions);
        assert_eq!(restored.schedule, created.schedule);
        assert_eq!(restored.status, AgentStatus::Draft);
        assert_eq!(restored.created_at, created.created_at);

        let entries = logs.query(None).await;
        assert_eq!(entries.len(), 1);
        assert!(entries[0].message.contains("Agent created"));
    }

    #[tokio::test]
    async fn restore_replaces_state_entirely() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let (registry, _, adapter) = fixture(store);

        registry.create(spec()).await.unwrap();
        adapter.snapshot().await.unwrap();

        // a later agent that is not in the snapshot disappears on restore
        let mut other = spec();
        other.name = "Later".into();
        let later = registry.create(other).await.unwrap();
        adapter.restore().await.unwrap();

        assert_eq!(registry.list().await.len(), 1);
        assert!(registry.get(later.id).await.is_err());
    }

    #[tokio::test]
    async fn restore_from_empty_store_yields_empty_state() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let (registry, logs, adapter) = fixture(store);

        registry.create(spec()).await.unwrap();
        adapter.restore().await.unwrap();

        assert!(registry.list().await.is_empty());
        assert!(logs.is_empty().await);
    }

    #[tokio::test]
    async fn worker_downgrades_failures_to_warning_log() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::failing());
        let (_registry, logs, adapter) = fixture(store);
        let (errors, mut error_rx) = broadcast::channel(8);
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = spawn_worker(Arc::new(adapter), logs.clone(), rx, errors);

        PersistenceHandle::new(tx.clone()).request_snapshot();
        drop(tx);
        worker.await.unwrap();

        let entries = logs.query(None).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].level, LogLevel::Warning);
        assert!(entries[0].agent_id.is_none());
        assert!(error_rx.try_recv().unwrap().contains("disk full"));
    }
}
