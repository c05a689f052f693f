//! Append-only, capacity-bounded record of agent and system events.
//!
//! This is user-visible application state (the Logs tab of the assistant),
//! distinct from the `tracing` diagnostics the crate emits for operators.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::clock::Clock;

/// Bound carried over from the original assistant: keep the last 1000 entries.
pub const DEFAULT_LOG_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Immutable once created. `agent_id` is `None` for system-level events
/// (persistence warnings, installer output and the like).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: u64,
    pub agent_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

pub struct LogStore {
    entries: Mutex<VecDeque<LogEntry>>,
    capacity: usize,
    next_id: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl LogStore {
    pub fn new(clock: Arc<dyn Clock>, capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
            next_id: AtomicU64::new(1),
            clock,
        }
    }

    /// Append one entry, trimming oldest-first if the store is over capacity.
    /// Surviving entries keep their relative order.
    pub async fn append(
        &self,
        agent_id: Option<Uuid>,
        level: LogLevel,
        message: impl Into<String>,
        details: Option<serde_json::Value>,
    ) -> LogEntry {
        let entry = LogEntry {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            agent_id,
            timestamp: self.clock.now(),
            level,
            message: message.into(),
            details,
        };

        let mut entries = self.entries.lock().await;
        entries.push_back(entry.clone());
        while entries.len() > self.capacity {
            entries.pop_front();
        }
        entry
    }

    /// Entries in creation order (ascending). `agent_id = None` returns
    /// everything including system entries; presentation ordering such as
    /// newest-first is left to the caller.
    pub async fn query(&self, agent_id: Option<Uuid>) -> Vec<LogEntry> {
        let entries = self.entries.lock().await;
        match agent_id {
            Some(id) => entries
                .iter()
                .filter(|e| e.agent_id == Some(id))
                .cloned()
                .collect(),
            None => entries.iter().cloned().collect(),
        }
    }

    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    pub(crate) async fn snapshot_entries(&self) -> Vec<LogEntry> {
        self.entries.lock().await.iter().cloned().collect()
    }

    /// Replace all entries wholesale (restore path). The id counter resumes
    /// past the highest restored id so uniqueness holds across restores.
    pub(crate) async fn replace_all(&self, restored: Vec<LogEntry>) {
        let highest = restored.iter().map(|e| e.id).max().unwrap_or(0);
        self.next_id.fetch_max(highest + 1, Ordering::Relaxed);

        let mut entries = self.entries.lock().await;
        entries.clear();
        entries.extend(restored);
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn store(capacity: usize) -> LogStore {
        let clock = Arc::new(ManualClock::new("2025-06-01T00:00:00Z".parse().unwrap()));
        LogStore::new(clock, capacity)
    }

    #[tokio::test]
    async fn append_assigns_monotonic_ids() {
        let logs = store(10);
        let a = logs.append(None, LogLevel::Info, "one", None).await;
        let b = logs.append(None, LogLevel::Info, "two", None).await;
        assert!(b.id > a.id);
    }

    #[tokio::test]
    async fn capacity_bound_trims_oldest_first() {
        let logs = store(3);
        for i in 0..5 {
            logs.append(None, LogLevel::Info, format!("entry {i}"), None)
                .await;
        }
        let entries = logs.query(None).await;
        assert_eq!(entries.len(), 3);
        let messages: Vec<&str> = entries.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["entry 2", "entry 3", "entry 4"]);
    }

    #[tokio::test]
    async fn query_filters_by_agent_and_preserves_order() {
        let logs = store(10);
        let agent = Uuid::new_v4();
        let other = Uuid::new_v4();
        logs.append(Some(agent), LogLevel::Info, "first", None).await;
        logs.append(Some(other), LogLevel::Info, "noise", None).await;
        logs.append(Some(agent), LogLevel::Error, "second", None)
            .await;
        logs.append(None, LogLevel::Warning, "system", None).await;

        let mine = logs.query(Some(agent)).await;
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[0].message, "first");
        assert_eq!(mine[1].message, "second");

        // unfiltered query includes system entries
        assert_eq!(logs.query(None).await.len(), 4);
    }

    #[tokio::test]
    async fn clear_drops_everything() {
        let logs = store(10);
        logs.append(None, LogLevel::Info, "x", None).await;
        logs.clear().await;
        assert!(logs.is_empty().await);
    }

    #[tokio::test]
    async fn replace_all_resumes_id_sequence() {
        let logs = store(10);
        let restored = vec![LogEntry {
            id: 41,
            agent_id: None,
            timestamp: "2025-06-01T00:00:00Z".parse().unwrap(),
            level: LogLevel::Info,
            message: "restored".into(),
            details: None,
        }];
        logs.replace_all(restored).await;
        let fresh = logs.append(None, LogLevel::Info, "new", None).await;
        assert_eq!(fresh.id, 42);
    }
}
