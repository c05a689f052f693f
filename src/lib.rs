//! Agent lifecycle and scheduling engine for the Personaliz desktop
//! assistant.
//!
//! The crate manages named automation tasks ("agents"): it stores their
//! definitions, runs them in sandbox (simulated) or live mode through an
//! external action executor, computes each agent's next scheduled run, and
//! keeps a bounded, queryable execution log. The chat UI, onboarding flow
//! and LLM plumbing live outside this crate and talk to it through
//! [`EngineContext`].

pub mod agents;
pub mod clock;
pub mod context;
pub mod engine;
pub mod error;
pub mod logs;
pub mod persistence;

pub use agents::{Agent, AgentPatch, AgentRegistry, AgentSpec, AgentStatus, Schedule};
pub use clock::{Clock, ManualClock, SystemClock};
pub use context::{EngineConfig, EngineContext};
pub use engine::{ActionExecutor, CustomScheduleEvaluator, ExecutionEngine, NoopExecutor, RunMode};
pub use error::EngineError;
pub use logs::{DEFAULT_LOG_CAPACITY, LogEntry, LogLevel, LogStore};
pub use persistence::{AGENTS_KEY, KeyValueStore, LOGS_KEY, PersistenceAdapter, SqliteStore};
