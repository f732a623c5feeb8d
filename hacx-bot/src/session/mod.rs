//! Conversation sessions: types, persistence and lifecycle.

mod lifecycle;
mod store;
mod types;

pub use lifecycle::{ExchangeOutcome, SessionManager, FALLBACK_REPLY, SWEEP_INTERVAL};
pub use store::{JsonFileStore, MemorySnapshot, SessionMap, SessionStore, SnapshotStore};
pub use types::{
    now_millis, trim_history, Role, Session, Turn, MAX_HISTORY, SESSION_IDLE_TIMEOUT_MS,
    SYSTEM_PROMPT,
};
