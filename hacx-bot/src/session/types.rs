//! Session types and history policy.

use serde::{Deserialize, Serialize};

/// Maximum number of turns kept in a session history, system turn included.
pub const MAX_HISTORY: usize = 20;

/// Idle time after which a session is removed by the sweeper (1 hour).
pub const SESSION_IDLE_TIMEOUT_MS: i64 = 60 * 60 * 1000;

/// Fixed instruction turn placed at the head of every session.
pub const SYSTEM_PROMPT: &str = "
أنت HacxGPT، مساعد ذكي وقوي. تابع المحادثة مع المستخدم بلغة المستخدم.
أنت مساعد متقدم مع قدرات فريدة.
";

/// Message role in a conversation history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Fixed instruction turn
    System,
    /// User message
    User,
    /// Model reply
    Assistant,
}

impl Role {
    /// Wire representation used by the completion API.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One message unit in a conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Per-conversation state.
///
/// Serialized with camelCase keys (`lastActive`, `messageCount`) to match
/// existing `data.json` snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// System turn first, then user/assistant turns in chronological order
    pub history: Vec<Turn>,
    /// Unix millis of the last mutation
    pub last_active: i64,
    /// Number of user turns processed
    #[serde(default)]
    pub message_count: u64,
}

impl Session {
    /// A fresh session holding only the system turn.
    pub fn new(system_prompt: &str, now_ms: i64) -> Self {
        Self {
            history: vec![Turn::system(system_prompt)],
            last_active: now_ms,
            message_count: 0,
        }
    }

    /// Record activity; `last_active` never moves backwards.
    pub fn touch(&mut self, now_ms: i64) {
        self.last_active = self.last_active.max(now_ms);
    }

    /// Whether the session has been idle for longer than `timeout_ms` at `now_ms`.
    pub fn is_expired(&self, now_ms: i64, timeout_ms: i64) -> bool {
        now_ms - self.last_active > timeout_ms
    }

    /// The fixed system turn, if the history is well formed.
    pub fn system_turn(&self) -> Option<&Turn> {
        self.history.first().filter(|t| t.role == Role::System)
    }
}

/// Bound a history to [`MAX_HISTORY`] turns.
///
/// Keeps the leading system turn plus the most recent `MAX_HISTORY - 1`
/// turns verbatim. The cut ignores roles, so the first kept turn after the
/// system turn can be an `assistant` reply whose `user` prompt was dropped.
/// Returns the number of turns discarded.
pub fn trim_history(history: &mut Vec<Turn>) -> usize {
    if history.len() <= MAX_HISTORY {
        return 0;
    }
    let excess = history.len() - MAX_HISTORY;
    history.drain(1..=excess);
    excess
}

/// Current wall-clock time in unix millis.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history_with(turns: usize) -> Vec<Turn> {
        let mut history = vec![Turn::system("sys")];
        for i in 0..turns {
            if i % 2 == 0 {
                history.push(Turn::user(format!("u{i}")));
            } else {
                history.push(Turn::assistant(format!("a{i}")));
            }
        }
        history
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&Turn::assistant("hi")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);
        assert_eq!(Role::System.as_str(), "system");
    }

    #[test]
    fn test_session_json_shape() {
        let session = Session::new("sys", 1_700_000_000_000);
        let value = serde_json::to_value(&session).unwrap();
        assert_eq!(value["lastActive"], 1_700_000_000_000i64);
        assert_eq!(value["messageCount"], 0);
        assert_eq!(value["history"][0]["role"], "system");
    }

    #[test]
    fn test_session_reads_existing_snapshot_entry() {
        let json = r#"{
            "history": [
                {"role": "system", "content": "sys"},
                {"role": "user", "content": "hello"}
            ],
            "lastActive": 1720000000000,
            "messageCount": 1
        }"#;
        let session: Session = serde_json::from_str(json).unwrap();
        assert_eq!(session.history.len(), 2);
        assert_eq!(session.history[1], Turn::user("hello"));
        assert_eq!(session.message_count, 1);
    }

    #[test]
    fn test_touch_is_monotonic() {
        let mut session = Session::new("sys", 1000);
        session.touch(500);
        assert_eq!(session.last_active, 1000);
        session.touch(2000);
        assert_eq!(session.last_active, 2000);
    }

    #[test]
    fn test_is_expired_boundary() {
        let session = Session::new("sys", 0);
        assert!(!session.is_expired(SESSION_IDLE_TIMEOUT_MS, SESSION_IDLE_TIMEOUT_MS));
        assert!(session.is_expired(SESSION_IDLE_TIMEOUT_MS + 1, SESSION_IDLE_TIMEOUT_MS));
    }

    #[test]
    fn test_trim_noop_under_cap() {
        let mut history = history_with(19);
        assert_eq!(trim_history(&mut history), 0);
        assert_eq!(history.len(), 20);
    }

    #[test]
    fn test_trim_keeps_system_and_last_nineteen() {
        let mut history = history_with(21);
        let expected_tail: Vec<Turn> = history[history.len() - 19..].to_vec();

        assert_eq!(trim_history(&mut history), 2);
        assert_eq!(history.len(), MAX_HISTORY);
        assert_eq!(history[0], Turn::system("sys"));
        assert_eq!(&history[1..], expected_tail.as_slice());
    }

    #[test]
    fn test_trim_can_orphan_assistant_turn() {
        // 1 system + 20 alternating turns: trimming one turn drops "u0",
        // leaving the reply "a1" directly after the system turn.
        let mut history = history_with(20);
        trim_history(&mut history);
        assert_eq!(history.len(), MAX_HISTORY);
        assert_eq!(history[1].role, Role::Assistant);
    }
}
