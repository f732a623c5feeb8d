//! Session lifecycle: creation, reset, turn accumulation and expiry.
//!
//! [`SessionManager`] is the only writer of the [`SessionStore`]. Work on a
//! single conversation is serialised by a per-conversation lock, so two
//! messages from the same chat never interleave their read-modify-write and
//! the sweeper never deletes a session while an exchange is in flight.

use super::store::SessionStore;
use super::types::{now_millis, trim_history, Session, Turn, SESSION_IDLE_TIMEOUT_MS, SYSTEM_PROMPT};
use crate::provider::CompletionGateway;
use hacx_common::util::sanitize_for_log;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Reply relayed when the completion call fails.
pub const FALLBACK_REPLY: &str =
    "عذرًا، حدث خطأ أثناء معالجة طلبك. الرجاء المحاولة مرة أخرى لاحقًا.";

/// Period of the background expiry sweep (1 hour).
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Result of one user exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeOutcome {
    /// The model replied; the reply is now the last turn of the history.
    Reply(String),
    /// The completion failed; the user turn was kept and this text should be relayed.
    Fallback(String),
}

impl ExchangeOutcome {
    /// Text to relay to the user.
    pub fn text(&self) -> &str {
        match self {
            Self::Reply(text) | Self::Fallback(text) => text,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Self::Reply(text) | Self::Fallback(text) => text,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback(_))
    }
}

/// Creates, resets, grows and expires sessions.
pub struct SessionManager {
    store: Arc<SessionStore>,
    gateway: Arc<dyn CompletionGateway>,
    system_prompt: String,
    idle_timeout_ms: i64,
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl SessionManager {
    pub fn new(store: Arc<SessionStore>, gateway: Arc<dyn CompletionGateway>) -> Self {
        Self {
            store,
            gateway,
            system_prompt: SYSTEM_PROMPT.to_string(),
            idle_timeout_ms: SESSION_IDLE_TIMEOUT_MS,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Override the instruction placed at the head of new sessions.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Override the idle timeout used by [`sweep_expired`](Self::sweep_expired).
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout_ms = i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX);
        self
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn gateway(&self) -> &Arc<dyn CompletionGateway> {
        &self.gateway
    }

    fn fresh_session(&self, now_ms: i64) -> Session {
        Session::new(&self.system_prompt, now_ms)
    }

    fn conversation_lock(&self, id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Claim a conversation without waiting; `None` while an exchange holds it.
    fn try_claim(&self, id: &str) -> Option<OwnedMutexGuard<()>> {
        self.conversation_lock(id).try_lock_owned().ok()
    }

    /// Drop lock entries nobody is holding or waiting on.
    fn forget_locks(&self, ids: &[String]) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        for id in ids {
            if locks.get(id).is_some_and(|l| Arc::strong_count(l) == 1) {
                locks.remove(id);
            }
        }
    }

    /// Return the session for `id`, creating and persisting a fresh one if absent.
    ///
    /// Never replaces an existing session.
    pub async fn get_or_create(&self, id: &str) -> Session {
        let now = now_millis();
        self.store
            .get_or_insert_with(id, || {
                tracing::info!(chat_id = %id, "Creating session");
                self.fresh_session(now)
            })
            .await
    }

    /// Replace any session for `id` with a fresh one and persist it.
    pub async fn reset(&self, id: &str) -> Session {
        let lock = self.conversation_lock(id);
        let _guard = lock.lock().await;

        let session = self.fresh_session(now_millis());
        self.store.put(id, session.clone()).await;
        tracing::info!(chat_id = %id, "Session reset");
        session
    }

    /// Run one exchange: record the user turn, ask the gateway, record the reply.
    ///
    /// The history is trimmed after each append, so it stays within
    /// [`MAX_HISTORY`](super::types::MAX_HISTORY) even when the gateway fails.
    /// On gateway failure the user turn stays in the history, no assistant
    /// turn is added and [`FALLBACK_REPLY`] is returned.
    pub async fn record_exchange(&self, id: &str, user_text: &str) -> ExchangeOutcome {
        let lock = self.conversation_lock(id);
        let _guard = lock.lock().await;

        let now = now_millis();
        let (history, message_count) = self
            .store
            .upsert(
                id,
                || self.fresh_session(now),
                |session| {
                    session.history.push(Turn::user(user_text));
                    trim_history(&mut session.history);
                    session.touch(now);
                    session.message_count += 1;
                    (session.history.clone(), session.message_count)
                },
            )
            .await;

        tracing::debug!(
            chat_id = %id,
            message_count,
            history_len = history.len(),
            "Requesting completion"
        );

        let reply = match self.gateway.complete(&history).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(
                    chat_id = %id,
                    provider = %e.provider,
                    status = ?e.status_code,
                    error = %sanitize_for_log(&e.message),
                    "Completion failed, relaying fallback"
                );
                return ExchangeOutcome::Fallback(FALLBACK_REPLY.to_string());
            }
        };

        let recorded = self
            .store
            .update(id, |session| {
                session.history.push(Turn::assistant(reply.as_str()));
                let dropped = trim_history(&mut session.history);
                session.touch(now_millis());
                (session.history.len(), dropped)
            })
            .await;

        match recorded {
            Some((history_len, dropped)) => tracing::info!(
                chat_id = %id,
                message_count,
                history_len,
                dropped,
                "Exchange recorded"
            ),
            // The conversation lock keeps reset and sweep out, so this only
            // happens if the store was mutated behind the manager's back.
            None => tracing::warn!(chat_id = %id, "Session vanished before the reply was recorded"),
        }

        ExchangeOutcome::Reply(reply)
    }

    /// Remove every session idle for longer than the timeout at `now_ms`.
    ///
    /// Sessions with an exchange in flight are skipped until the next sweep.
    /// Returns the number of sessions removed.
    pub async fn sweep_expired(&self, now_ms: i64) -> usize {
        let mut claimed = Vec::new();
        let mut busy = 0usize;

        let removed = self
            .store
            .remove_where(|id, session| {
                if !session.is_expired(now_ms, self.idle_timeout_ms) {
                    return false;
                }
                match self.try_claim(id) {
                    Some(guard) => {
                        claimed.push(guard);
                        true
                    }
                    None => {
                        busy += 1;
                        false
                    }
                }
            })
            .await;

        drop(claimed);
        self.forget_locks(&removed);

        if !removed.is_empty() || busy > 0 {
            tracing::info!(removed = removed.len(), skipped_busy = busy, "Expired sessions swept");
        }
        removed.len()
    }

    /// Run [`sweep_expired`](Self::sweep_expired) every `period` for the life of the process.
    ///
    /// The first sweep happens one full period after spawning.
    pub fn spawn_sweeper(self: Arc<Self>, period: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(start, period);

            loop {
                interval.tick().await;
                self.sweep_expired(now_millis()).await;
            }
        })
    }
}
