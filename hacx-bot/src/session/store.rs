//! Session store with write-through snapshot persistence.
//!
//! The in-memory map is authoritative. Every mutation is followed by a full
//! snapshot flush through a [`SnapshotStore`] backend; flush failures are
//! logged and the next successful flush catches the file up.

use super::types::Session;
use async_trait::async_trait;
use hacx_common::{Error, Result, ResultExt};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Mapping from conversation id to session.
pub type SessionMap = HashMap<String, Session>;

/// Durable home for session snapshots.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Read the persisted snapshot. `Ok(None)` means nothing has been persisted yet.
    async fn load(&self) -> Result<Option<SessionMap>>;

    /// Replace the persisted snapshot with `sessions`.
    async fn flush(&self, sessions: &SessionMap) -> Result<()>;
}

// ============================================================================
// JSON file backend
// ============================================================================

/// Snapshot kept in a single pretty-printed JSON file.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "data.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl SnapshotStore for JsonFileStore {
    async fn load(&self) -> Result<Option<SessionMap>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(Error::from(e)
                    .with_context(format!("Failed to read {}", self.path.display())))
            }
        };

        let sessions: SessionMap = serde_json::from_str(&content)
            .context(format!("Failed to parse {}", self.path.display()))?;
        Ok(Some(sessions))
    }

    async fn flush(&self, sessions: &SessionMap) -> Result<()> {
        let content = serde_json::to_string_pretty(sessions)?;

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .context(format!("Failed to create {}", dir.display()))?;
        }

        let tmp = self.temp_path();
        tokio::fs::write(&tmp, content)
            .await
            .context(format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .context(format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

// ============================================================================
// In-memory backend
// ============================================================================

/// Snapshot held in memory. Nothing survives the process.
#[derive(Default)]
pub struct MemorySnapshot {
    saved: std::sync::Mutex<Option<SessionMap>>,
    flushes: std::sync::atomic::AtomicUsize,
}

impl MemorySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing snapshot, as if loaded from disk.
    pub fn with_sessions(sessions: SessionMap) -> Self {
        Self {
            saved: std::sync::Mutex::new(Some(sessions)),
            flushes: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Last flushed snapshot.
    pub fn saved(&self) -> Option<SessionMap> {
        self.saved.lock().ok().and_then(|s| s.clone())
    }

    /// Number of flushes performed so far.
    pub fn flush_count(&self) -> usize {
        self.flushes.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshot {
    async fn load(&self) -> Result<Option<SessionMap>> {
        Ok(self.saved())
    }

    async fn flush(&self, sessions: &SessionMap) -> Result<()> {
        let mut saved = self
            .saved
            .lock()
            .map_err(|_| Error::Storage("memory snapshot lock poisoned".into()))?;
        *saved = Some(sessions.clone());
        self.flushes
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Session store
// ============================================================================

/// In-memory session map backed by a snapshot store.
pub struct SessionStore {
    sessions: Mutex<SessionMap>,
    backend: Arc<dyn SnapshotStore>,
}

impl SessionStore {
    /// Open the store, loading whatever snapshot the backend holds.
    ///
    /// An unreadable or malformed snapshot is logged and the store starts empty.
    pub async fn open(backend: Arc<dyn SnapshotStore>) -> Self {
        let sessions = match backend.load().await {
            Ok(Some(sessions)) => {
                tracing::info!(sessions = sessions.len(), "Loaded session snapshot");
                sessions
            }
            Ok(None) => {
                tracing::info!("No session snapshot found, starting empty");
                SessionMap::new()
            }
            Err(e) => {
                tracing::warn!(error = %e, "Discarding unreadable session snapshot");
                SessionMap::new()
            }
        };

        Self {
            sessions: Mutex::new(sessions),
            backend,
        }
    }

    /// Flush the full mapping. Failures are logged, never retried.
    pub async fn save(&self) {
        let sessions = self.sessions.lock().await;
        self.flush_locked(&sessions).await;
    }

    async fn flush_locked(&self, sessions: &SessionMap) {
        if let Err(e) = self.backend.flush(sessions).await {
            tracing::error!(error = %e, sessions = sessions.len(), "Failed to persist sessions");
        }
    }

    pub async fn get(&self, id: &str) -> Option<Session> {
        self.sessions.lock().await.get(id).cloned()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.sessions.lock().await.contains_key(id)
    }

    /// Insert or replace the session for `id`, then persist.
    pub async fn put(&self, id: &str, session: Session) {
        let mut sessions = self.sessions.lock().await;
        sessions.insert(id.to_string(), session);
        self.flush_locked(&sessions).await;
    }

    /// Insert `make()` only when `id` has no session, then return the stored one.
    ///
    /// Persists only when a session was created.
    pub async fn get_or_insert_with<F>(&self, id: &str, make: F) -> Session
    where
        F: FnOnce() -> Session,
    {
        let mut sessions = self.sessions.lock().await;
        if let Some(existing) = sessions.get(id) {
            return existing.clone();
        }
        let session = make();
        sessions.insert(id.to_string(), session.clone());
        self.flush_locked(&sessions).await;
        session
    }

    /// Mutate the session for `id`, inserting `make()` first when absent, then persist.
    pub async fn upsert<M, F, R>(&self, id: &str, make: M, f: F) -> R
    where
        M: FnOnce() -> Session,
        F: FnOnce(&mut Session) -> R,
    {
        let mut sessions = self.sessions.lock().await;
        let result = f(sessions.entry(id.to_string()).or_insert_with(make));
        self.flush_locked(&sessions).await;
        result
    }

    /// Remove the session for `id`, then persist if anything was removed.
    pub async fn delete(&self, id: &str) -> Option<Session> {
        let mut sessions = self.sessions.lock().await;
        let removed = sessions.remove(id);
        if removed.is_some() {
            self.flush_locked(&sessions).await;
        }
        removed
    }

    /// Mutate the session for `id` in place, then persist.
    ///
    /// Returns `None` without persisting when `id` has no session.
    pub async fn update<F, R>(&self, id: &str, f: F) -> Option<R>
    where
        F: FnOnce(&mut Session) -> R,
    {
        let mut sessions = self.sessions.lock().await;
        let result = f(sessions.get_mut(id)?);
        self.flush_locked(&sessions).await;
        Some(result)
    }

    /// Remove every session matching `pred`, persisting once if any were removed.
    ///
    /// Returns the removed ids.
    pub async fn remove_where<F>(&self, mut pred: F) -> Vec<String>
    where
        F: FnMut(&str, &Session) -> bool,
    {
        let mut sessions = self.sessions.lock().await;
        let doomed: Vec<String> = sessions
            .iter()
            .filter(|(id, s)| pred(id, s))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &doomed {
            sessions.remove(id);
        }
        if !doomed.is_empty() {
            self.flush_locked(&sessions).await;
        }
        doomed
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }

    pub async fn ids(&self) -> Vec<String> {
        self.sessions.lock().await.keys().cloned().collect()
    }

    /// Clone of the full mapping.
    pub async fn snapshot(&self) -> SessionMap {
        self.sessions.lock().await.clone()
    }
}
