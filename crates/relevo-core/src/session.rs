//! Session table: which persona and which live client each chat session is bound to
//!
//! A session id with no entry is *absent*; an entry always points at a live,
//! ready client. Entries are only replaced wholesale, so readers never see a
//! session without a client once it has had one.

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info, warn};

use crate::backend::{AgentClient, collect_response};
use crate::persona::Persona;

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// Shared handle to the backend client bound to a session.
///
/// The underlying client is released exactly once: explicitly through
/// [`ClientHandle::release`], or from `Drop` when the last handle goes away
/// without it (the release is then spawned onto the current runtime).
#[derive(Clone)]
pub struct ClientHandle {
    inner: Arc<LiveClient>,
}

struct LiveClient {
    id: u64,
    session_id: String,
    persona: Persona,
    client: Mutex<Option<Box<dyn AgentClient>>>,
}

impl ClientHandle {
    pub(crate) fn new(session_id: &str, persona: Persona, client: Box<dyn AgentClient>) -> Self {
        Self {
            inner: Arc::new(LiveClient {
                id: NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed),
                session_id: session_id.to_string(),
                persona,
                client: Mutex::new(Some(client)),
            }),
        }
    }

    /// Process-unique id of the underlying client
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn persona(&self) -> Persona {
        self.inner.persona
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    /// Whether both handles point at the same client
    pub fn same_client(&self, other: &ClientHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Run one exchange: submit `prompt` and collect the full reply
    pub async fn exchange(&self, prompt: &str) -> Result<String> {
        let mut slot = self.inner.client.lock().await;
        let client = slot
            .as_mut()
            .ok_or_else(|| anyhow!("client #{} was already released", self.inner.id))?;
        client.submit(prompt).await?;
        collect_response(client.as_mut()).await
    }

    /// Release the client. Later calls are no-ops.
    ///
    /// The teardown runs on its own task: once started it completes even if
    /// the caller stops waiting.
    pub async fn release(&self) -> Result<()> {
        let Some(mut client) = self.inner.client.lock().await.take() else {
            return Ok(());
        };
        let id = self.inner.id;
        debug!(
            "Releasing client #{} ({}) for session '{}'",
            id, self.inner.persona, self.inner.session_id
        );
        tokio::spawn(async move { client.release().await })
            .await
            .map_err(|e| anyhow!("release task for client #{} failed: {}", id, e))?
    }
}

impl std::fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientHandle")
            .field("id", &self.inner.id)
            .field("session_id", &self.inner.session_id)
            .field("persona", &self.inner.persona)
            .finish()
    }
}

impl Drop for LiveClient {
    fn drop(&mut self) {
        let Some(mut client) = self.client.get_mut().take() else {
            return;
        };
        let id = self.id;
        let session_id = std::mem::take(&mut self.session_id);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                debug!("Client #{} dropped unreleased, deferring release", id);
                runtime.spawn(async move {
                    if let Err(e) = client.release().await {
                        warn!(
                            "Deferred release of client #{} for session '{}' failed: {:#}",
                            id, session_id, e
                        );
                    }
                });
            }
            Err(_) => warn!(
                "Client #{} for session '{}' dropped outside a runtime; release skipped",
                id, session_id
            ),
        }
    }
}

/// Snapshot of one bound session
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: String,
    pub active_agent: Persona,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub message_count: u64,
    pub handoff_count: u64,
}

pub(crate) struct SessionEntry {
    handle: ClientHandle,
    created_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    message_count: u64,
    handoff_count: u64,
}

impl SessionEntry {
    fn info(&self, id: &str) -> SessionInfo {
        SessionInfo {
            id: id.to_string(),
            active_agent: self.handle.persona(),
            created_at: self.created_at,
            last_activity: self.last_activity,
            message_count: self.message_count,
            handoff_count: self.handoff_count,
        }
    }
}

/// Held for the duration of one request on a session
pub struct SessionTurn {
    _guard: OwnedMutexGuard<()>,
}

/// The session table. Owned by the hosting process and shared by `Arc`.
pub struct SessionStore {
    table: RwLock<HashMap<String, SessionEntry>>,
    turns: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            table: RwLock::new(HashMap::new()),
            turns: Mutex::new(HashMap::new()),
        }
    }

    /// Wait for exclusive use of a session. Turns are granted in FIFO order.
    ///
    /// Lookups (`persona`, `binding`, `list`) do not need a turn.
    pub async fn lock_session(&self, session_id: &str) -> SessionTurn {
        let lock = {
            let mut turns = self.turns.lock().await;
            turns.entry(session_id.to_string()).or_default().clone()
        };
        SessionTurn {
            _guard: lock.lock_owned().await,
        }
    }

    /// Forget the turn lock of a session that never got bound, unless
    /// someone holds or waits for it
    pub(crate) async fn prune_turn(&self, session_id: &str) {
        if self.table.read().await.contains_key(session_id) {
            return;
        }
        let mut turns = self.turns.lock().await;
        // clones are only made under this lock, so a count of one means unused
        if turns
            .get(session_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            turns.remove(session_id);
        }
    }

    #[cfg(test)]
    pub(crate) async fn turn_count(&self) -> usize {
        self.turns.lock().await.len()
    }

    #[cfg(test)]
    pub(crate) async fn lock_table(
        &self,
    ) -> tokio::sync::RwLockWriteGuard<'_, HashMap<String, SessionEntry>> {
        self.table.write().await
    }

    /// Persona the session is currently bound to
    pub async fn persona(&self, session_id: &str) -> Option<Persona> {
        let table = self.table.read().await;
        table.get(session_id).map(|e| e.handle.persona())
    }

    /// Client the session is currently bound to
    pub async fn binding(&self, session_id: &str) -> Option<ClientHandle> {
        let table = self.table.read().await;
        table.get(session_id).map(|e| e.handle.clone())
    }

    pub async fn get(&self, session_id: &str) -> Option<SessionInfo> {
        let table = self.table.read().await;
        table.get(session_id).map(|e| e.info(session_id))
    }

    /// All bound sessions, most recently active first
    pub async fn list(&self) -> Vec<SessionInfo> {
        let table = self.table.read().await;
        let mut list: Vec<SessionInfo> = table.iter().map(|(id, e)| e.info(id)).collect();
        list.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        list
    }

    /// Number of bound sessions
    pub async fn count(&self) -> usize {
        self.table.read().await.len()
    }

    /// Record a completed exchange on a session
    pub async fn record_activity(&self, session_id: &str) {
        let mut table = self.table.write().await;
        if let Some(entry) = table.get_mut(session_id) {
            entry.last_activity = Utc::now();
            entry.message_count += 1;
            debug!(
                "Session '{}' activity (messages: {})",
                session_id, entry.message_count
            );
        }
    }

    /// Bind `handle` to the session, returning the client it replaced
    pub(crate) async fn publish(
        &self,
        session_id: &str,
        handle: ClientHandle,
    ) -> Option<ClientHandle> {
        let mut table = self.table.write().await;
        let now = Utc::now();
        match table.get_mut(session_id) {
            Some(entry) => {
                let previous = std::mem::replace(&mut entry.handle, handle);
                entry.last_activity = now;
                entry.handoff_count += 1;
                Some(previous)
            }
            None => {
                table.insert(
                    session_id.to_string(),
                    SessionEntry {
                        handle,
                        created_at: now,
                        last_activity: now,
                        message_count: 0,
                        handoff_count: 0,
                    },
                );
                None
            }
        }
    }

    /// Unbind every session and release its client. Used at process shutdown.
    pub async fn release_all(&self) -> usize {
        let drained: Vec<(String, SessionEntry)> = self.table.write().await.drain().collect();
        let count = drained.len();
        for (id, entry) in drained {
            if let Err(e) = entry.handle.release().await {
                warn!("Failed to release client for session '{}': {:#}", id, e);
            }
        }
        if count > 0 {
            info!("Released {} session clients", count);
        }
        count
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
