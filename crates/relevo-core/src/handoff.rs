//! Handoff protocol: get, create, or replace the client bound to a session
//!
//! Transition rules per session:
//! - absent, or bound to another persona: connect a new client for the
//!   desired persona, publish it, then release the old client (if any)
//! - bound to the desired persona: reuse the bound client
//!
//! The new client is published before the old one is released, so a bound
//! session is never observed without a usable client. The old client is
//! released on a background task: a slow or failing teardown never delays
//! or fails the request that triggered the handoff. A failed connect leaves
//! the table untouched.

use std::sync::Arc;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::backend::AgentBackend;
use crate::error::HandoffError;
use crate::persona::{Persona, PersonaCatalog};
use crate::session::{ClientHandle, SessionStore};

/// Owns the handoff state machine over a [`SessionStore`]
pub struct SessionManager {
    store: Arc<SessionStore>,
    catalog: Arc<PersonaCatalog>,
    backend: Arc<dyn AgentBackend>,
    releases: TaskTracker,
}

impl SessionManager {
    pub fn new(
        store: Arc<SessionStore>,
        catalog: Arc<PersonaCatalog>,
        backend: Arc<dyn AgentBackend>,
    ) -> Self {
        info!("SessionManager: using '{}' backend", backend.backend_name());
        Self {
            store,
            catalog,
            backend,
            releases: TaskTracker::new(),
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Return the client for `session_id` bound to `desired`, handing off if needed
    pub async fn acquire_client(
        &self,
        session_id: &str,
        desired: Persona,
    ) -> Result<ClientHandle, HandoffError> {
        if let Some(handle) = self.store.binding(session_id).await {
            if handle.persona() == desired {
                debug!(
                    "Session '{}' reusing client #{} ({})",
                    session_id,
                    handle.id(),
                    desired
                );
                return Ok(handle);
            }
        }

        let config = self.catalog.get(desired).client_config();
        let client = self
            .backend
            .connect(&config)
            .await
            .map_err(|cause| HandoffError::Acquisition {
                persona: desired,
                cause,
            })?;
        let handle = ClientHandle::new(session_id, desired, client);

        match self.store.publish(session_id, handle.clone()).await {
            Some(previous) => {
                info!(
                    "Session '{}' handed off {} → {} (client #{} → #{})",
                    session_id,
                    previous.persona(),
                    desired,
                    previous.id(),
                    handle.id()
                );
                self.retire(previous);
            }
            None => info!(
                "Created session '{}' on {} (client #{})",
                session_id,
                desired,
                handle.id()
            ),
        }

        Ok(handle)
    }

    /// Wait until every release started by a handoff has finished
    pub async fn wait_for_releases(&self) {
        self.releases.close();
        self.releases.wait().await;
        self.releases.reopen();
    }

    fn retire(&self, previous: ClientHandle) {
        self.releases.spawn(async move {
            if let Err(e) = previous.release().await {
                warn!(
                    "Session '{}': releasing {} client #{} failed: {:#}",
                    previous.session_id(),
                    previous.persona(),
                    previous.id(),
                    e
                );
            }
        });
    }
}
