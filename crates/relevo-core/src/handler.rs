//! Request handling: route a message, bind the right client, run one exchange

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::HandoffError;
use crate::handoff::SessionManager;
use crate::persona::Persona;
use crate::router::PersonaRouter;
use crate::session::SessionStore;

/// Upper bound on acquisition plus response collection for one request
pub const DEFAULT_EXCHANGE_TIMEOUT: Duration = Duration::from_secs(120);

/// Result of one successful chat request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    pub session_id: String,
    pub active_agent: Persona,
    pub reply: String,
}

/// Boundary between transports and the session layer.
///
/// Requests on the same session are serialized: each one holds the session's
/// turn for the whole route/acquire/exchange sequence, so concurrent messages
/// can't race on a handoff. Requests on different sessions run concurrently.
pub struct RequestHandler {
    router: PersonaRouter,
    sessions: SessionManager,
    timeout: Duration,
}

impl RequestHandler {
    pub fn new(router: PersonaRouter, sessions: SessionManager) -> Self {
        Self {
            router,
            sessions,
            timeout: DEFAULT_EXCHANGE_TIMEOUT,
        }
    }

    /// Set the per-request exchange timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        self.sessions.store()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Answer `message` on `session_id`
    pub async fn handle(&self, session_id: &str, message: &str) -> Result<ChatReply, HandoffError> {
        let turn = self.store().lock_session(session_id).await;

        let result =
            match tokio::time::timeout(self.timeout, self.exchange(session_id, message)).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(
                        "Session '{}': request timed out after {:?}",
                        session_id, self.timeout
                    );
                    Err(HandoffError::Timeout(self.timeout))
                }
            };

        drop(turn);
        if result.is_err() {
            self.store().prune_turn(session_id).await;
        }
        result
    }

    /// Finish pending handoff releases, then release every bound client.
    /// Returns how many sessions were unbound.
    pub async fn shutdown(&self) -> usize {
        self.sessions.wait_for_releases().await;
        self.store().release_all().await
    }

    async fn exchange(&self, session_id: &str, message: &str) -> Result<ChatReply, HandoffError> {
        let current = self.store().persona(session_id).await;
        let persona = self.router.decide(message, current);
        debug!(
            "Session '{}': {:?} → {} ({} chars)",
            session_id,
            current.map(|p| p.as_str()),
            persona,
            message.len()
        );

        let client = self.sessions.acquire_client(session_id, persona).await?;
        let reply = client
            .exchange(message)
            .await
            .map_err(|cause| HandoffError::Exchange { persona, cause })?;

        self.store().record_activity(session_id).await;
        info!(
            "Session '{}' answered by {} ({} chars)",
            session_id,
            persona,
            reply.len()
        );

        Ok(ChatReply {
            session_id: session_id.to_string(),
            active_agent: persona,
            reply,
        })
    }
}
