//! Request-level failures surfaced by the session layer

use std::time::Duration;
use thiserror::Error;

use crate::persona::Persona;

/// Why a chat request failed.
///
/// Release failures never appear here: they are logged and absorbed by the
/// session manager once the replacement client is already published.
#[derive(Debug, Error)]
pub enum HandoffError {
    /// The backend could not start a client; the session table is unchanged
    #[error("failed to start {persona} client: {cause:#}")]
    Acquisition {
        persona: Persona,
        cause: anyhow::Error,
    },

    /// Submitting the message or collecting the reply failed; the binding is kept
    #[error("exchange with {persona} client failed: {cause:#}")]
    Exchange {
        persona: Persona,
        cause: anyhow::Error,
    },

    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

impl HandoffError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Persona involved in the failure, when one had been chosen
    pub fn persona(&self) -> Option<Persona> {
        match self {
            Self::Acquisition { persona, .. } | Self::Exchange { persona, .. } => Some(*persona),
            Self::Timeout(_) => None,
        }
    }
}
