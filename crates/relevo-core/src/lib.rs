//! relevo-core - persona routing and session handoff
//!
//! This crate provides:
//! - The persona catalog (triage and document analyst configurations)
//! - A keyword router that picks the persona for each message
//! - The session table and the handoff protocol that swaps a session's
//!   backend client when its persona changes
//! - The request handler that ties routing, handoff and one exchange together
//! - An Anthropic Messages API backend

pub mod backend;
pub mod context;
pub mod error;
pub mod handler;
pub mod handoff;
pub mod persona;
pub mod router;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types for convenience
pub use backend::{AgentBackend, AgentClient, AnthropicBackend, ClientConfig, FragmentStream};
pub use error::HandoffError;
pub use handler::{ChatReply, DEFAULT_EXCHANGE_TIMEOUT, RequestHandler};
pub use handoff::SessionManager;
pub use persona::{AgentDefinition, Persona, PersonaCatalog, PersonaOverride, PersonaProfile};
pub use router::{DEFAULT_DOC_SIGNALS, PersonaRouter};
pub use session::{ClientHandle, SessionInfo, SessionStore, SessionTurn};
