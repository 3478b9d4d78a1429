//! relevo-gateway - HTTP front door for relevo
//!
//! Exposes the chat endpoint plus read-only status and session listings
//! over a [`relevo_core::RequestHandler`].

pub mod protocol;
pub mod server;

pub use server::GatewayServer;
