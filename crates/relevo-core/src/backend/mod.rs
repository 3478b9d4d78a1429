//! Agent backend abstraction
//!
//! A backend turns a [`ClientConfig`] into a live [`AgentClient`]: one
//! conversation context scoped to a single persona. Clients accept a prompt,
//! then yield the reply as a finite stream of text fragments that can only be
//! drained once.

pub mod anthropic;

use anyhow::Result;
use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::persona::AgentDefinition;

pub use anthropic::AnthropicBackend;

/// Everything a backend needs to start a client for one persona
#[derive(Debug, Clone, Serialize)]
pub struct ClientConfig {
    pub system_prompt: String,
    pub agents: BTreeMap<String, AgentDefinition>,
    pub allowed_tools: Vec<String>,
    pub max_turns: u32,
}

/// Reply fragments in arrival order
pub type FragmentStream<'a> = BoxStream<'a, Result<String>>;

/// Factory for backend clients
#[async_trait]
pub trait AgentBackend: Send + Sync {
    /// Human-readable backend name (e.g. "anthropic")
    fn backend_name(&self) -> &str;

    /// Start a client and wait until it is ready to accept prompts
    async fn connect(&self, config: &ClientConfig) -> Result<Box<dyn AgentClient>>;
}

/// One live conversation context
#[async_trait]
pub trait AgentClient: Send {
    /// Begin one exchange
    async fn submit(&mut self, prompt: &str) -> Result<()>;

    /// Fragments produced by the last submitted exchange
    fn receive_response(&mut self) -> FragmentStream<'_>;

    /// Tear the client down. Called at most once.
    async fn release(&mut self) -> Result<()>;
}

/// Drain the reply of the last exchange and join it into a single string.
///
/// Fragments are joined with newlines and the result is trimmed. The first
/// failing fragment aborts collection so a partial reply is never returned.
pub async fn collect_response(client: &mut dyn AgentClient) -> Result<String> {
    let mut chunks = Vec::new();
    let mut fragments = client.receive_response();
    while let Some(fragment) = fragments.next().await {
        chunks.push(fragment?);
    }
    Ok(chunks.join("\n").trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use futures_util::stream;

    struct ScriptedClient {
        fragments: Vec<Result<String>>,
    }

    #[async_trait]
    impl AgentClient for ScriptedClient {
        async fn submit(&mut self, _prompt: &str) -> Result<()> {
            Ok(())
        }

        fn receive_response(&mut self) -> FragmentStream<'_> {
            Box::pin(stream::iter(self.fragments.drain(..)))
        }

        async fn release(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_collect_joins_in_order_and_trims() {
        let mut client = ScriptedClient {
            fragments: vec![
                Ok("  ".to_string()),
                Ok("primero".to_string()),
                Ok("segundo".to_string()),
                Ok("\n".to_string()),
            ],
        };
        let reply = collect_response(&mut client).await.unwrap();
        assert_eq!(reply, "primero\nsegundo");
    }

    #[tokio::test]
    async fn test_collect_is_single_pass() {
        let mut client = ScriptedClient {
            fragments: vec![Ok("once".to_string())],
        };
        assert_eq!(collect_response(&mut client).await.unwrap(), "once");
        assert_eq!(collect_response(&mut client).await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_collect_fails_on_bad_fragment() {
        let mut client = ScriptedClient {
            fragments: vec![
                Ok("partial".to_string()),
                Err(anyhow!("stream closed")),
                Ok("never seen".to_string()),
            ],
        };
        let err = collect_response(&mut client).await.unwrap_err();
        assert!(err.to_string().contains("stream closed"));
    }

    #[tokio::test]
    async fn test_collect_empty_stream() {
        let mut client = ScriptedClient { fragments: vec![] };
        assert_eq!(collect_response(&mut client).await.unwrap(), "");
    }
}
