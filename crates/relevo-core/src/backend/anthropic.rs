//! Anthropic Messages API backend
//!
//! Each client owns the conversation history of one persona. A handoff
//! therefore starts the new persona with a fresh context, the same way a
//! freshly spawned agent process would.

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use futures_util::stream;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::debug;

use super::{AgentBackend, AgentClient, ClientConfig, FragmentStream};
use crate::context::build_system_prompt;

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5";
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

const API_VERSION: &str = "2023-06-01";

/// Backend that talks to the Anthropic Messages API over HTTPS
pub struct AnthropicBackend {
    http: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl std::fmt::Debug for AnthropicBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicBackend")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl AnthropicBackend {
    pub fn new(api_key: impl Into<String>, model: Option<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            max_tokens: DEFAULT_MAX_TOKENS,
        })
    }

    /// Set a custom base URL (e.g. for proxies or regional endpoints)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set max tokens for responses
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl AgentBackend for AnthropicBackend {
    fn backend_name(&self) -> &str {
        "anthropic"
    }

    async fn connect(&self, config: &ClientConfig) -> Result<Box<dyn AgentClient>> {
        Ok(Box::new(self.open(config)?))
    }
}

impl AnthropicBackend {
    fn open(&self, config: &ClientConfig) -> Result<AnthropicClient> {
        if self.api_key.trim().is_empty() {
            bail!("Anthropic API key is not configured");
        }
        if self.model.trim().is_empty() {
            bail!("Anthropic model is not configured");
        }
        // One Messages API call per exchange is one assistant turn
        if config.max_turns == 0 {
            bail!("max_turns must be at least 1");
        }

        let system = build_system_prompt(config);
        debug!(
            "Anthropic client ready (model {}, {} specialists)",
            self.model,
            config.agents.len()
        );

        Ok(AnthropicClient {
            http: self.http.clone(),
            api_key: self.api_key.clone(),
            base_url: self.base_url.clone(),
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            system,
            history: Vec::new(),
            pending: VecDeque::new(),
            released: false,
        })
    }
}

/// A single persona-scoped conversation with the Messages API
struct AnthropicClient {
    http: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    system: String,
    history: Vec<ApiMessage>,
    pending: VecDeque<String>,
    released: bool,
}

impl AnthropicClient {
    async fn chat(&self, messages: &[ApiMessage]) -> Result<ApiResponse> {
        let url = format!("{}/v1/messages", self.base_url);

        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "system": self.system,
            "messages": messages,
        });

        debug!(
            "Sending request to Anthropic API with {} messages",
            messages.len()
        );

        let response = self
            .http
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .context("Failed to send request to Anthropic API")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow!(
                "API request failed with status {}: {}",
                status,
                error_text
            ));
        }

        response
            .json()
            .await
            .context("Failed to parse API response")
    }
}

#[async_trait]
impl AgentClient for AnthropicClient {
    async fn submit(&mut self, prompt: &str) -> Result<()> {
        if self.released {
            bail!("client already released");
        }
        self.pending.clear();

        // history only changes once a reply is in hand, so a failed or
        // cancelled call leaves user/assistant turns alternating
        let mut messages = self.history.clone();
        messages.push(ApiMessage::new("user", prompt));
        let response = self.chat(&messages).await?;

        debug!(
            "Received response with {} content blocks, stop_reason: {:?}",
            response.content.len(),
            response.stop_reason
        );

        let texts: Vec<String> = response
            .content
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } if !text.trim().is_empty() => Some(text),
                _ => None,
            })
            .collect();

        if texts.is_empty() {
            debug!("Response carried no text; exchange not kept in history");
            return Ok(());
        }

        messages.push(ApiMessage::new("assistant", texts.join("\n")));
        self.history = messages;
        self.pending.extend(texts);
        Ok(())
    }

    fn receive_response(&mut self) -> FragmentStream<'_> {
        Box::pin(stream::iter(self.pending.drain(..).map(Ok::<_, anyhow::Error>)))
    }

    async fn release(&mut self) -> Result<()> {
        self.released = true;
        self.history.clear();
        self.pending.clear();
        debug!("Anthropic client released");
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    content: String,
}

impl ApiMessage {
    fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}
