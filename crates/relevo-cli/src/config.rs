use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use relevo_core::backend::anthropic::{DEFAULT_BASE_URL, DEFAULT_MAX_TOKENS, DEFAULT_MODEL};
use relevo_core::{Persona, PersonaCatalog, PersonaOverride, PersonaRouter};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelevoConfig {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub personas: PersonasConfig,
}

// ── Backend ─────────────────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("api_key", &mask_secret(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            model: default_model(),
            max_tokens: default_max_tokens(),
        }
    }
}

// ── Gateway ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
    #[serde(default = "default_gateway_port")]
    pub port: u16,
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    8000
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_gateway_bind(),
            port: default_gateway_port(),
        }
    }
}

impl GatewayConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.bind, self.port)
            .parse()
            .with_context(|| format!("Invalid gateway address {}:{}", self.bind, self.port))
    }
}

// ── Session / Router / Personas ─────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_exchange_timeout_secs")]
    pub exchange_timeout_secs: u64,
}

fn default_exchange_timeout_secs() -> u64 {
    relevo_core::DEFAULT_EXCHANGE_TIMEOUT.as_secs()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            exchange_timeout_secs: default_exchange_timeout_secs(),
        }
    }
}

impl SessionConfig {
    pub fn exchange_timeout(&self) -> Duration {
        Duration::from_secs(self.exchange_timeout_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Keywords routed to the document analyst on top of the built-in list
    #[serde(default)]
    pub extra_signals: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersonasConfig {
    #[serde(default)]
    pub ux: PersonaOverride,
    #[serde(default)]
    pub docs: PersonaOverride,
}

/// Short form of the API key for `relevo config` and Debug output
fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    match chars.len() {
        0 => "(empty)".to_string(),
        // long enough that showing both ends still hides the key
        n if n > 7 => {
            let head: String = chars[..3].iter().collect();
            let tail: String = chars[n - 4..].iter().collect();
            format!("{}...{}", head, tail)
        }
        _ => "***".to_string(),
    }
}

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".relevo")
}

impl RelevoConfig {
    pub fn load(custom_path: &Option<PathBuf>) -> Result<Self> {
        let path = custom_path
            .clone()
            .unwrap_or_else(|| config_dir().join("config.toml"));
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        // Refuse files readable by group or other; they may hold the API key
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(metadata) = std::fs::metadata(path) {
                let mode = metadata.permissions().mode();
                if mode & 0o077 != 0 {
                    bail!(
                        "Config file {:?} has overly permissive permissions ({:o}). \
                         It may contain secrets. Fix with: chmod 600 {:?}",
                        path,
                        mode & 0o777,
                        path
                    );
                }
            }
        }

        let content = std::fs::read_to_string(path).with_context(|| {
            format!(
                "Failed to read config at {}. Run `relevo init` first.",
                path.display()
            )
        })?;

        let expanded = expand_env_vars(&content, |name| std::env::var(name).ok());

        let config: Self = toml::from_str(&expanded)
            .with_context(|| format!("Failed to parse config at {}", path.display()))?;
        config.validate()?;

        if config.backend.api_key.starts_with("sk-ant-") {
            warn!(
                "API key is hardcoded in config file. For security, use environment variables: api_key = \"${{ANTHROPIC_API_KEY}}\""
            );
        }

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.session.exchange_timeout_secs == 0 {
            bail!("session.exchange_timeout_secs must be greater than 0");
        }
        if self.backend.max_tokens == 0 {
            bail!("backend.max_tokens must be greater than 0");
        }
        for (name, overrides) in [("ux", &self.personas.ux), ("docs", &self.personas.docs)] {
            if overrides.max_turns == Some(0) {
                bail!("personas.{}.max_turns must be greater than 0", name);
            }
        }
        self.gateway.socket_addr()?;
        Ok(())
    }

    /// Copy safe to print: secrets replaced by their masked form
    pub fn masked(&self) -> Self {
        let mut copy = self.clone();
        copy.backend.api_key = mask_secret(&self.backend.api_key);
        copy
    }

    pub fn persona_catalog(&self) -> PersonaCatalog {
        PersonaCatalog::new()
            .with_override(Persona::Triage, &self.personas.ux)
            .with_override(Persona::DocumentAnalyst, &self.personas.docs)
    }

    pub fn persona_router(&self) -> PersonaRouter {
        PersonaRouter::new().with_signals(&self.router.extra_signals)
    }
}

/// Variables a config file may reference as `${NAME}`
const ALLOWED_ENV_VARS: &[&str] = &["ANTHROPIC_API_KEY", "ANTHROPIC_BASE_URL", "RELEVO_MODEL"];

/// Substitute allowlisted `${NAME}` references. Unknown names are kept verbatim,
/// unset ones become empty, and text after an unterminated `${` is untouched.
fn expand_env_vars<F>(input: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(open) = rest.find("${") {
        let Some(len) = rest[open + 2..].find('}') else {
            break;
        };
        let name = &rest[open + 2..open + 2 + len];
        out.push_str(&rest[..open]);

        if ALLOWED_ENV_VARS.contains(&name) {
            out.push_str(&lookup(name).unwrap_or_default());
        } else {
            warn!("Config references ${{{}}}, which relevo does not expand", name);
            out.push_str(&rest[open..open + 3 + len]);
        }
        rest = &rest[open + 3 + len..];
    }

    out.push_str(rest);
    out
}
