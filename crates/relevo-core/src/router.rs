//! Persona routing: decides which persona answers a message
//!
//! This is a fixed keyword gate: the text is case-folded and checked for
//! document/bureaucracy signal substrings. It does not attempt to infer
//! intent; a message that talks *about* a PDF without needing analysis still
//! hands off to the document analyst.

use tracing::debug;

use crate::persona::Persona;

/// Signal tokens that hand a conversation to the document analyst
pub const DEFAULT_DOC_SIGNALS: &[&str] = &[
    "pdf",
    "expediente",
    "boe",
    "decreto",
    "pliego",
    "alegación",
    "licitación",
    "anexo",
    "burocr",
];

/// Stateless keyword router
#[derive(Debug, Clone)]
pub struct PersonaRouter {
    signals: Vec<String>,
}

impl PersonaRouter {
    /// Router with the default document signals
    pub fn new() -> Self {
        Self {
            signals: DEFAULT_DOC_SIGNALS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Add extra signal tokens. Tokens are case-folded; blank tokens are ignored
    /// since an empty substring would match every message.
    pub fn with_signals<I, S>(mut self, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for token in extra {
            let token = token.as_ref().trim().to_lowercase();
            if token.is_empty() || self.signals.contains(&token) {
                continue;
            }
            self.signals.push(token);
        }
        self
    }

    pub fn signals(&self) -> &[String] {
        &self.signals
    }

    /// Pick the persona for `text`, given the session's current persona
    pub fn decide(&self, text: &str, current: Option<Persona>) -> Persona {
        let lower = text.to_lowercase();
        if let Some(signal) = self.signals.iter().find(|s| lower.contains(s.as_str())) {
            debug!("Router: signal '{}' → {}", signal, Persona::DocumentAnalyst);
            return Persona::DocumentAnalyst;
        }
        let persona = current.unwrap_or(Persona::Triage);
        debug!("Router: no signal, staying on {}", persona);
        persona
    }
}

impl Default for PersonaRouter {
    fn default() -> Self {
        Self::new()
    }
}
