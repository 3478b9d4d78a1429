//! Personas and the catalog of their backend configuration

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

use crate::backend::ClientConfig;

/// Conversational role a session can be bound to.
///
/// The wire names (`ux`, `docs`) are what HTTP clients see as `active_agent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Persona {
    /// First-line triage and UX guidance
    #[serde(rename = "ux")]
    Triage,
    /// Long-form administrative document analysis
    #[serde(rename = "docs")]
    DocumentAnalyst,
}

impl Persona {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Triage => "ux",
            Self::DocumentAnalyst => "docs",
        }
    }
}

impl std::fmt::Display for Persona {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A specialist the backend may delegate to from inside a persona
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub description: String,
    pub prompt: String,
    #[serde(default)]
    pub tools: Vec<String>,
    /// `None` inherits the parent's model
    #[serde(default)]
    pub model: Option<String>,
}

impl AgentDefinition {
    pub fn new(description: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            prompt: prompt.into(),
            tools: Vec::new(),
            model: None,
        }
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools = tools.into_iter().map(Into::into).collect();
        self
    }
}

/// Behavioural configuration of one persona
#[derive(Debug, Clone)]
pub struct PersonaProfile {
    pub persona: Persona,
    pub instructions: String,
    pub agents: BTreeMap<String, AgentDefinition>,
    pub allowed_tools: Vec<String>,
    pub max_turns: u32,
}

impl PersonaProfile {
    pub fn new(persona: Persona, instructions: impl Into<String>) -> Self {
        Self {
            persona,
            instructions: instructions.into(),
            agents: BTreeMap::new(),
            allowed_tools: Vec::new(),
            max_turns: 1,
        }
    }

    /// Configuration handed to the backend when a client is connected for this persona
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            system_prompt: self.instructions.clone(),
            agents: self.agents.clone(),
            allowed_tools: self.allowed_tools.clone(),
            max_turns: self.max_turns,
        }
    }

    fn apply(&mut self, overrides: &PersonaOverride) {
        if let Some(instructions) = &overrides.instructions {
            self.instructions = instructions.clone();
        }
        if let Some(tools) = &overrides.allowed_tools {
            self.allowed_tools = tools.clone();
        }
        if let Some(max_turns) = overrides.max_turns {
            self.max_turns = max_turns;
        }
    }
}

/// Optional per-persona overrides loaded from configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersonaOverride {
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub allowed_tools: Option<Vec<String>>,
    #[serde(default)]
    pub max_turns: Option<u32>,
}

impl PersonaOverride {
    pub fn is_empty(&self) -> bool {
        self.instructions.is_none() && self.allowed_tools.is_none() && self.max_turns.is_none()
    }
}

/// Read-only mapping from persona to its profile. Built once at startup.
#[derive(Debug, Clone)]
pub struct PersonaCatalog {
    triage: PersonaProfile,
    document_analyst: PersonaProfile,
}

impl PersonaCatalog {
    /// Catalog with the built-in Spanish public-administration personas
    pub fn new() -> Self {
        let agents = builtin_specialists();

        let mut triage = PersonaProfile::new(
            Persona::Triage,
            "Eres el agente de UX/triage para una plataforma usada por funcionarios. \
             Tu objetivo es: (1) entender la petición, (2) pedir aclaraciones mínimas, \
             (3) proponer el siguiente paso de forma clara y breve. \
             Si detectas trabajo documental largo o jurídico-administrativo, delega en subagentes.",
        );
        triage.agents = agents.clone();

        let mut document_analyst = PersonaProfile::new(
            Persona::DocumentAnalyst,
            "Eres el agente documental para administración pública. \
             Analiza textos largos, extrae obligaciones y resume con trazabilidad. \
             Si hace falta, usa subagentes para extraer o redactar formalmente.",
        );
        document_analyst.agents = agents;

        Self {
            triage,
            document_analyst,
        }
    }

    /// Apply configuration overrides to one persona
    pub fn with_override(mut self, persona: Persona, overrides: &PersonaOverride) -> Self {
        if !overrides.is_empty() {
            info!("PersonaCatalog: applying config overrides to '{}'", persona);
            self.get_mut(persona).apply(overrides);
        }
        self
    }

    pub fn get(&self, persona: Persona) -> &PersonaProfile {
        match persona {
            Persona::Triage => &self.triage,
            Persona::DocumentAnalyst => &self.document_analyst,
        }
    }

    fn get_mut(&mut self, persona: Persona) -> &mut PersonaProfile {
        match persona {
            Persona::Triage => &mut self.triage,
            Persona::DocumentAnalyst => &mut self.document_analyst,
        }
    }
}

impl Default for PersonaCatalog {
    fn default() -> Self {
        Self::new()
    }
}

fn builtin_specialists() -> BTreeMap<String, AgentDefinition> {
    let mut agents = BTreeMap::new();
    agents.insert(
        "doc-extractor".to_string(),
        AgentDefinition::new(
            "Extrae puntos clave, requisitos, plazos y referencias de documentos administrativos.",
            "Eres un analista de documentos administrativos. \
             Devuelve un resumen estructurado: (1) objetivo, (2) requisitos, (3) plazos, \
             (4) riesgos/ambigüedades, (5) lista de preguntas para el usuario.",
        )
        .with_tools(["Read", "Grep", "Glob"]),
    );
    agents.insert(
        "formal-writer".to_string(),
        AgentDefinition::new(
            "Redacta respuestas claras, formales y accionables para funcionarios.",
            "Eres un redactor institucional. Escribe en español formal, \
             con bullets, pasos numerados y definiciones. Evita jerga técnica.",
        ),
    );
    agents
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persona_wire_names() {
        assert_eq!(Persona::Triage.to_string(), "ux");
        assert_eq!(Persona::DocumentAnalyst.to_string(), "docs");
        assert_eq!(
            serde_json::to_string(&Persona::DocumentAnalyst).unwrap(),
            "\"docs\""
        );
        let parsed: Persona = serde_json::from_str("\"ux\"").unwrap();
        assert_eq!(parsed, Persona::Triage);
    }

    #[test]
    fn test_builtin_catalog() {
        let catalog = PersonaCatalog::new();
        for persona in [Persona::Triage, Persona::DocumentAnalyst] {
            let profile = catalog.get(persona);
            assert_eq!(profile.persona, persona);
            assert_eq!(profile.max_turns, 1);
            assert!(profile.allowed_tools.is_empty());
            assert!(profile.agents.contains_key("doc-extractor"));
            assert!(profile.agents.contains_key("formal-writer"));
        }
        assert!(catalog.get(Persona::Triage).instructions.contains("triage"));
        assert!(
            catalog
                .get(Persona::DocumentAnalyst)
                .instructions
                .contains("documental")
        );
    }

    #[test]
    fn test_specialist_tools() {
        let catalog = PersonaCatalog::new();
        let extractor = &catalog.get(Persona::Triage).agents["doc-extractor"];
        assert_eq!(extractor.tools, vec!["Read", "Grep", "Glob"]);
        assert!(extractor.model.is_none());
        assert!(catalog.get(Persona::Triage).agents["formal-writer"].tools.is_empty());
    }

    #[test]
    fn test_client_config_from_profile() {
        let catalog = PersonaCatalog::new();
        let config = catalog.get(Persona::DocumentAnalyst).client_config();
        assert!(config.system_prompt.contains("documental"));
        assert_eq!(config.agents.len(), 2);
        assert_eq!(config.max_turns, 1);
    }

    #[test]
    fn test_override_only_touches_target_persona() {
        let overrides = PersonaOverride {
            instructions: Some("Only answer in English.".to_string()),
            allowed_tools: Some(vec!["Read".to_string()]),
            max_turns: Some(3),
        };
        let catalog = PersonaCatalog::new().with_override(Persona::Triage, &overrides);

        let triage = catalog.get(Persona::Triage);
        assert_eq!(triage.instructions, "Only answer in English.");
        assert_eq!(triage.allowed_tools, vec!["Read"]);
        assert_eq!(triage.max_turns, 3);

        let docs = catalog.get(Persona::DocumentAnalyst);
        assert!(docs.instructions.contains("documental"));
        assert!(docs.allowed_tools.is_empty());
    }

    #[test]
    fn test_empty_override_is_noop() {
        let overrides = PersonaOverride::default();
        assert!(overrides.is_empty());
        let catalog = PersonaCatalog::new().with_override(Persona::Triage, &overrides);
        assert!(catalog.get(Persona::Triage).instructions.contains("triage"));
    }
}
