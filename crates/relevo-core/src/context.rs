//! System prompt building for backends without native sub-agent support

use tracing::debug;

use crate::backend::ClientConfig;

/// Render a client configuration as a single system prompt.
///
/// Delegated specialists become a `# SPECIALISTS` section the model can
/// role-play into, and the direct tool allowlist is stated explicitly.
pub fn build_system_prompt(config: &ClientConfig) -> String {
    let mut prompt = String::new();

    if !config.system_prompt.is_empty() {
        prompt.push_str("# ROLE\n\n");
        prompt.push_str(config.system_prompt.trim());
        prompt.push_str("\n\n");
    }

    if !config.agents.is_empty() {
        prompt.push_str("# SPECIALISTS\n\n");
        prompt.push_str(
            "You may delegate part of the work to these specialists. \
             When you do, answer as that specialist would, following its instructions.\n\n",
        );
        for (name, agent) in &config.agents {
            prompt.push_str(&format!("## {}\n\n", name));
            prompt.push_str(&format!("When to use: {}\n\n", agent.description));
            prompt.push_str(&format!("Instructions: {}\n", agent.prompt));
            if !agent.tools.is_empty() {
                prompt.push_str(&format!("Tools: {}\n", agent.tools.join(", ")));
            }
            if let Some(model) = &agent.model {
                prompt.push_str(&format!("Model: {}\n", model));
            }
            prompt.push('\n');
        }
    }

    prompt.push_str("# TOOLS\n\n");
    if config.allowed_tools.is_empty() {
        prompt.push_str("No tools are available. Answer from the conversation alone.\n");
    } else {
        prompt.push_str(&format!(
            "Only these tools are permitted: {}\n",
            config.allowed_tools.join(", ")
        ));
    }

    debug!("Built system prompt ({} chars)", prompt.len());

    prompt
}
