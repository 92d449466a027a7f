//! Agent persona: system prompt, first message, and the creation spec.

use voicebolt_platform::AgentSpec;
use voicebolt_shared::{AgentCreationData, KnowledgeDocument};

/// System prompt for a company's voice agent.
pub fn system_prompt(data: &AgentCreationData) -> String {
    let company = data.company_name.trim();
    let agent = data.agent_name.trim();
    let website = data.website_url.trim();
    let email = data.email.trim();

    format!(
        "You are {agent}, a friendly and professional voice assistant for {company}.\n\
         \n\
         Your job is to answer callers' questions about {company}: its products, services, \
         pricing, opening hours and policies. Base your answers on the knowledge base built \
         from the company website ({website}). If the knowledge base does not cover a question, \
         say so honestly instead of guessing.\n\
         \n\
         Keep answers short and conversational, since callers are listening rather than reading. \
         Ask one clarifying question when a request is ambiguous.\n\
         \n\
         When a caller needs a human, wants a quote, or has a problem you cannot solve, offer to \
         have the team follow up and give them the contact address {email}.\n\
         \n\
         Never invent prices, availability, or commitments on behalf of {company}."
    )
}

/// Opening line the agent speaks when a call starts.
pub fn first_message(data: &AgentCreationData) -> String {
    format!(
        "Hi, I'm {}, the virtual assistant for {}. How can I help you today?",
        data.agent_name.trim(),
        data.company_name.trim()
    )
}

/// Human-readable name for the uploaded website document.
pub fn document_name(data: &AgentCreationData) -> String {
    format!("{} website knowledge", data.company_name.trim())
}

/// Everything the platform needs to create the agent.
pub fn agent_spec(
    data: &AgentCreationData,
    knowledge: Option<&KnowledgeDocument>,
    language: &str,
    voice_id: Option<&str>,
) -> AgentSpec {
    AgentSpec {
        name: data.agent_name.trim().to_string(),
        system_prompt: system_prompt(data),
        first_message: first_message(data),
        language: language.to_string(),
        voice_id: voice_id.map(String::from),
        knowledge: knowledge.cloned(),
    }
}
