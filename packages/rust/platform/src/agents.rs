//! Agent resources: create, fetch, patch, list, delete.

use reqwest::Method;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{info, instrument};

use voicebolt_shared::{AgentId, KnowledgeDocument, Result, VoiceBoltError};

use crate::client::PlatformClient;

/// Script tag that loads the platform's embeddable voice widget.
const WIDGET_SCRIPT: &str = r#"<script src="https://unpkg.com/@elevenlabs/convai-widget-embed" async type="text/javascript"></script>"#;

/// Everything needed to create an agent.
#[derive(Debug, Clone)]
pub struct AgentSpec {
    pub name: String,
    pub system_prompt: String,
    pub first_message: String,
    pub language: String,
    pub voice_id: Option<String>,
    /// Document to attach at creation time, if one was uploaded.
    pub knowledge: Option<KnowledgeDocument>,
}

/// An agent as listed by the platform.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSummary {
    pub agent_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub created_at_unix_secs: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct AgentList {
    #[serde(default)]
    agents: Vec<AgentSummary>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    next_cursor: Option<String>,
}

/// Knowledge-base entry in the shape the platform's agent config uses.
pub fn knowledge_entry(doc: &KnowledgeDocument) -> Value {
    json!({
        "type": "text",
        "id": doc.id.as_str(),
        "name": doc.name,
    })
}

/// Build the create-agent request body.
///
/// When a document is given it is placed in four locations at once: nested
/// under the agent prompt, under the agent config, at the top level, and as
/// a bare `document_ids` array. The platform keeps whichever it recognizes.
pub fn create_agent_body(spec: &AgentSpec) -> Value {
    let mut prompt = Map::new();
    prompt.insert("prompt".into(), json!(spec.system_prompt));

    let mut agent = Map::new();
    agent.insert("first_message".into(), json!(spec.first_message));
    agent.insert("language".into(), json!(spec.language));

    let mut body = Map::new();
    body.insert("name".into(), json!(spec.name));

    if let Some(doc) = &spec.knowledge {
        let entries = json!([knowledge_entry(doc)]);
        prompt.insert("knowledge_base".into(), entries.clone());
        agent.insert("knowledge_base".into(), entries.clone());
        body.insert("knowledge_base".into(), entries);
        body.insert("document_ids".into(), json!([doc.id.as_str()]));
    }

    agent.insert("prompt".into(), Value::Object(prompt));

    let mut conversation_config = Map::new();
    conversation_config.insert("agent".into(), Value::Object(agent));
    if let Some(voice_id) = &spec.voice_id {
        conversation_config.insert("tts".into(), json!({ "voice_id": voice_id }));
    }

    body.insert(
        "conversation_config".into(),
        Value::Object(conversation_config),
    );
    Value::Object(body)
}

/// HTML that embeds the voice widget bound to `agent_id`.
pub fn widget_snippet(agent_id: &AgentId) -> String {
    format!(r#"<elevenlabs-convai agent-id="{agent_id}"></elevenlabs-convai>{WIDGET_SCRIPT}"#)
}

impl PlatformClient {
    /// Create an agent and return its id.
    #[instrument(skip_all, fields(name = %spec.name, with_knowledge = spec.knowledge.is_some()))]
    pub async fn create_agent(&self, spec: &AgentSpec) -> Result<AgentId> {
        let body = create_agent_body(spec);
        let response = self
            .request_json(Method::POST, "/convai/agents/create", Some(&body))
            .await?;

        let id = ["/agent_id", "/id", "/data/agent_id"]
            .iter()
            .filter_map(|p| response.pointer(p).and_then(Value::as_str))
            .find(|id| !id.is_empty())
            .map(AgentId::from)
            .ok_or_else(|| {
                VoiceBoltError::contract(format!("agent creation returned no agent id: {response}"))
            })?;

        info!(agent_id = %id, "agent created");
        Ok(id)
    }

    /// Fetch an agent's full representation.
    #[instrument(skip(self), fields(agent_id = %id))]
    pub async fn get_agent(&self, id: &AgentId) -> Result<Value> {
        self.request_json(Method::GET, &format!("/convai/agents/{id}"), None)
            .await
    }

    /// Apply a partial update to an agent.
    #[instrument(skip(self, body), fields(agent_id = %id))]
    pub async fn patch_agent(&self, id: &AgentId, body: &Value) -> Result<Value> {
        self.request_json(Method::PATCH, &format!("/convai/agents/{id}"), Some(body))
            .await
    }

    /// POST `body` to a sub-resource of the agent, e.g. `/knowledge-base`.
    #[instrument(skip(self, body), fields(agent_id = %id))]
    pub async fn post_agent_subresource(
        &self,
        id: &AgentId,
        suffix: &str,
        body: &Value,
    ) -> Result<Value> {
        self.request_json(
            Method::POST,
            &format!("/convai/agents/{id}{suffix}"),
            Some(body),
        )
        .await
    }

    /// List every agent on the account, following cursors.
    #[instrument(skip(self))]
    pub async fn list_agents(&self) -> Result<Vec<AgentSummary>> {
        let mut all = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut query = vec![("page_size", "100".to_string())];
            if let Some(c) = &cursor {
                query.push(("cursor", c.clone()));
            }

            let value = self.send(Method::GET, "/convai/agents", None, &query).await?;
            let page: AgentList = serde_json::from_value(value)
                .map_err(|e| VoiceBoltError::contract(format!("agent list: {e}")))?;

            all.extend(page.agents);
            match page.next_cursor {
                Some(next) if page.has_more => cursor = Some(next),
                _ => break,
            }
        }

        Ok(all)
    }

    /// Delete an agent.
    #[instrument(skip(self), fields(agent_id = %id))]
    pub async fn delete_agent(&self, id: &AgentId) -> Result<()> {
        self.request_json(Method::DELETE, &format!("/convai/agents/{id}"), None)
            .await?;
        info!("agent deleted");
        Ok(())
    }
}
