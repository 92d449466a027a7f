//! Request shapes that may bind a document to an agent.
//!
//! Each strategy is a pure function of the agent id, the document, and the
//! agent's current representation. [`association_ladder`] fixes the order in
//! which the reconciler tries them: three PATCH shapes, then every
//! sub-resource endpoint with every payload shape.

use serde_json::{Map, Value, json};
use voicebolt_platform::{Method, knowledge_entry};
use voicebolt_shared::{AgentId, KnowledgeDocument};

use crate::probe::entry_matches;

/// Inputs shared by every strategy.
#[derive(Debug, Clone, Copy)]
pub struct AssociationContext<'a> {
    pub agent_id: &'a AgentId,
    pub document: &'a KnowledgeDocument,
    /// Agent representation fetched before the attempt, if the fetch succeeded.
    pub current: Option<&'a Value>,
}

/// A fully described HTTP call against the platform.
#[derive(Debug, Clone, PartialEq)]
pub struct AssociationRequest {
    /// Stable name used in logs and outcomes.
    pub label: String,
    pub method: Method,
    /// Path below `/convai/agents/{agent_id}`; empty for the agent itself.
    pub suffix: String,
    pub body: Value,
}

// ---------------------------------------------------------------------------
// PATCH strategies
// ---------------------------------------------------------------------------

/// Ways of embedding the document through a PATCH of the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchStrategy {
    /// Full entry (with usage mode) plus the existing prompt text.
    Rich,
    /// Same location, entry reduced to type/id/name.
    Minimal,
    /// Whole existing `conversation_config` with the entry merged in.
    MergeExisting,
}

impl PatchStrategy {
    pub const ALL: [PatchStrategy; 3] = [Self::Rich, Self::Minimal, Self::MergeExisting];

    pub fn label(self) -> &'static str {
        match self {
            Self::Rich => "patch:rich",
            Self::Minimal => "patch:minimal",
            Self::MergeExisting => "patch:merge-existing",
        }
    }

    /// Build the request, or `None` when the strategy needs state we lack.
    pub fn build(self, ctx: &AssociationContext<'_>) -> Option<AssociationRequest> {
        let body = match self {
            Self::Rich => {
                let mut entry = knowledge_entry(ctx.document);
                entry["usage_mode"] = json!("auto");
                let mut prompt = Map::new();
                if let Some(text) = ctx
                    .current
                    .and_then(|c| c.pointer("/conversation_config/agent/prompt/prompt"))
                    .filter(|v| v.is_string())
                {
                    prompt.insert("prompt".into(), text.clone());
                }
                prompt.insert(
                    "knowledge_base".into(),
                    Value::Array(merged_entries(ctx, entry)),
                );
                json!({ "conversation_config": { "agent": { "prompt": prompt } } })
            }
            Self::Minimal => {
                let entry = knowledge_entry(ctx.document);
                json!({
                    "conversation_config": {
                        "agent": { "prompt": { "knowledge_base": merged_entries(ctx, entry) } }
                    }
                })
            }
            Self::MergeExisting => {
                let mut config = ctx
                    .current?
                    .get("conversation_config")
                    .filter(|v| v.is_object())?
                    .clone();
                let entries = Value::Array(merged_entries(ctx, knowledge_entry(ctx.document)));
                set_path(&mut config, &["agent", "prompt", "knowledge_base"], entries);
                json!({ "conversation_config": config })
            }
        };

        Some(AssociationRequest {
            label: self.label().to_string(),
            method: Method::PATCH,
            suffix: String::new(),
            body,
        })
    }
}

/// Existing prompt knowledge-base entries plus `entry`, unless already present.
fn merged_entries(ctx: &AssociationContext<'_>, entry: Value) -> Vec<Value> {
    let mut entries: Vec<Value> = ctx
        .current
        .and_then(|c| c.pointer("/conversation_config/agent/prompt/knowledge_base"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    if !entries.iter().any(|e| entry_matches(e, &ctx.document.id)) {
        entries.push(entry);
    }
    entries
}

/// Set `value` at `path` inside `root`, creating intermediate objects.
fn set_path(root: &mut Value, path: &[&str], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };

    let mut node = root;
    for key in parents {
        if !node.get(*key).is_some_and(Value::is_object) {
            node[*key] = Value::Object(Map::new());
        }
        node = &mut node[*key];
    }
    node[*last] = value;
}

// ---------------------------------------------------------------------------
// Sub-resource strategies
// ---------------------------------------------------------------------------

/// Candidate sub-resources under `/convai/agents/{agent_id}`.
/// `{document_id}` is substituted.
pub const SUBRESOURCE_PATHS: [&str; 4] = [
    "/knowledge-base",
    "/knowledge-base/add",
    "/documents",
    "/knowledge-base/{document_id}",
];

/// Candidate POST payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    /// `{"document_ids": [id]}`
    DocumentIds,
    /// `{"document_id": id}`
    DocumentId,
    /// `{"id": id}`
    Id,
    /// `"id"`
    Bare,
}

impl PayloadShape {
    pub const ALL: [PayloadShape; 4] = [Self::DocumentIds, Self::DocumentId, Self::Id, Self::Bare];

    pub fn label(self) -> &'static str {
        match self {
            Self::DocumentIds => "document_ids",
            Self::DocumentId => "document_id",
            Self::Id => "id",
            Self::Bare => "bare",
        }
    }

    pub fn body(self, document_id: &str) -> Value {
        match self {
            Self::DocumentIds => json!({ "document_ids": [document_id] }),
            Self::DocumentId => json!({ "document_id": document_id }),
            Self::Id => json!({ "id": document_id }),
            Self::Bare => Value::String(document_id.to_string()),
        }
    }
}

/// POST `shape` to the sub-resource `suffix` of the agent.
pub fn subresource_request(
    ctx: &AssociationContext<'_>,
    suffix: &str,
    shape: PayloadShape,
) -> AssociationRequest {
    let doc_id = ctx.document.id.as_str();
    let suffix = suffix.replace("{document_id}", doc_id);

    AssociationRequest {
        label: format!("post:{suffix} {}", shape.label()),
        method: Method::POST,
        suffix,
        body: shape.body(doc_id),
    }
}

/// Every request the reconciler may try, in order.
pub fn association_ladder(ctx: &AssociationContext<'_>) -> Vec<AssociationRequest> {
    let patches = PatchStrategy::ALL
        .iter()
        .filter_map(|strategy| strategy.build(ctx));

    let posts = SUBRESOURCE_PATHS.iter().flat_map(|suffix| {
        PayloadShape::ALL
            .iter()
            .map(move |shape| subresource_request(ctx, suffix, *shape))
    });

    patches.chain(posts).collect()
}

#[cfg(test)]
mod tests {
    use voicebolt_shared::DocumentId;

    use super::*;

    fn doc() -> KnowledgeDocument {
        KnowledgeDocument {
            id: DocumentId::from("doc_1"),
            name: "Acme website knowledge".into(),
        }
    }

    fn current_agent() -> Value {
        json!({
            "agent_id": "ag_1",
            "name": "Ava",
            "conversation_config": {
                "agent": {
                    "first_message": "Hi!",
                    "language": "en",
                    "prompt": {
                        "prompt": "You are Ava.",
                        "llm": "gemini-2.0-flash",
                        "knowledge_base": [{"type": "url", "id": "doc_0", "name": "Old"}]
                    }
                },
                "tts": {"voice_id": "voice_9"}
            }
        })
    }

    #[test]
    fn ladder_order_and_size() {
        let agent_id = AgentId::from("ag_1");
        let document = doc();
        let current = current_agent();
        let ctx = AssociationContext {
            agent_id: &agent_id,
            document: &document,
            current: Some(&current),
        };

        let ladder = association_ladder(&ctx);
        assert_eq!(ladder.len(), 3 + 16);

        let labels: Vec<_> = ladder.iter().take(5).map(|r| r.label.as_str()).collect();
        assert_eq!(
            labels,
            vec![
                "patch:rich",
                "patch:minimal",
                "patch:merge-existing",
                "post:/knowledge-base document_ids",
                "post:/knowledge-base document_id",
            ]
        );

        let last = ladder.last().unwrap();
        assert_eq!(last.suffix, "/knowledge-base/doc_1");
        assert_eq!(last.body, json!("doc_1"));
        assert!(ladder[..3].iter().all(|r| r.method == Method::PATCH));
        assert!(ladder[3..].iter().all(|r| r.method == Method::POST));
    }

    #[test]
    fn ladder_without_state_skips_merge() {
        let agent_id = AgentId::from("ag_1");
        let document = doc();
        let ctx = AssociationContext {
            agent_id: &agent_id,
            document: &document,
            current: None,
        };

        let ladder = association_ladder(&ctx);
        assert_eq!(ladder.len(), 2 + 16);
        assert!(ladder.iter().all(|r| r.label != "patch:merge-existing"));
    }

    #[test]
    fn rich_keeps_prompt_and_existing_entries() {
        let agent_id = AgentId::from("ag_1");
        let document = doc();
        let current = current_agent();
        let ctx = AssociationContext {
            agent_id: &agent_id,
            document: &document,
            current: Some(&current),
        };

        let req = PatchStrategy::Rich.build(&ctx).unwrap();
        let prompt = &req.body["conversation_config"]["agent"]["prompt"];
        assert_eq!(prompt["prompt"], "You are Ava.");
        let kb = prompt["knowledge_base"].as_array().unwrap();
        assert_eq!(kb.len(), 2);
        assert_eq!(
            kb[1],
            json!({"type": "text", "id": "doc_1", "name": "Acme website knowledge", "usage_mode": "auto"})
        );
    }

    #[test]
    fn minimal_has_only_the_kb() {
        let agent_id = AgentId::from("ag_1");
        let document = doc();
        let ctx = AssociationContext {
            agent_id: &agent_id,
            document: &document,
            current: None,
        };

        let req = PatchStrategy::Minimal.build(&ctx).unwrap();
        assert_eq!(
            req.body,
            json!({"conversation_config": {"agent": {"prompt": {"knowledge_base": [
                {"type": "text", "id": "doc_1", "name": "Acme website knowledge"}
            ]}}}})
        );
        assert!(req.suffix.is_empty());
    }

    #[test]
    fn merge_preserves_unrelated_fields() {
        let agent_id = AgentId::from("ag_1");
        let document = doc();
        let current = current_agent();
        let ctx = AssociationContext {
            agent_id: &agent_id,
            document: &document,
            current: Some(&current),
        };

        let req = PatchStrategy::MergeExisting.build(&ctx).unwrap();
        let config = &req.body["conversation_config"];
        assert_eq!(config["tts"]["voice_id"], "voice_9");
        assert_eq!(config["agent"]["first_message"], "Hi!");
        assert_eq!(config["agent"]["prompt"]["llm"], "gemini-2.0-flash");
        assert_eq!(config["agent"]["prompt"]["knowledge_base"][1]["id"], "doc_1");
    }

    #[test]
    fn merge_creates_missing_prompt_object() {
        let agent_id = AgentId::from("ag_1");
        let document = doc();
        let current = json!({"conversation_config": {"tts": {}}});
        let ctx = AssociationContext {
            agent_id: &agent_id,
            document: &document,
            current: Some(&current),
        };

        let req = PatchStrategy::MergeExisting.build(&ctx).unwrap();
        assert_eq!(
            req.body["conversation_config"]["agent"]["prompt"]["knowledge_base"][0]["id"],
            "doc_1"
        );
    }

    #[test]
    fn entries_are_not_duplicated() {
        let agent_id = AgentId::from("ag_1");
        let document = doc();
        let current = json!({"conversation_config": {"agent": {"prompt": {
            "knowledge_base": [{"type": "text", "id": "doc_1", "name": "Acme"}]
        }}}});
        let ctx = AssociationContext {
            agent_id: &agent_id,
            document: &document,
            current: Some(&current),
        };

        let req = PatchStrategy::Minimal.build(&ctx).unwrap();
        let kb = req.body["conversation_config"]["agent"]["prompt"]["knowledge_base"]
            .as_array()
            .unwrap();
        assert_eq!(kb.len(), 1);
    }

    #[test]
    fn payload_shapes() {
        assert_eq!(PayloadShape::DocumentIds.body("d"), json!({"document_ids": ["d"]}));
        assert_eq!(PayloadShape::DocumentId.body("d"), json!({"document_id": "d"}));
        assert_eq!(PayloadShape::Id.body("d"), json!({"id": "d"}));
        assert_eq!(PayloadShape::Bare.body("d"), json!("d"));
    }
}
