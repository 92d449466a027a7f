//! Where a document id may show up in an agent representation.
//!
//! The platform does not echo attached knowledge in one canonical place, so
//! every read-back checks the same ordered list of JSON pointers.

use serde_json::Value;

use voicebolt_shared::DocumentId;

/// A named place in the agent JSON that may list attached documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentLocation {
    /// Dotted path, for logs and outcomes.
    pub name: &'static str,
    /// JSON pointer used for the lookup.
    pub pointer: &'static str,
}

/// Known locations, checked in this order.
pub const KNOWN_LOCATIONS: [DocumentLocation; 5] = [
    DocumentLocation {
        name: "conversation_config.agent.prompt.knowledge_base",
        pointer: "/conversation_config/agent/prompt/knowledge_base",
    },
    DocumentLocation {
        name: "conversation_config.agent.knowledge_base",
        pointer: "/conversation_config/agent/knowledge_base",
    },
    DocumentLocation {
        name: "knowledge_base",
        pointer: "/knowledge_base",
    },
    DocumentLocation {
        name: "agent.knowledge_base",
        pointer: "/agent/knowledge_base",
    },
    DocumentLocation {
        name: "document_ids",
        pointer: "/document_ids",
    },
];

/// First known location that lists `id`, if any.
pub fn find_document(agent: &Value, id: &DocumentId) -> Option<DocumentLocation> {
    KNOWN_LOCATIONS
        .iter()
        .find(|loc| location_contains(agent, loc, id))
        .copied()
}

/// True if the array at `loc` contains `id`.
pub fn location_contains(agent: &Value, loc: &DocumentLocation, id: &DocumentId) -> bool {
    agent
        .pointer(loc.pointer)
        .and_then(Value::as_array)
        .is_some_and(|entries| entries.iter().any(|e| entry_matches(e, id)))
}

/// An entry matches as a bare string or as an object with `id`/`document_id`.
pub fn entry_matches(entry: &Value, id: &DocumentId) -> bool {
    match entry {
        Value::String(s) => s == id.as_str(),
        Value::Object(obj) => ["id", "document_id"]
            .iter()
            .any(|k| obj.get(*k).and_then(Value::as_str) == Some(id.as_str())),
        _ => false,
    }
}
