//! Knowledge-base documents: upload, list, delete.

use reqwest::Method;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, instrument};
use url::Url;

use voicebolt_shared::{DocumentId, Result, VoiceBoltError};

use crate::client::PlatformClient;

/// Response fields that may carry the new document id, in lookup order.
const DOCUMENT_ID_FIELDS: [&str; 4] = ["/id", "/document_id", "/data/id", "/data/document_id"];

/// A knowledge-base document as listed by the platform.
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentSummary {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DocumentList {
    #[serde(default)]
    documents: Vec<DocumentSummary>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    next_cursor: Option<String>,
}

/// Pull the document id out of an upload response.
///
/// Checks `id`, `document_id`, `data.id`, `data.document_id` in that order and
/// fails with [`VoiceBoltError::Contract`] when none is a non-empty string.
pub fn extract_document_id(response: &Value) -> Result<DocumentId> {
    DOCUMENT_ID_FIELDS
        .iter()
        .filter_map(|pointer| response.pointer(pointer).and_then(Value::as_str))
        .find(|id| !id.trim().is_empty())
        .map(DocumentId::from)
        .ok_or_else(|| {
            VoiceBoltError::contract(format!(
                "knowledge base upload returned no document id (looked for id, document_id, data.id, data.document_id): {response}"
            ))
        })
}

impl PlatformClient {
    /// Upload plain text as a knowledge-base document.
    #[instrument(skip(self, text), fields(chars = text.len()))]
    pub async fn create_text_document(&self, name: &str, text: &str) -> Result<DocumentId> {
        if text.trim().is_empty() {
            return Err(VoiceBoltError::validation(
                "refusing to upload an empty knowledge document",
            ));
        }

        let body = json!({ "name": name, "text": text });
        let response = self
            .request_json(Method::POST, "/convai/knowledge-base/text", Some(&body))
            .await?;

        let id = extract_document_id(&response)?;
        info!(document_id = %id, "knowledge document created");
        Ok(id)
    }

    /// Ask the platform to ingest a URL as a knowledge-base document.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn create_url_document(&self, name: &str, url: &Url) -> Result<DocumentId> {
        let body = json!({ "name": name, "url": url.as_str() });
        let response = self
            .request_json(Method::POST, "/convai/knowledge-base/url", Some(&body))
            .await?;

        let id = extract_document_id(&response)?;
        info!(document_id = %id, "knowledge document created from URL");
        Ok(id)
    }

    /// List every knowledge-base document, following cursors.
    #[instrument(skip(self))]
    pub async fn list_documents(&self) -> Result<Vec<DocumentSummary>> {
        let mut all = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut query = vec![("page_size", "100".to_string())];
            if let Some(c) = &cursor {
                query.push(("cursor", c.clone()));
            }

            let value = self
                .send(Method::GET, "/convai/knowledge-base", None, &query)
                .await?;
            let page: DocumentList = serde_json::from_value(value)
                .map_err(|e| VoiceBoltError::contract(format!("knowledge base list: {e}")))?;

            all.extend(page.documents);
            match page.next_cursor {
                Some(next) if page.has_more => cursor = Some(next),
                _ => break,
            }
        }

        Ok(all)
    }

    /// Delete a knowledge-base document.
    #[instrument(skip(self), fields(document_id = %id))]
    pub async fn delete_document(&self, id: &DocumentId) -> Result<()> {
        self.request_json(
            Method::DELETE,
            &format!("/convai/knowledge-base/{id}"),
            None,
        )
        .await?;
        info!("knowledge document deleted");
        Ok(())
    }
}
