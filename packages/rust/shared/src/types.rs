//! Core domain types for agent creation.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, VoiceBoltError};

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex is valid")
});

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Opaque agent identifier issued by the voice platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub String);

impl AgentId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Opaque knowledge-base document identifier issued by the voice platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub String);

impl DocumentId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A document that was uploaded and should be attached to an agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnowledgeDocument {
    pub id: DocumentId,
    /// Human-readable name shown in the platform dashboard.
    pub name: String,
}

// ---------------------------------------------------------------------------
// Creation input
// ---------------------------------------------------------------------------

/// Business facts supplied by the user. Immutable once submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCreationData {
    pub email: String,
    pub company_name: String,
    pub website_url: String,
    pub agent_name: String,
}

impl AgentCreationData {
    /// Check required fields and the email shape, and normalize the website
    /// into an absolute URL. Runs before any network call.
    pub fn validate(&self) -> Result<Url> {
        for (field, value) in [
            ("email", &self.email),
            ("companyName", &self.company_name),
            ("websiteUrl", &self.website_url),
            ("agentName", &self.agent_name),
        ] {
            if value.trim().is_empty() {
                return Err(VoiceBoltError::validation(format!("{field} is required")));
            }
        }

        if !EMAIL_RE.is_match(self.email.trim()) {
            return Err(VoiceBoltError::validation(format!(
                "'{}' is not a valid email address",
                self.email
            )));
        }

        normalize_website_url(&self.website_url)
    }
}

/// The form-driven creation request: creation data plus the extraction mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAgentForm {
    #[serde(flatten)]
    pub data: AgentCreationData,
    /// Crawl several pages instead of scraping only the landing page.
    #[serde(default)]
    pub use_deep_extraction: bool,
}

/// Turn user input like `acme.com` into `https://acme.com/`.
pub fn normalize_website_url(raw: &str) -> Result<Url> {
    let trimmed = raw.trim();
    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    let url = Url::parse(&candidate)
        .map_err(|e| VoiceBoltError::validation(format!("invalid website URL '{raw}': {e}")))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(VoiceBoltError::validation(format!(
            "website URL must use http or https, got '{}'",
            url.scheme()
        )));
    }

    match url.host_str() {
        Some(host) if host.contains('.') || host == "localhost" || url.port().is_some() => Ok(url),
        _ => Err(VoiceBoltError::validation(format!(
            "website URL '{raw}' has no usable host"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Ledger record
// ---------------------------------------------------------------------------

/// Locally recorded metadata for a created agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    /// Local ledger identifier (UUID v7).
    pub id: String,
    pub agent_id: String,
    pub agent_name: String,
    pub company_name: String,
    pub website_url: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    /// Short label of the association outcome (`linked`, `manual`, `none`, ...).
    pub association: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acme() -> AgentCreationData {
        AgentCreationData {
            email: "a@b.com".into(),
            company_name: "Acme".into(),
            website_url: "acme.com".into(),
            agent_name: "Ava".into(),
        }
    }

    #[test]
    fn validate_normalizes_bare_domain() {
        let url = acme().validate().expect("valid");
        assert_eq!(url.as_str(), "https://acme.com/");
    }

    #[test]
    fn validate_rejects_empty_fields() {
        let mut data = acme();
        data.agent_name = "  ".into();
        let err = data.validate().unwrap_err();
        assert!(err.to_string().contains("agentName is required"));
    }

    #[test]
    fn validate_rejects_bad_email() {
        let mut data = acme();
        data.email = "not-an-email".into();
        assert!(matches!(
            data.validate(),
            Err(VoiceBoltError::Validation { .. })
        ));
    }

    #[test]
    fn normalize_rejects_garbage() {
        assert!(normalize_website_url("ftp://acme.com").is_err());
        assert!(normalize_website_url("not a url").is_err());
        assert!(normalize_website_url("intranet").is_err());
        assert!(normalize_website_url("http://localhost:3000/docs").is_ok());
    }

    #[test]
    fn form_uses_camel_case() {
        let json = r#"{
            "email": "a@b.com",
            "companyName": "Acme",
            "websiteUrl": "acme.com",
            "agentName": "Ava",
            "useDeepExtraction": true
        }"#;
        let form: CreateAgentForm = serde_json::from_str(json).expect("parse form");
        assert_eq!(form.data.company_name, "Acme");
        assert!(form.use_deep_extraction);
    }

    #[test]
    fn form_deep_extraction_defaults_off() {
        let json = r#"{"email":"a@b.com","companyName":"Acme","websiteUrl":"acme.com","agentName":"Ava"}"#;
        let form: CreateAgentForm = serde_json::from_str(json).expect("parse form");
        assert!(!form.use_deep_extraction);
    }
}
