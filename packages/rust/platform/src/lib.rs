//! Client for the hosted conversational-voice platform.
//!
//! This crate provides:
//! - [`PlatformClient`]: authenticated JSON transport with the shared error mapping
//! - [`knowledge`]: knowledge-base document upload and admin
//! - [`agents`]: agent create/get/patch/list/delete and the widget embed
//! - [`conversations`]: call history and [`CallStats`]

pub mod agents;
pub mod client;
pub mod conversations;
pub mod knowledge;

pub use agents::{AgentSpec, AgentSummary, create_agent_body, knowledge_entry, widget_snippet};
pub use client::{PlatformClient, error_detail};
pub use conversations::{CallStats, ConversationFilter, ConversationPage, ConversationSummary};
pub use knowledge::{DocumentSummary, extract_document_id};

pub use reqwest::Method;
