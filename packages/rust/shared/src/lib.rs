//! Shared types, error model, and configuration for Voice Bolt.
//!
//! This crate is the foundation depended on by all other Voice Bolt crates.
//! It provides:
//! - [`VoiceBoltError`]: the unified error type
//! - Domain types ([`AgentCreationData`], [`CreateAgentForm`], [`AgentId`], [`DocumentId`])
//! - Configuration ([`AppConfig`], config loading)
//! - The injected API-key capability ([`ApiKeySource`])
//! - [`BackoffPolicy`] for polling and settle waits

pub mod backoff;
pub mod config;
pub mod error;
pub mod keys;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use backoff::BackoffPolicy;
pub use config::{
    AppConfig, AssociationConfig, CrawlConfig, FirecrawlConfig, PipelineConfig, PlatformConfig,
    config_dir, config_file_path, init_config, ledger_path, load_config, load_config_from,
};
pub use error::{Result, VoiceBoltError};
pub use keys::{ApiKeySource, EnvKeySource, StaticKey};
pub use types::{
    AgentCreationData, AgentId, AgentRecord, CreateAgentForm, DocumentId, KnowledgeDocument,
    normalize_website_url,
};
