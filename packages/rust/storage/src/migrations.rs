//! SQL migration definitions for the Voice Bolt ledger.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: agents ledger",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Agents created through Voice Bolt
CREATE TABLE IF NOT EXISTS agents (
    id           TEXT PRIMARY KEY,
    agent_id     TEXT NOT NULL UNIQUE,
    agent_name   TEXT NOT NULL,
    company_name TEXT NOT NULL,
    website_url  TEXT NOT NULL,
    email        TEXT NOT NULL,
    document_id  TEXT,
    association  TEXT NOT NULL,
    created_at   TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_agents_created_at ON agents(created_at);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
