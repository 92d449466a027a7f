//! libSQL-backed ledger of agents created through Voice Bolt.
//!
//! The platform owns every agent and document; this ledger only records
//! what was created, from which inputs, and whether the knowledge link was
//! verified, so the CLI can show history without re-querying the platform.

mod migrations;

use std::path::Path;

use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};
use uuid::Uuid;
use voicebolt_shared::{AgentRecord, Result, VoiceBoltError};

const SELECT_COLUMNS: &str = "SELECT id, agent_id, agent_name, company_name, website_url, email, document_id, association, created_at FROM agents";

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl Storage {
    /// Open or create a database at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| VoiceBoltError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| VoiceBoltError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| VoiceBoltError::Storage(e.to_string()))?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    VoiceBoltError::Storage(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // Agent records
    // -----------------------------------------------------------------------

    /// Build a new record with a fresh local id and the current timestamp.
    pub fn new_record(
        agent_id: &str,
        agent_name: &str,
        company_name: &str,
        website_url: &str,
        email: &str,
        document_id: Option<&str>,
        association: &str,
    ) -> AgentRecord {
        AgentRecord {
            id: Uuid::now_v7().to_string(),
            agent_id: agent_id.into(),
            agent_name: agent_name.into(),
            company_name: company_name.into(),
            website_url: website_url.into(),
            email: email.into(),
            document_id: document_id.map(String::from),
            association: association.into(),
            created_at: Utc::now(),
        }
    }

    /// Insert or replace the record for `record.agent_id`.
    pub async fn record_agent(&self, record: &AgentRecord) -> Result<()> {
        let created_at = record.created_at.to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO agents (id, agent_id, agent_name, company_name, website_url, email, document_id, association, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(agent_id) DO UPDATE SET
                    agent_name = excluded.agent_name,
                    company_name = excluded.company_name,
                    website_url = excluded.website_url,
                    email = excluded.email,
                    document_id = excluded.document_id,
                    association = excluded.association",
                params![
                    record.id.as_str(),
                    record.agent_id.as_str(),
                    record.agent_name.as_str(),
                    record.company_name.as_str(),
                    record.website_url.as_str(),
                    record.email.as_str(),
                    record.document_id.as_deref(),
                    record.association.as_str(),
                    created_at.as_str()
                ],
            )
            .await
            .map_err(|e| VoiceBoltError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Get the record for a platform agent id.
    pub async fn get_agent(&self, agent_id: &str) -> Result<Option<AgentRecord>> {
        let mut rows = self
            .conn
            .query(
                &format!("{SELECT_COLUMNS} WHERE agent_id = ?1"),
                params![agent_id],
            )
            .await
            .map_err(|e| VoiceBoltError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_record(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(VoiceBoltError::Storage(e.to_string())),
        }
    }

    /// List records, newest first.
    pub async fn list_agents(&self) -> Result<Vec<AgentRecord>> {
        let mut rows = self
            .conn
            .query(&format!("{SELECT_COLUMNS} ORDER BY created_at DESC"), params![])
            .await
            .map_err(|e| VoiceBoltError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_record(&row)?);
        }
        Ok(results)
    }

    /// Update the association label (and document id) after a later link attempt.
    pub async fn update_association(
        &self,
        agent_id: &str,
        document_id: Option<&str>,
        association: &str,
    ) -> Result<bool> {
        let changed = self
            .conn
            .execute(
                "UPDATE agents SET association = ?2, document_id = COALESCE(?3, document_id) WHERE agent_id = ?1",
                params![agent_id, association, document_id],
            )
            .await
            .map_err(|e| VoiceBoltError::Storage(e.to_string()))?;
        Ok(changed > 0)
    }

    /// Remove the record for an agent (after deleting it on the platform).
    pub async fn forget_agent(&self, agent_id: &str) -> Result<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM agents WHERE agent_id = ?1", params![agent_id])
            .await
            .map_err(|e| VoiceBoltError::Storage(e.to_string()))?;
        Ok(changed > 0)
    }
}

fn row_to_record(row: &libsql::Row) -> Result<AgentRecord> {
    let get = |idx: i32| -> Result<String> {
        row.get::<String>(idx)
            .map_err(|e| VoiceBoltError::Storage(e.to_string()))
    };

    let created_at_str = get(8)?;
    let created_at = DateTime::parse_from_rfc3339(&created_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| VoiceBoltError::Storage(format!("bad created_at '{created_at_str}': {e}")))?;

    Ok(AgentRecord {
        id: get(0)?,
        agent_id: get(1)?,
        agent_name: get(2)?,
        company_name: get(3)?,
        website_url: get(4)?,
        email: get(5)?,
        document_id: row.get::<String>(6).ok(),
        association: get(7)?,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("vb_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn record(agent_id: &str, document_id: Option<&str>) -> AgentRecord {
        Storage::new_record(
            agent_id,
            "Ava",
            "Acme",
            "https://acme.com/",
            "a@b.com",
            document_id,
            "linked",
        )
    }

    #[tokio::test]
    async fn open_runs_migrations() {
        let storage = test_storage().await;
        assert_eq!(storage.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn reopen_is_idempotent() {
        let tmp = std::env::temp_dir().join(format!("vb_test_{}.db", Uuid::now_v7()));
        {
            let storage = Storage::open(&tmp).await.unwrap();
            storage.record_agent(&record("ag_1", None)).await.unwrap();
        }
        let storage = Storage::open(&tmp).await.unwrap();
        assert_eq!(storage.list_agents().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn record_and_get_agent() {
        let storage = test_storage().await;
        storage
            .record_agent(&record("ag_1", Some("doc_1")))
            .await
            .expect("record agent");

        let fetched = storage.get_agent("ag_1").await.unwrap().expect("present");
        assert_eq!(fetched.company_name, "Acme");
        assert_eq!(fetched.document_id.as_deref(), Some("doc_1"));
        assert_eq!(fetched.association, "linked");

        assert!(storage.get_agent("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn record_without_document() {
        let storage = test_storage().await;
        storage.record_agent(&record("ag_2", None)).await.unwrap();
        let fetched = storage.get_agent("ag_2").await.unwrap().unwrap();
        assert!(fetched.document_id.is_none());
    }

    #[tokio::test]
    async fn update_association_keeps_document_when_none() {
        let storage = test_storage().await;
        storage
            .record_agent(&record("ag_1", Some("doc_1")))
            .await
            .unwrap();

        assert!(storage.update_association("ag_1", None, "manual").await.unwrap());
        let fetched = storage.get_agent("ag_1").await.unwrap().unwrap();
        assert_eq!(fetched.association, "manual");
        assert_eq!(fetched.document_id.as_deref(), Some("doc_1"));

        assert!(!storage.update_association("nope", None, "manual").await.unwrap());
    }

    #[tokio::test]
    async fn list_and_forget() {
        let storage = test_storage().await;
        storage.record_agent(&record("ag_1", None)).await.unwrap();
        storage.record_agent(&record("ag_2", None)).await.unwrap();

        assert_eq!(storage.list_agents().await.unwrap().len(), 2);
        assert!(storage.forget_agent("ag_1").await.unwrap());
        assert!(!storage.forget_agent("ag_1").await.unwrap());

        let remaining = storage.list_agents().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].agent_id, "ag_2");
    }
}
