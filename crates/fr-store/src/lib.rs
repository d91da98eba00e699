//! SQLite persistence
//!
//! Two tables: `contacts` holds accepted submissions, `audit_events` is the
//! append-only delivery log. The store is opened once at startup with
//! `create_if_missing` and the schema is applied idempotently.
//!
//! [`SqliteAuditSink`] adapts the store to the audit trait. It swallows its
//! own write errors: a broken audit trail must never fail a delivery.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fr_common::{AuditEventType, AuditSink, FormRelayError, Result, StoredSubmission, Submission};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS contacts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    email TEXT NOT NULL,
    message TEXT NOT NULL,
    created_at INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS audit_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    event_type TEXT NOT NULL,
    details TEXT NOT NULL,
    created_at INTEGER NOT NULL
);
";

/// Submission and audit storage backed by a SQLite file.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and apply the schema.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let url = format!("sqlite://{}", path.as_ref().display());
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(|e| FormRelayError::Storage(format!("Invalid database path: {e}")))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| FormRelayError::Storage(format!("Failed to open database: {e}")))?;

        let store = Self { pool };
        store.init_schema().await?;
        info!(path = %path.as_ref().display(), "SQLite store opened");
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        for statement in SCHEMA.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| FormRelayError::Storage(format!("Schema init failed: {e}")))?;
        }
        Ok(())
    }

    /// Persist an accepted submission, returning its row id.
    pub async fn insert_submission(&self, submission: &Submission) -> Result<i64> {
        let now = Utc::now().timestamp_millis();
        let result = sqlx::query(
            "INSERT INTO contacts (name, email, message, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&submission.name)
        .bind(&submission.email)
        .bind(&submission.message)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| FormRelayError::Storage(format!("Insert failed: {e}")))?;

        let id = result.last_insert_rowid();
        debug!(id = id, email = %submission.email, "Submission stored");
        Ok(id)
    }

    /// All stored submissions, newest first.
    pub async fn list_submissions(&self) -> Result<Vec<StoredSubmission>> {
        let rows = sqlx::query(
            "SELECT id, name, email, message, created_at FROM contacts ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| FormRelayError::Storage(format!("Query failed: {e}")))?;

        let mut submissions = Vec::with_capacity(rows.len());
        for row in &rows {
            submissions.push(parse_submission_row(row)?);
        }
        Ok(submissions)
    }

    async fn insert_audit_event(
        &self,
        event_type: AuditEventType,
        details: &serde_json::Value,
    ) -> Result<()> {
        let now = Utc::now().timestamp_millis();
        sqlx::query("INSERT INTO audit_events (event_type, details, created_at) VALUES (?, ?, ?)")
            .bind(event_type.as_str())
            .bind(details.to_string())
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| FormRelayError::Storage(format!("Audit insert failed: {e}")))?;
        Ok(())
    }

    /// Audit events of one type, oldest first. Test and inspection helper.
    pub async fn audit_events_of_type(&self, event_type: AuditEventType) -> Result<Vec<serde_json::Value>> {
        let rows = sqlx::query(
            "SELECT details FROM audit_events WHERE event_type = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(event_type.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| FormRelayError::Storage(format!("Query failed: {e}")))?;

        let mut events = Vec::with_capacity(rows.len());
        for row in &rows {
            let raw: String = row.get("details");
            events.push(
                serde_json::from_str(&raw)
                    .map_err(|e| FormRelayError::Serialization(e.to_string()))?,
            );
        }
        Ok(events)
    }
}

fn parse_submission_row(row: &sqlx::sqlite::SqliteRow) -> Result<StoredSubmission> {
    let created_at_ts: i64 = row.get("created_at");
    let created_at: DateTime<Utc> = DateTime::from_timestamp_millis(created_at_ts)
        .ok_or_else(|| FormRelayError::Storage("Invalid created_at timestamp".to_string()))?;

    Ok(StoredSubmission {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        message: row.get("message"),
        created_at,
    })
}

/// Audit sink writing to the `audit_events` table.
pub struct SqliteAuditSink {
    store: SqliteStore,
}

impl SqliteAuditSink {
    pub fn new(store: SqliteStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl AuditSink for SqliteAuditSink {
    async fn record(&self, event_type: AuditEventType, details: serde_json::Value) {
        if let Err(e) = self.store.insert_audit_event(event_type, &details).await {
            warn!(error = %e, event_type = %event_type, "Failed to record audit event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn open_temp() -> (SqliteStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open(dir.path().join("test.db")).await.unwrap();
        (store, dir)
    }

    fn submission(name: &str) -> Submission {
        Submission {
            name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase()),
            message: "hello".to_string(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_list_newest_first() {
        let (store, _dir) = open_temp().await;

        let first = store.insert_submission(&submission("Alice")).await.unwrap();
        let second = store.insert_submission(&submission("Bob")).await.unwrap();
        assert!(second > first);

        let listed = store.list_submissions().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].name, "Bob");
        assert_eq!(listed[1].name, "Alice");
        assert_eq!(listed[1].email, "alice@example.com");
    }

    #[tokio::test]
    async fn test_schema_init_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.db");
        let store = SqliteStore::open(&path).await.unwrap();
        store.insert_submission(&submission("Alice")).await.unwrap();
        drop(store);

        // Reopening applies the schema again without clobbering data
        let reopened = SqliteStore::open(&path).await.unwrap();
        assert_eq!(reopened.list_submissions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_audit_sink_records_events() {
        let (store, _dir) = open_temp().await;
        let sink = SqliteAuditSink::new(store.clone());

        sink.record(
            AuditEventType::Sent,
            serde_json::json!({ "subject": "hi", "attempts": 0 }),
        )
        .await;
        sink.record(
            AuditEventType::Retry,
            serde_json::json!({ "error": "down", "attempt": 1 }),
        )
        .await;

        let sent = store.audit_events_of_type(AuditEventType::Sent).await.unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0]["subject"], "hi");

        let retries = store.audit_events_of_type(AuditEventType::Retry).await.unwrap();
        assert_eq!(retries.len(), 1);
        assert_eq!(retries[0]["attempt"], 1);
    }
}
