//! libSQL backend: async `SubmissionStore` implementation.
//!
//! Supports local file, in-memory, and hosted (remote) databases. Each
//! submission field is one row keyed by `(identity_id, field_key)` with the
//! value stored as JSON text.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::onboarding::answer::{AnswerMap, AnswerValue};
use crate::store::migrations;
use crate::store::traits::{PersistedSubmission, SubmissionStore};

const UPSERT_FIELD: &str = "INSERT INTO intake_submissions (identity_id, field_key, value, updated_at)
     VALUES (?1, ?2, ?3, ?4)
     ON CONFLICT (identity_id, field_key) DO UPDATE SET value = ?3, updated_at = ?4";

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// Writes hold `write_lock`, so an open transaction never contains another
/// caller's writes.
pub struct LibSqlBackend {
    /// Keeps the database handle alive for the connection's lifetime.
    _db: Arc<LibSqlDatabase>,
    conn: Connection,
    write_lock: Mutex<()>,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Connect to a hosted libSQL database.
    pub async fn new_remote(url: &str, auth_token: &SecretString) -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_remote(url.to_string(), auth_token.expose_secret().to_string())
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to connect to {url}: {e}")))?;

        let backend = Self::from_database(db).await?;
        info!(url, "Remote database connected");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;
        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        migrations::run_migrations(&conn).await?;
        Ok(Self {
            _db: Arc::new(db),
            conn,
            write_lock: Mutex::new(()),
        })
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .ok()
        .map(|ndt| ndt.and_utc())
}

fn encode_value(value: &AnswerValue) -> Result<String, DatabaseError> {
    serde_json::to_string(value).map_err(|e| DatabaseError::Serialization(e.to_string()))
}

#[async_trait]
impl SubmissionStore for LibSqlBackend {
    async fn upsert(
        &self,
        identity_id: Uuid,
        key: &str,
        value: &AnswerValue,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let value_str = encode_value(value)?;

        let _guard = self.write_lock.lock().await;
        self.conn()
            .execute(
                UPSERT_FIELD,
                params![identity_id.to_string(), key, value_str, now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert: {e}")))?;

        debug!(identity_id = %identity_id, key, "Submission field stored");
        Ok(())
    }

    async fn upsert_many(
        &self,
        identity_id: Uuid,
        fields: &AnswerMap,
    ) -> Result<(), DatabaseError> {
        if fields.is_empty() {
            return Ok(());
        }
        let now = Utc::now().to_rfc3339();
        let id = identity_id.to_string();
        let rows = fields
            .iter()
            .map(|(key, value)| Ok::<_, DatabaseError>((key.clone(), encode_value(value)?)))
            .collect::<Result<Vec<_>, DatabaseError>>()?;

        let _guard = self.write_lock.lock().await;
        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_many begin: {e}")))?;

        for (key, value_str) in rows {
            if let Err(e) = tx
                .execute(UPSERT_FIELD, params![id.clone(), key.clone(), value_str, now.clone()])
                .await
            {
                if let Err(rb) = tx.rollback().await {
                    warn!(identity_id = %identity_id, error = %rb, "Rollback failed");
                }
                return Err(DatabaseError::Query(format!("upsert_many {key}: {e}")));
            }
        }

        tx.commit()
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_many commit: {e}")))?;

        debug!(identity_id = %identity_id, count = fields.len(), "Submission fields merged");
        Ok(())
    }

    async fn load(&self, identity_id: Uuid) -> Result<Option<PersistedSubmission>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT field_key, value, updated_at FROM intake_submissions WHERE identity_id = ?1",
                params![identity_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("load: {e}")))?;

        let mut fields = AnswerMap::new();
        let mut updated_at: Option<DateTime<Utc>> = None;

        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("load: {e}")))?
        {
            let key: String = row
                .get(0)
                .map_err(|e| DatabaseError::Query(format!("load field_key: {e}")))?;
            let value_str: String = row.get(1).unwrap_or_else(|_| "null".to_string());
            let value: AnswerValue = serde_json::from_str(&value_str).unwrap_or_default();
            let row_updated = row
                .get::<String>(2)
                .ok()
                .and_then(|s| parse_datetime(&s));

            updated_at = updated_at.max(row_updated);
            fields.insert(key, value);
        }

        if fields.is_empty() {
            return Ok(None);
        }
        Ok(Some(PersistedSubmission {
            identity_id,
            fields,
            updated_at,
        }))
    }
}
