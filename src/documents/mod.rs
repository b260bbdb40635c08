//! Document lifecycle store.
//!
//! Tracks each uploaded file through
//! `uploaded -> processing -> {completed|failed}`. Transitions are
//! monotonic within an ingestion run; a re-ingest starts a new run from
//! `processing`. Failures are recorded on the row so they stay
//! queryable after the request that caused them is gone.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqlitePoolOptions, Row, SqlitePool};

use crate::core::errors::ApiError;

/// Error messages are truncated before persisting so a pathological
/// parser backtrace cannot bloat the row.
const MAX_ERROR_LEN: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Uploaded,
    Processing,
    Completed,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentStatus::Uploaded => "uploaded",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Completed => "completed",
            DocumentStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "processing" => DocumentStatus::Processing,
            "completed" => DocumentStatus::Completed,
            "failed" => DocumentStatus::Failed,
            _ => DocumentStatus::Uploaded,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentRecord {
    pub id: String,
    pub filename: String,
    pub original_name: String,
    pub file_size: i64,
    pub mime_type: String,
    pub org_id: Option<String>,
    pub org_slug: Option<String>,
    pub status: DocumentStatus,
    pub chunks_processed: Option<i64>,
    pub error_message: Option<String>,
    pub storage_path: Option<String>,
    pub upload_timestamp: String,
}

#[derive(Debug, Clone)]
pub struct NewDocument {
    pub filename: String,
    pub original_name: String,
    pub file_size: i64,
    pub mime_type: String,
    pub org_id: Option<String>,
    pub org_slug: Option<String>,
    pub storage_path: Option<String>,
}

#[derive(Clone)]
pub struct DocumentStore {
    pool: SqlitePool,
}

impl DocumentStore {
    pub async fn new(db_path: PathBuf) -> Result<Self, ApiError> {
        let conn_str = format!("sqlite://{}?mode=rwc", db_path.to_string_lossy());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&conn_str)
            .await
            .map_err(|e| ApiError::internal(format!("Failed to connect to document db: {}", e)))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                filename TEXT NOT NULL UNIQUE,
                original_name TEXT NOT NULL,
                file_size INTEGER NOT NULL,
                mime_type TEXT NOT NULL,
                org_id TEXT,
                org_slug TEXT,
                status TEXT NOT NULL DEFAULT 'uploaded',
                chunks_processed INTEGER,
                error_message TEXT,
                storage_path TEXT,
                upload_timestamp TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to init documents table: {}", e)))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_org ON documents(org_slug)")
            .execute(&pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(Self { pool })
    }

    pub async fn create(&self, new_doc: NewDocument) -> Result<DocumentRecord, ApiError> {
        if new_doc.filename.trim().is_empty() {
            return Err(ApiError::BadRequest("filename must not be empty".to_string()));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();

        let result = sqlx::query(
            "INSERT INTO documents
             (id, filename, original_name, file_size, mime_type, org_id, org_slug, status, storage_path, upload_timestamp)
             VALUES (?, ?, ?, ?, ?, ?, ?, 'uploaded', ?, ?)",
        )
        .bind(&id)
        .bind(&new_doc.filename)
        .bind(&new_doc.original_name)
        .bind(new_doc.file_size)
        .bind(&new_doc.mime_type)
        .bind(&new_doc.org_id)
        .bind(&new_doc.org_slug)
        .bind(&new_doc.storage_path)
        .bind(&now)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {}
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                return Err(ApiError::Conflict(format!(
                    "document already exists: {}",
                    new_doc.filename
                )));
            }
            Err(e) => return Err(ApiError::internal(e)),
        }

        self.get_by_id(&id).await?.ok_or_else(|| {
            ApiError::Internal(format!("document vanished after insert: {}", id))
        })
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<DocumentRecord>, ApiError> {
        let row = sqlx::query("SELECT * FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(row.as_ref().map(row_to_document))
    }

    pub async fn get_by_filename(&self, filename: &str) -> Result<Option<DocumentRecord>, ApiError> {
        let row = sqlx::query("SELECT * FROM documents WHERE filename = ?")
            .bind(filename)
            .fetch_optional(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(row.as_ref().map(row_to_document))
    }

    pub async fn list_for_org(&self, org_slug: &str) -> Result<Vec<DocumentRecord>, ApiError> {
        let rows = sqlx::query(
            "SELECT * FROM documents WHERE org_slug = ? ORDER BY upload_timestamp DESC",
        )
        .bind(org_slug)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(rows.iter().map(row_to_document).collect())
    }

    /// Start an ingestion run. Clears any chunk count or error left by a
    /// previous run.
    pub async fn mark_processing(&self, id: &str) -> Result<(), ApiError> {
        let result = sqlx::query(
            "UPDATE documents
             SET status = 'processing', chunks_processed = NULL, error_message = NULL
             WHERE id = ?",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound(format!("document not found: {}", id)));
        }
        Ok(())
    }

    /// Finish an ingestion run successfully. Only valid from
    /// `processing`; the guard keeps the transition monotonic.
    pub async fn mark_completed(&self, id: &str, chunk_count: usize) -> Result<(), ApiError> {
        let result = sqlx::query(
            "UPDATE documents
             SET status = 'completed', chunks_processed = ?, error_message = NULL
             WHERE id = ? AND status = 'processing'",
        )
        .bind(chunk_count as i64)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        if result.rows_affected() == 0 {
            return Err(ApiError::Internal(format!(
                "document {} was not in processing state",
                id
            )));
        }
        Ok(())
    }

    /// Record an ingestion failure. Only valid from `processing`.
    pub async fn mark_failed(&self, id: &str, message: &str) -> Result<(), ApiError> {
        let message = truncate_error(message);
        let result = sqlx::query(
            "UPDATE documents
             SET status = 'failed', error_message = ?
             WHERE id = ? AND status = 'processing'",
        )
        .bind(&message)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        if result.rows_affected() == 0 {
            return Err(ApiError::Internal(format!(
                "document {} was not in processing state",
                id
            )));
        }
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> Result<bool, ApiError> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(result.rows_affected() > 0)
    }
}

fn truncate_error(message: &str) -> String {
    if message.chars().count() <= MAX_ERROR_LEN {
        return message.to_string();
    }
    message.chars().take(MAX_ERROR_LEN).collect()
}

fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> DocumentRecord {
    let status: String = row.try_get("status").unwrap_or_default();
    DocumentRecord {
        id: row.try_get::<String, _>("id").unwrap_or_default(),
        filename: row.try_get::<String, _>("filename").unwrap_or_default(),
        original_name: row.try_get::<String, _>("original_name").unwrap_or_default(),
        file_size: row.try_get::<i64, _>("file_size").unwrap_or_default(),
        mime_type: row.try_get::<String, _>("mime_type").unwrap_or_default(),
        org_id: row.try_get::<Option<String>, _>("org_id").unwrap_or(None),
        org_slug: row.try_get::<Option<String>, _>("org_slug").unwrap_or(None),
        status: DocumentStatus::parse(&status),
        chunks_processed: row
            .try_get::<Option<i64>, _>("chunks_processed")
            .unwrap_or(None),
        error_message: row
            .try_get::<Option<String>, _>("error_message")
            .unwrap_or(None),
        storage_path: row
            .try_get::<Option<String>, _>("storage_path")
            .unwrap_or(None),
        upload_timestamp: row
            .try_get::<String, _>("upload_timestamp")
            .unwrap_or_default(),
    }
}
