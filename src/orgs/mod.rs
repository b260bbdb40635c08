//! Organization (tenant) store.
//!
//! The URL slug is the sole external-facing tenant identifier; every
//! retrieval and document-scoping decision keys off it.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqlitePoolOptions, Row, SqlitePool};

use crate::core::errors::ApiError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Org {
    pub id: String,
    /// Globally-unique URL slug, used as the chunk filter key.
    pub url: String,
    pub display_name: String,
    pub industry: Option<String>,
    pub customer_segments: Option<String>,
    /// Free-text context injected into the chat prompt.
    pub llm_context: Option<String>,
    pub icon_url: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewOrg {
    pub url: String,
    pub display_name: String,
    pub industry: Option<String>,
    pub customer_segments: Option<String>,
    pub llm_context: Option<String>,
    pub icon_url: Option<String>,
}

#[derive(Clone)]
pub struct OrgStore {
    pool: SqlitePool,
}

impl OrgStore {
    pub async fn new(db_path: PathBuf) -> Result<Self, ApiError> {
        let conn_str = format!("sqlite://{}?mode=rwc", db_path.to_string_lossy());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&conn_str)
            .await
            .map_err(|e| ApiError::internal(format!("Failed to connect to org db: {}", e)))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS orgs (
                id TEXT PRIMARY KEY,
                url TEXT NOT NULL UNIQUE,
                display_name TEXT NOT NULL,
                industry TEXT,
                customer_segments TEXT,
                llm_context TEXT,
                icon_url TEXT,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to init orgs table: {}", e)))?;

        Ok(Self { pool })
    }

    pub async fn create(&self, new_org: NewOrg) -> Result<Org, ApiError> {
        let slug = new_org.url.trim();
        if slug.is_empty() {
            return Err(ApiError::BadRequest("org url must not be empty".to_string()));
        }
        if new_org.display_name.trim().is_empty() {
            return Err(ApiError::BadRequest(
                "org display name must not be empty".to_string(),
            ));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();

        let result = sqlx::query(
            "INSERT INTO orgs (id, url, display_name, industry, customer_segments, llm_context, icon_url, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(slug)
        .bind(new_org.display_name.trim())
        .bind(&new_org.industry)
        .bind(&new_org.customer_segments)
        .bind(&new_org.llm_context)
        .bind(&new_org.icon_url)
        .bind(&now)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {}
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                return Err(ApiError::Conflict(format!("org already exists: {}", slug)));
            }
            Err(e) => return Err(ApiError::internal(e)),
        }

        self.lookup(slug).await?.ok_or_else(|| {
            ApiError::Internal(format!("org vanished after insert: {}", slug))
        })
    }

    pub async fn lookup(&self, slug: &str) -> Result<Option<Org>, ApiError> {
        let row = sqlx::query("SELECT * FROM orgs WHERE url = ?")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(row.as_ref().map(row_to_org))
    }

    pub async fn list(&self) -> Result<Vec<Org>, ApiError> {
        let rows = sqlx::query("SELECT * FROM orgs ORDER BY display_name ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(rows.iter().map(row_to_org).collect())
    }
}

fn row_to_org(row: &sqlx::sqlite::SqliteRow) -> Org {
    Org {
        id: row.try_get::<String, _>("id").unwrap_or_default(),
        url: row.try_get::<String, _>("url").unwrap_or_default(),
        display_name: row.try_get::<String, _>("display_name").unwrap_or_default(),
        industry: row.try_get::<Option<String>, _>("industry").unwrap_or(None),
        customer_segments: row
            .try_get::<Option<String>, _>("customer_segments")
            .unwrap_or(None),
        llm_context: row.try_get::<Option<String>, _>("llm_context").unwrap_or(None),
        icon_url: row.try_get::<Option<String>, _>("icon_url").unwrap_or(None),
        created_at: row.try_get::<String, _>("created_at").unwrap_or_default(),
    }
}
