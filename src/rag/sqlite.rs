//! SQLite-backed vector store implementation.
//!
//! In-process store using SQLite for chunk rows and brute-force cosine
//! similarity for search. The tenant filter is applied in the SQL WHERE
//! clause, not client-side after an unfiltered fetch.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use super::store::{ChunkSearchResult, StoredChunk, VectorStore};
use crate::core::errors::ApiError;

pub struct SqliteVectorStore {
    pool: SqlitePool,
    #[allow(dead_code)]
    db_path: PathBuf,
}

impl SqliteVectorStore {
    pub async fn with_path(db_path: PathBuf) -> Result<Self, ApiError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(ApiError::internal)?;

        let store = Self { pool, db_path };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS document_chunks (
                chunk_id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                source TEXT NOT NULL DEFAULT '',
                org_slug TEXT,
                document_id TEXT,
                metadata TEXT DEFAULT '{}',
                embedding BLOB,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_org ON document_chunks(org_slug)")
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_source ON document_chunks(source)")
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_chunks_document ON document_chunks(document_id)",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(())
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() || a.is_empty() {
            return 0.0;
        }

        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        let denom = norm_a * norm_b;

        if denom <= f32::EPSILON {
            0.0
        } else {
            dot / denom
        }
    }

    fn row_to_chunk(row: &sqlx::sqlite::SqliteRow) -> StoredChunk {
        let metadata_str: String = row.get("metadata");
        let metadata = serde_json::from_str::<Value>(&metadata_str).ok();

        StoredChunk {
            chunk_id: row.get("chunk_id"),
            content: row.get("content"),
            source: row.get("source"),
            org_slug: row.get("org_slug"),
            document_id: row.get("document_id"),
            metadata,
        }
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn upsert(&self, items: Vec<(StoredChunk, Vec<f32>)>) -> Result<(), ApiError> {
        if items.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;

        for (chunk, embedding) in &items {
            let blob = Self::serialize_embedding(embedding);
            let metadata_str = chunk
                .metadata
                .as_ref()
                .map(|m| serde_json::to_string(m).unwrap_or_default())
                .unwrap_or_else(|| "{}".to_string());

            sqlx::query(
                "INSERT OR REPLACE INTO document_chunks
                 (chunk_id, content, source, org_slug, document_id, metadata, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )
            .bind(&chunk.chunk_id)
            .bind(&chunk.content)
            .bind(&chunk.source)
            .bind(&chunk.org_slug)
            .bind(&chunk.document_id)
            .bind(&metadata_str)
            .bind(&blob)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;
        }

        tx.commit().await.map_err(ApiError::internal)?;
        Ok(())
    }

    async fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
        org_slug: Option<&str>,
    ) -> Result<Vec<ChunkSearchResult>, ApiError> {
        let rows = if let Some(org_slug) = org_slug {
            sqlx::query(
                "SELECT chunk_id, content, source, org_slug, document_id, metadata, embedding
                 FROM document_chunks
                 WHERE org_slug = ?1",
            )
            .bind(org_slug)
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::internal)?
        } else {
            sqlx::query(
                "SELECT chunk_id, content, source, org_slug, document_id, metadata, embedding
                 FROM document_chunks",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::internal)?
        };

        let mut scored: Vec<ChunkSearchResult> = rows
            .iter()
            .filter_map(|row| {
                let embedding_bytes: Vec<u8> = row.get("embedding");
                if embedding_bytes.is_empty() {
                    return None;
                }
                let stored_emb = Self::deserialize_embedding(&embedding_bytes);
                let score = Self::cosine_similarity(query_embedding, &stored_emb);

                Some(ChunkSearchResult {
                    chunk: Self::row_to_chunk(row),
                    score,
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit.max(1));

        Ok(scored)
    }

    async fn link_document(
        &self,
        source: &str,
        org_slug: Option<&str>,
        document_id: &str,
    ) -> Result<usize, ApiError> {
        let result = if let Some(org_slug) = org_slug {
            sqlx::query(
                "UPDATE document_chunks SET document_id = ?1 WHERE source = ?2 AND org_slug = ?3",
            )
            .bind(document_id)
            .bind(source)
            .bind(org_slug)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?
        } else {
            sqlx::query(
                "UPDATE document_chunks SET document_id = ?1 WHERE source = ?2 AND org_slug IS NULL",
            )
            .bind(document_id)
            .bind(source)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?
        };

        Ok(result.rows_affected() as usize)
    }

    async fn delete_source(
        &self,
        source: &str,
        org_slug: Option<&str>,
    ) -> Result<usize, ApiError> {
        let result = if let Some(org_slug) = org_slug {
            sqlx::query("DELETE FROM document_chunks WHERE source = ?1 AND org_slug = ?2")
                .bind(source)
                .bind(org_slug)
                .execute(&self.pool)
                .await
                .map_err(ApiError::internal)?
        } else {
            sqlx::query("DELETE FROM document_chunks WHERE source = ?1 AND org_slug IS NULL")
                .bind(source)
                .execute(&self.pool)
                .await
                .map_err(ApiError::internal)?
        };

        Ok(result.rows_affected() as usize)
    }

    async fn delete_document(&self, document_id: &str) -> Result<usize, ApiError> {
        let result = sqlx::query("DELETE FROM document_chunks WHERE document_id = ?1")
            .bind(document_id)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(result.rows_affected() as usize)
    }

    async fn count(&self, org_slug: Option<&str>) -> Result<usize, ApiError> {
        let count: i64 = if let Some(org_slug) = org_slug {
            sqlx::query_scalar("SELECT COUNT(*) FROM document_chunks WHERE org_slug = ?1")
                .bind(org_slug)
                .fetch_one(&self.pool)
                .await
                .map_err(ApiError::internal)?
        } else {
            sqlx::query_scalar("SELECT COUNT(*) FROM document_chunks")
                .fetch_one(&self.pool)
                .await
                .map_err(ApiError::internal)?
        };

        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::store::PageRef;

    async fn test_store() -> SqliteVectorStore {
        let tmp = std::env::temp_dir().join(format!(
            "orgchat-vectors-test-{}.db",
            uuid::Uuid::new_v4()
        ));
        SqliteVectorStore::with_path(tmp).await.unwrap()
    }

    fn make_chunk(id: &str, content: &str, source: &str, org: Option<&str>) -> StoredChunk {
        StoredChunk {
            chunk_id: id.to_string(),
            content: content.to_string(),
            source: source.to_string(),
            org_slug: org.map(|s| s.to_string()),
            document_id: None,
            metadata: Some(serde_json::json!({ "page": 1, "chunk_index": 0 })),
        }
    }

    #[tokio::test]
    async fn insert_and_search() {
        let store = test_store().await;

        let chunk = make_chunk("c1", "Hello world", "test.pdf", Some("acme"));
        let embedding = vec![1.0, 0.0, 0.0];

        store.upsert(vec![(chunk, embedding.clone())]).await.unwrap();
        assert_eq!(store.count(None).await.unwrap(), 1);

        let results = store.search(&embedding, 10, None).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.chunk_id, "c1");
        assert_eq!(results[0].chunk.page(), PageRef::Number(1));
        assert!(results[0].score > 0.99);
    }

    #[tokio::test]
    async fn tenant_filter_isolates_orgs() {
        let store = test_store().await;
        let embedding = vec![1.0, 0.0];

        let mut items = Vec::new();
        for i in 0..5 {
            items.push((
                make_chunk(&format!("a{}", i), "acme text", "acme.pdf", Some("acme")),
                embedding.clone(),
            ));
        }
        for i in 0..3 {
            items.push((
                make_chunk(&format!("g{}", i), "globex text", "globex.pdf", Some("globex")),
                embedding.clone(),
            ));
        }
        store.upsert(items).await.unwrap();

        let acme = store.search(&embedding, 10, Some("acme")).await.unwrap();
        assert_eq!(acme.len(), 5);
        assert!(acme.iter().all(|r| r.chunk.org_slug.as_deref() == Some("acme")));

        let globex = store.search(&embedding, 10, Some("globex")).await.unwrap();
        assert_eq!(globex.len(), 3);
        assert!(globex
            .iter()
            .all(|r| r.chunk.org_slug.as_deref() == Some("globex")));

        let mixed = store.search(&embedding, 10, None).await.unwrap();
        assert_eq!(mixed.len(), 8);

        let unknown = store.search(&embedding, 10, Some("initech")).await.unwrap();
        assert!(unknown.is_empty());
    }

    #[tokio::test]
    async fn link_document_stamps_matching_source() {
        let store = test_store().await;
        let embedding = vec![1.0];

        store
            .upsert(vec![
                (make_chunk("c1", "a", "report.pdf", Some("acme")), embedding.clone()),
                (make_chunk("c2", "b", "report.pdf", Some("acme")), embedding.clone()),
                (make_chunk("c3", "c", "other.pdf", Some("acme")), embedding.clone()),
            ])
            .await
            .unwrap();

        let linked = store
            .link_document("report.pdf", Some("acme"), "doc-42")
            .await
            .unwrap();
        assert_eq!(linked, 2);

        let deleted = store.delete_document("doc-42").await.unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(store.count(None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_source_is_tenant_scoped() {
        let store = test_store().await;
        let embedding = vec![1.0];

        store
            .upsert(vec![
                (make_chunk("c1", "a", "shared.pdf", Some("acme")), embedding.clone()),
                (make_chunk("c2", "b", "shared.pdf", Some("globex")), embedding.clone()),
                (make_chunk("c3", "c", "shared.pdf", None), embedding.clone()),
            ])
            .await
            .unwrap();

        assert_eq!(store.delete_source("shared.pdf", Some("acme")).await.unwrap(), 1);
        assert_eq!(store.delete_source("shared.pdf", None).await.unwrap(), 1);
        assert_eq!(store.count(None).await.unwrap(), 1);
        assert_eq!(store.count(Some("globex")).await.unwrap(), 1);
    }
}
