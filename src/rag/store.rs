//! VectorStore trait — abstract interface for chunk storage backends.
//!
//! The primary implementation is `SqliteVectorStore` in the `sqlite`
//! module. The tenant filter is contractually a flat-key equality match
//! (`org_slug = ?`); nested-path or JSON-operator filter shapes are not
//! part of the interface because filter pushdown for them cannot be
//! assumed of every backend.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::errors::ApiError;

/// 1-based page number, or the explicit "N/A" sentinel when the loader
/// could not attribute one. A chunk never carries an absent page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageRef {
    Number(u32),
    NotAvailable,
}

impl PageRef {
    pub fn to_json(self) -> Value {
        match self {
            PageRef::Number(n) => Value::from(n),
            PageRef::NotAvailable => Value::from("N/A"),
        }
    }

    pub fn from_json(value: Option<&Value>) -> Self {
        match value.and_then(Value::as_u64) {
            Some(n) if n > 0 => PageRef::Number(n as u32),
            _ => PageRef::NotAvailable,
        }
    }
}

impl fmt::Display for PageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageRef::Number(n) => write!(f, "{}", n),
            PageRef::NotAvailable => write!(f, "N/A"),
        }
    }
}

/// A stored chunk with its provenance metadata.
///
/// `org_slug` is duplicated out of the metadata JSON into its own field
/// so the store can filter on it server-side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredChunk {
    pub chunk_id: String,
    /// The text content of the chunk.
    pub content: String,
    /// Original filename the chunk was derived from.
    pub source: String,
    /// Tenant key; `None` for chunks ingested without a resolved org.
    pub org_slug: Option<String>,
    /// Back-reference to the owning document row.
    pub document_id: Option<String>,
    /// Remaining provenance (page, orgId, chunk_index, start_offset).
    pub metadata: Option<Value>,
}

impl StoredChunk {
    pub fn page(&self) -> PageRef {
        PageRef::from_json(self.metadata.as_ref().and_then(|m| m.get("page")))
    }
}

/// Result of a similarity search.
#[derive(Debug, Clone)]
pub struct ChunkSearchResult {
    pub chunk: StoredChunk,
    /// Cosine similarity (higher = better).
    pub score: f32,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert chunks with their embedding vectors in one batch.
    async fn upsert(&self, items: Vec<(StoredChunk, Vec<f32>)>) -> Result<(), ApiError>;

    /// Search for chunks similar to the query embedding.
    ///
    /// With `org_slug` present the search is restricted server-side to
    /// that tenant's chunks. An unfiltered search is for diagnostics
    /// only, never for answering a live chat turn.
    async fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
        org_slug: Option<&str>,
    ) -> Result<Vec<ChunkSearchResult>, ApiError>;

    /// Second-pass linkage: stamp the owning document id onto every
    /// chunk of a source file.
    async fn link_document(
        &self,
        source: &str,
        org_slug: Option<&str>,
        document_id: &str,
    ) -> Result<usize, ApiError>;

    /// Delete all chunks of a source file within a tenant.
    async fn delete_source(&self, source: &str, org_slug: Option<&str>)
        -> Result<usize, ApiError>;

    /// Delete all chunks linked to a document.
    async fn delete_document(&self, document_id: &str) -> Result<usize, ApiError>;

    /// Total chunk count (optionally filtered by tenant).
    async fn count(&self, org_slug: Option<&str>) -> Result<usize, ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_ref_round_trips_through_json() {
        assert_eq!(
            PageRef::from_json(Some(&PageRef::Number(3).to_json())),
            PageRef::Number(3)
        );
        assert_eq!(
            PageRef::from_json(Some(&PageRef::NotAvailable.to_json())),
            PageRef::NotAvailable
        );
        assert_eq!(PageRef::from_json(None), PageRef::NotAvailable);
    }

    #[test]
    fn page_ref_renders_sentinel() {
        assert_eq!(PageRef::Number(7).to_string(), "7");
        assert_eq!(PageRef::NotAvailable.to_string(), "N/A");
    }
}
