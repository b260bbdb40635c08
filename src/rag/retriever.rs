//! Tenant-scoped similarity retrieval.

use std::sync::Arc;

use super::store::{ChunkSearchResult, PageRef, VectorStore};
use crate::core::errors::ApiError;
use crate::llm::LlmService;

/// A ranked chunk produced for one query; lives for one request.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub content: String,
    pub source: String,
    pub page: PageRef,
    pub score: f32,
}

impl From<ChunkSearchResult> for RetrievedChunk {
    fn from(result: ChunkSearchResult) -> Self {
        let page = result.chunk.page();
        RetrievedChunk {
            content: result.chunk.content,
            source: result.chunk.source,
            page,
            score: result.score,
        }
    }
}

#[derive(Clone)]
pub struct Retriever {
    store: Arc<dyn VectorStore>,
    llm: LlmService,
    top_k: usize,
}

impl Retriever {
    pub fn new(store: Arc<dyn VectorStore>, llm: LlmService, top_k: usize) -> Self {
        Self { store, llm, top_k }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Embed the query and search the store, restricted server-side to
    /// `org_slug` when present. Zero results is a valid outcome meaning
    /// "no grounding available", not an error.
    pub async fn retrieve(
        &self,
        query: &str,
        org_slug: Option<&str>,
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, ApiError> {
        let query_embedding = self.llm.embed_one(query).await?;
        let results = self.store.search(&query_embedding, k, org_slug).await?;
        Ok(results.into_iter().map(RetrievedChunk::from).collect())
    }

    pub async fn retrieve_default(
        &self,
        query: &str,
        org_slug: Option<&str>,
    ) -> Result<Vec<RetrievedChunk>, ApiError> {
        self.retrieve(query, org_slug, self.top_k).await
    }
}
