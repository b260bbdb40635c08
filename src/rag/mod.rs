//! Retrieval side of the RAG pipeline: chunk storage and tenant-scoped
//! similarity search.

pub mod retriever;
pub mod sqlite;
pub mod store;

pub use retriever::{RetrievedChunk, Retriever};
pub use sqlite::SqliteVectorStore;
pub use store::{ChunkSearchResult, PageRef, StoredChunk, VectorStore};
