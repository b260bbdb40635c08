use std::sync::Arc;

use crate::chat::ChatService;
use crate::core::config::{AppPaths, AppSettings};
use crate::documents::DocumentStore;
use crate::ingest::IngestPipeline;
use crate::llm::LlmService;
use crate::orgs::OrgStore;
use crate::rag::{Retriever, SqliteVectorStore, VectorStore};

pub mod error;

use error::InitializationError;

/// Global application state shared across all routes.
///
/// Contains references to:
/// - Configuration and paths
/// - Database-backed stores (orgs, documents, chunks)
/// - LLM service and the services composed on top of it
#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub settings: AppSettings,
    pub orgs: OrgStore,
    pub documents: DocumentStore,
    pub vector_store: Arc<dyn VectorStore>,
    pub llm: LlmService,
    pub chat: ChatService,
    pub ingest: IngestPipeline,
}

impl AppState {
    /// Initializes the application state.
    ///
    /// This process includes:
    /// 1. Setting up paths and loading settings
    /// 2. Initializing the org, document and vector stores
    /// 3. Wiring the LLM service into retrieval, chat and ingestion
    pub async fn initialize() -> Result<Arc<Self>, InitializationError> {
        let paths = Arc::new(AppPaths::new());
        let settings =
            AppSettings::load(&paths).map_err(|e| InitializationError::Settings(e.into()))?;

        let orgs = OrgStore::new(paths.db_path.clone())
            .await
            .map_err(|e| InitializationError::Orgs(e.into()))?;
        let documents = DocumentStore::new(paths.db_path.clone())
            .await
            .map_err(|e| InitializationError::Documents(e.into()))?;
        let vector_store: Arc<dyn VectorStore> = Arc::new(
            SqliteVectorStore::with_path(paths.vector_db_path.clone())
                .await
                .map_err(|e| InitializationError::VectorStore(e.into()))?,
        );

        let llm = LlmService::from_settings(&settings.llm);
        let retriever = Retriever::new(vector_store.clone(), llm.clone(), settings.rag.top_k);
        let chat = ChatService::new(retriever, orgs.clone(), llm.clone());
        let ingest = IngestPipeline::new(
            documents.clone(),
            orgs.clone(),
            vector_store.clone(),
            llm.clone(),
            settings.rag.clone(),
            paths.documents_dir.clone(),
        );

        Ok(Arc::new(AppState {
            paths,
            settings,
            orgs,
            documents,
            vector_store,
            llm,
            chat,
            ingest,
        }))
    }
}
