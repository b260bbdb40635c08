use thiserror::Error;

#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("Failed to load settings: {0}")]
    Settings(#[source] anyhow::Error),

    #[error("Failed to initialize org store: {0}")]
    Orgs(#[source] anyhow::Error),

    #[error("Failed to initialize document store: {0}")]
    Documents(#[source] anyhow::Error),

    #[error("Failed to initialize vector store: {0}")]
    VectorStore(#[source] anyhow::Error),
}
