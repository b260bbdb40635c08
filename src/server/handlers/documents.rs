use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::state::AppState;

pub async fn list_documents(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, ApiError> {
    let org_url = params
        .get("orgUrl")
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Organization URL is required".to_string()))?;

    let org = state
        .orgs
        .lookup(org_url)
        .await?
        .ok_or_else(|| ApiError::NotFound("Organization not found".to_string()))?;

    let documents = state.documents.list_for_org(&org.url).await?;
    Ok(Json(json!({ "documents": documents })))
}

/// Delete a document: chunk rows first so retrieval can never serve a
/// chunk whose document is gone, then the stored file (best-effort),
/// then the row itself. File cleanup failures are logged, not fatal; a
/// stray file cannot leak into any tenant's answers once its chunks are
/// gone.
pub async fn delete_document(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, ApiError> {
    let document_id = params
        .get("documentId")
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Document ID is required".to_string()))?;
    let org_url = params
        .get("orgUrl")
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Organization URL is required".to_string()))?;

    let org = state
        .orgs
        .lookup(org_url)
        .await?
        .ok_or_else(|| ApiError::NotFound("Organization not found".to_string()))?;

    let document = state
        .documents
        .get_by_id(document_id)
        .await?
        .filter(|doc| doc.org_slug.as_deref() == Some(org.url.as_str()))
        .ok_or_else(|| {
            ApiError::NotFound("Document not found or access denied".to_string())
        })?;

    if let Err(err) = state.vector_store.delete_document(&document.id).await {
        tracing::warn!("failed to delete chunks of document {}: {}", document.id, err);
    }
    // Chunks from a run whose linkage pass failed carry no document_id;
    // sweep them by source as well.
    if let Err(err) = state
        .vector_store
        .delete_source(&document.filename, document.org_slug.as_deref())
        .await
    {
        tracing::warn!(
            "failed to delete unlinked chunks of {}: {}",
            document.filename,
            err
        );
    }

    let path = state.paths.documents_dir.join(&document.filename);
    if let Err(err) = tokio::fs::remove_file(&path).await {
        tracing::warn!("failed to delete file {}: {}", path.display(), err);
    }

    if !state.documents.delete(&document.id).await? {
        return Err(ApiError::NotFound("Document not found".to_string()));
    }

    Ok(Json(json!({ "message": "Document deleted successfully" })))
}
