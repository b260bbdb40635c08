use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub filename: Option<String>,
    #[serde(rename = "orgUrl")]
    pub org_url: Option<String>,
}

pub async fn ingest(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<IngestRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let filename = payload
        .filename
        .as_deref()
        .map(str::trim)
        .unwrap_or_default();
    if filename.is_empty() {
        return Err(ApiError::BadRequest("No filename provided".to_string()));
    }

    let report = state
        .ingest
        .ingest(filename, payload.org_url.as_deref())
        .await?;

    Ok(Json(json!({
        "message": "Document processed and added to knowledge base",
        "chunks": report.chunks_written
    })))
}
