use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::orgs::NewOrg;
use crate::state::AppState;

pub async fn list_orgs(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let orgs = state.orgs.list().await?;
    Ok(Json(json!({ "orgs": orgs })))
}

pub async fn get_org(
    State(state): State<Arc<AppState>>,
    Path(org_url): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let org = state
        .orgs
        .lookup(&org_url)
        .await?
        .ok_or_else(|| ApiError::NotFound("Organization not found".to_string()))?;
    Ok(Json(json!({ "org": org })))
}

pub async fn create_org(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewOrg>,
) -> Result<impl IntoResponse, ApiError> {
    let org = state.orgs.create(payload).await?;
    Ok(Json(json!({ "org": org })))
}
