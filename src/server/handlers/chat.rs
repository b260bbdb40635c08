use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::header;
use axum::response::Response;
use axum::Json;
use serde::Deserialize;

use crate::core::errors::ApiError;
use crate::llm::ChatMessage;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatApiMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatApiRequest {
    #[serde(default)]
    pub messages: Vec<ChatApiMessage>,
    #[serde(rename = "orgUrl")]
    pub org_url: Option<String>,
}

/// Answer a chat turn as a chunked plain-text token stream.
///
/// Errors before the first token (missing question, provider refusing
/// the request) surface as structured JSON; once streaming has begun,
/// an upstream failure terminates the body and the already-delivered
/// prefix stands.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ChatApiRequest>,
) -> Result<Response, ApiError> {
    let messages: Vec<ChatMessage> = payload
        .messages
        .into_iter()
        .map(|m| ChatMessage {
            role: m.role,
            content: m.content,
        })
        .collect();

    let rx = state
        .chat
        .answer(&messages, payload.org_url.as_deref())
        .await?;

    // Client disconnect drops this stream, which drops the receiver and
    // stops token production upstream.
    let stream = futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    });

    Response::builder()
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(stream))
        .map_err(ApiError::internal)
}
