use std::sync::Arc;

use axum::extract::{Multipart, State};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::documents::NewDocument;
use crate::state::AppState;

/// Accept a PDF upload, stage it in the documents directory under a
/// timestamp-prefixed sanitized name, and create the `uploaded`
/// lifecycle row. Ingestion is triggered separately.
pub async fn upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut file: Option<(String, String, Vec<u8>)> = None;
    let mut org_url: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("invalid multipart payload: {}", e)))?
    {
        let field_name = field.name().map(|name| name.to_string());
        match field_name.as_deref() {
            Some("file") => {
                let original_name = field.file_name().unwrap_or("upload.pdf").to_string();
                let content_type = field.content_type().unwrap_or("").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("failed to read file: {}", e)))?;
                file = Some((original_name, content_type, data.to_vec()));
            }
            Some("orgUrl") => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("failed to read orgUrl: {}", e)))?;
                let value = value.trim().to_string();
                if !value.is_empty() {
                    org_url = Some(value);
                }
            }
            _ => {}
        }
    }

    let (original_name, content_type, data) =
        file.ok_or_else(|| ApiError::BadRequest("No file provided".to_string()))?;

    let is_pdf =
        content_type.contains("pdf") || original_name.to_lowercase().ends_with(".pdf");
    if !is_pdf {
        return Err(ApiError::BadRequest("Only PDF files are allowed".to_string()));
    }
    if data.is_empty() {
        return Err(ApiError::BadRequest("Uploaded file is empty".to_string()));
    }

    let filename = format!(
        "{}-{}",
        chrono::Utc::now().timestamp_millis(),
        sanitize_filename(&original_name)
    );
    let path = state.paths.documents_dir.join(&filename);
    tokio::fs::write(&path, &data)
        .await
        .map_err(ApiError::internal)?;

    let org = match org_url.as_deref() {
        Some(slug) => state.orgs.lookup(slug).await?,
        None => None,
    };

    let document = state
        .documents
        .create(NewDocument {
            filename: filename.clone(),
            original_name,
            file_size: data.len() as i64,
            mime_type: "application/pdf".to_string(),
            org_id: org.as_ref().map(|o| o.id.clone()),
            org_slug: org_url,
            storage_path: Some(path.to_string_lossy().to_string()),
        })
        .await;

    let document = match document {
        Ok(doc) => doc,
        Err(err) => {
            // Don't leave an orphaned file behind if the row insert
            // was refused.
            let _ = tokio::fs::remove_file(&path).await;
            return Err(err);
        }
    };

    tracing::info!("uploaded {} ({} bytes)", filename, data.len());
    Ok(Json(json!({ "document": document })))
}

/// Keep only filesystem-safe characters, mirroring what object storage
/// accepts: alphanumerics, dot, dash, underscore.
fn sanitize_filename(name: &str) -> String {
    let mut sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    while sanitized.contains("__") {
        sanitized = sanitized.replace("__", "_");
    }
    let sanitized = sanitized.trim_matches('_').to_string();
    if sanitized.is_empty() {
        "upload.pdf".to_string()
    } else {
        sanitized
    }
}

#[cfg(test)]
mod tests {
    use super::sanitize_filename;

    #[test]
    fn replaces_unsafe_characters() {
        assert_eq!(sanitize_filename("Jahres Bericht (2024).pdf"), "Jahres_Bericht_2024_.pdf");
        assert_eq!(sanitize_filename("résumé.pdf"), "r_sum_.pdf");
        assert_eq!(sanitize_filename("plain-name_v2.pdf"), "plain-name_v2.pdf");
    }

    #[test]
    fn never_returns_an_empty_name() {
        assert_eq!(sanitize_filename("___"), "upload.pdf");
    }
}
