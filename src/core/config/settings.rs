//! Application settings, built once at startup and passed into each
//! component. No component reads environment variables on its own.
//!
//! Precedence: `config.yml` (user data dir, then project root) overlaid
//! with environment variables for secrets and deploy-time knobs.

use std::env;
use std::fs;
use std::path::PathBuf;

use serde::Deserialize;

use super::paths::AppPaths;
use crate::core::errors::ApiError;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub server: ServerSettings,
    pub llm: LlmSettings,
    pub rag: RagSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: 8080,
            cors_allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub chat_model: String,
    pub embedding_model: String,
    /// Low temperature keeps citation formatting and grounding stable.
    pub temperature: f64,
    pub request_timeout_secs: u64,
    /// Retry count for idempotent calls (embeddings). Generation is
    /// never retried.
    pub max_retries: u32,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            api_key: None,
            chat_model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            temperature: 0.2,
            request_timeout_secs: 60,
            max_retries: 2,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RagSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub embed_batch_size: usize,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            top_k: 4,
            embed_batch_size: 64,
        }
    }
}

impl AppSettings {
    pub fn load(paths: &AppPaths) -> Result<Self, ApiError> {
        let mut settings = match config_path(paths) {
            Some(path) => {
                let contents = fs::read_to_string(&path).map_err(|e| {
                    ApiError::Internal(format!(
                        "failed to read config {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                serde_yaml::from_str::<AppSettings>(&contents).map_err(|e| {
                    ApiError::Internal(format!(
                        "failed to parse config {}: {}",
                        path.display(),
                        e
                    ))
                })?
            }
            None => AppSettings::default(),
        };

        settings.apply_env_overrides();
        settings.validate()?;
        Ok(settings)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(port) = env::var("PORT").ok().and_then(|v| v.parse::<u16>().ok()) {
            self.server.port = port;
        }
        if let Ok(url) = env::var("ORGCHAT_LLM_BASE_URL") {
            if !url.trim().is_empty() {
                self.llm.base_url = url;
            }
        }
        if let Ok(key) = env::var("OPENAI_API_KEY") {
            if !key.trim().is_empty() {
                self.llm.api_key = Some(key);
            }
        }
    }

    pub fn validate(&self) -> Result<(), ApiError> {
        if self.rag.chunk_size == 0 {
            return Err(ApiError::BadRequest(
                "rag.chunk_size must be greater than zero".to_string(),
            ));
        }
        // Overlap must stay strictly below the chunk size so splitting
        // always makes forward progress.
        if self.rag.chunk_overlap >= self.rag.chunk_size {
            return Err(ApiError::BadRequest(format!(
                "rag.chunk_overlap ({}) must be smaller than rag.chunk_size ({})",
                self.rag.chunk_overlap, self.rag.chunk_size
            )));
        }
        if self.rag.top_k == 0 {
            return Err(ApiError::BadRequest(
                "rag.top_k must be at least 1".to_string(),
            ));
        }
        if self.rag.embed_batch_size == 0 {
            return Err(ApiError::BadRequest(
                "rag.embed_batch_size must be at least 1".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ApiError::BadRequest(format!(
                "llm.temperature ({}) must be within 0.0..=2.0",
                self.llm.temperature
            )));
        }
        if self.llm.request_timeout_secs == 0 {
            return Err(ApiError::BadRequest(
                "llm.request_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn config_path(paths: &AppPaths) -> Option<PathBuf> {
    if let Ok(path) = env::var("ORGCHAT_CONFIG_PATH") {
        return Some(PathBuf::from(path));
    }

    let user_config = paths.user_data_dir.join("config.yml");
    if user_config.exists() {
        return Some(user_config);
    }

    let project_config = paths.project_root.join("config.yml");
    if project_config.exists() {
        return Some(project_config);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = AppSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.rag.chunk_size, 1000);
        assert_eq!(settings.rag.chunk_overlap, 200);
    }

    #[test]
    fn rejects_overlap_not_smaller_than_chunk_size() {
        let mut settings = AppSettings::default();
        settings.rag.chunk_overlap = settings.rag.chunk_size;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn rejects_zero_top_k() {
        let mut settings = AppSettings::default();
        settings.rag.top_k = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn parses_partial_yaml_with_defaults() {
        let yaml = "llm:\n  chat_model: test-model\nrag:\n  top_k: 6\n";
        let settings: AppSettings = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(settings.llm.chat_model, "test-model");
        assert_eq!(settings.rag.top_k, 6);
        assert_eq!(settings.rag.chunk_size, 1000);
    }
}
