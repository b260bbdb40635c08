use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use super::openai::OpenAiProvider;
use super::provider::LlmProvider;
use super::types::ChatRequest;
use crate::core::config::settings::LlmSettings;
use crate::core::errors::ApiError;

/// Front door to the language-model provider: fixes the chat and
/// embedding models, applies the configured sampling temperature, and
/// owns the retry policy for idempotent calls.
#[derive(Clone)]
pub struct LlmService {
    provider: Arc<dyn LlmProvider>,
    settings: LlmSettings,
}

impl LlmService {
    pub fn new(provider: Arc<dyn LlmProvider>, settings: LlmSettings) -> Self {
        Self { provider, settings }
    }

    pub fn from_settings(settings: &LlmSettings) -> Self {
        let provider = Arc::new(OpenAiProvider::new(
            settings.base_url.clone(),
            settings.api_key.clone(),
            Duration::from_secs(settings.request_timeout_secs),
        ));
        Self::new(provider, settings.clone())
    }

    pub async fn chat(&self, request: ChatRequest) -> Result<String, ApiError> {
        let request = request.with_temperature(self.settings.temperature);
        self.provider.chat(request, &self.settings.chat_model).await
    }

    /// Stream a completion. Never retried: a partially-delivered answer
    /// must surface its error instead of being silently restarted.
    pub async fn stream_chat(
        &self,
        request: ChatRequest,
    ) -> Result<mpsc::Receiver<Result<String, ApiError>>, ApiError> {
        let request = request.with_temperature(self.settings.temperature);
        self.provider
            .stream_chat(request, &self.settings.chat_model)
            .await
    }

    /// Embed a batch of texts, retrying with backoff. Embedding is
    /// idempotent, so a bounded retry is safe.
    pub async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let mut attempt: u32 = 0;
        loop {
            match self
                .provider
                .embed(inputs, &self.settings.embedding_model)
                .await
            {
                Ok(vectors) => {
                    if vectors.len() != inputs.len() {
                        return Err(ApiError::Upstream(format!(
                            "embedding count mismatch: requested {}, received {}",
                            inputs.len(),
                            vectors.len()
                        )));
                    }
                    return Ok(vectors);
                }
                Err(err) if attempt < self.settings.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        "embedding request failed (attempt {}/{}): {}",
                        attempt,
                        self.settings.max_retries,
                        err
                    );
                    tokio::time::sleep(Duration::from_millis(250 * attempt as u64)).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>, ApiError> {
        let inputs = vec![text.to_string()];
        let mut vectors = self.embed(&inputs).await?;
        vectors
            .pop()
            .ok_or_else(|| ApiError::Upstream("embedding response was empty".to_string()))
    }
}
