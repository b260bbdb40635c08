//! Deterministic in-process provider for pipeline and chat tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::provider::LlmProvider;
use super::types::ChatRequest;
use crate::core::errors::ApiError;

pub struct MockProvider {
    pub chat_calls: AtomicUsize,
    pub embed_calls: AtomicUsize,
    pub stream_tokens: Vec<String>,
    pub fail_mid_stream: bool,
    pub fail_embed: bool,
    pub last_request: Mutex<Option<ChatRequest>>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            chat_calls: AtomicUsize::new(0),
            embed_calls: AtomicUsize::new(0),
            stream_tokens: vec!["Hello".to_string(), " world".to_string()],
            fail_mid_stream: false,
            fail_embed: false,
            last_request: Mutex::new(None),
        }
    }
}

impl MockProvider {
    pub fn total_model_calls(&self) -> usize {
        self.chat_calls.load(Ordering::SeqCst) + self.embed_calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.last_request
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|req| req.messages.last().map(|m| m.content.clone()))
    }
}

/// Cheap deterministic embedding so equal texts map to equal vectors.
pub fn embedding_for(text: &str) -> Vec<f32> {
    let mut buckets = [0f32; 8];
    for (i, byte) in text.bytes().enumerate() {
        buckets[i % 8] += byte as f32;
    }
    let norm = buckets.iter().map(|x| x * x).sum::<f32>().sqrt().max(1.0);
    buckets.iter().map(|x| x / norm).collect()
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn health_check(&self) -> Result<bool, ApiError> {
        Ok(true)
    }

    async fn chat(&self, request: ChatRequest, _model_id: &str) -> Result<String, ApiError> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request);
        Ok("mock answer".to_string())
    }

    async fn stream_chat(
        &self,
        request: ChatRequest,
        _model_id: &str,
    ) -> Result<mpsc::Receiver<Result<String, ApiError>>, ApiError> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request);

        let (tx, rx) = mpsc::channel(8);
        let tokens = self.stream_tokens.clone();
        let fail_mid_stream = self.fail_mid_stream;
        tokio::spawn(async move {
            for token in tokens {
                if tx.send(Ok(token)).await.is_err() {
                    return;
                }
            }
            if fail_mid_stream {
                let _ = tx
                    .send(Err(ApiError::Upstream("mock stream failure".to_string())))
                    .await;
            }
        });

        Ok(rx)
    }

    async fn embed(&self, inputs: &[String], _model_id: &str) -> Result<Vec<Vec<f32>>, ApiError> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_embed {
            return Err(ApiError::Upstream("mock embed failure".to_string()));
        }
        Ok(inputs.iter().map(|text| embedding_for(text)).collect())
    }
}
