//! Grounded chat answering: retrieve, assemble, stream.

pub mod citations;
pub mod prompt;

use tokio::sync::mpsc;

use crate::core::errors::ApiError;
use crate::llm::{ChatMessage, ChatRequest, LlmService};
use crate::orgs::OrgStore;
use crate::rag::Retriever;

#[derive(Clone)]
pub struct ChatService {
    retriever: Retriever,
    orgs: OrgStore,
    llm: LlmService,
}

impl ChatService {
    pub fn new(retriever: Retriever, orgs: OrgStore, llm: LlmService) -> Self {
        Self {
            retriever,
            orgs,
            llm,
        }
    }

    /// Answer one chat turn. The last message's content is the
    /// question; earlier messages are carried as conversation history.
    ///
    /// Input validation happens before any model call. Retrieval
    /// problems degrade to an answer without grounding instead of
    /// failing the turn; only the generation call itself can fail it.
    pub async fn answer(
        &self,
        messages: &[ChatMessage],
        org_slug: Option<&str>,
    ) -> Result<mpsc::Receiver<Result<String, ApiError>>, ApiError> {
        let question = messages
            .last()
            .map(|m| m.content.trim())
            .unwrap_or_default();
        if question.is_empty() {
            return Err(ApiError::BadRequest("No message content found".to_string()));
        }
        let history = &messages[..messages.len() - 1];

        let org = match org_slug {
            Some(slug) => match self.orgs.lookup(slug).await {
                Ok(org) => org,
                Err(err) => {
                    tracing::warn!("org lookup for '{}' failed: {}", slug, err);
                    None
                }
            },
            None => None,
        };

        // An unfiltered search is a diagnostics tool, never grounding
        // for a live answer: without a tenant there is no retrieval.
        let chunks = match org_slug {
            None => Vec::new(),
            Some(_) => match self.retriever.retrieve_default(question, org_slug).await {
                Ok(chunks) => chunks,
                Err(err) => {
                    tracing::warn!("retrieval failed, answering without grounding: {}", err);
                    Vec::new()
                }
            },
        };
        tracing::debug!(
            "retrieved {} chunks for org {:?}",
            chunks.len(),
            org_slug
        );

        let assembled = prompt::assemble(&chunks, org.as_ref(), history, question);
        let request = ChatRequest::new(vec![ChatMessage::user(assembled)]);
        self.llm.stream_chat(request).await
    }
}
