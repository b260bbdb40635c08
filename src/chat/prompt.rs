//! Prompt assembly for grounded chat answers.
//!
//! Builds one prompt string out of the retrieved chunks, the tenant
//! context and the conversation, with a fixed instruction block that
//! pins the citation format the rest of the system depends on.

use crate::llm::ChatMessage;
use crate::orgs::Org;
use crate::rag::RetrievedChunk;

/// Rendered into the context block when retrieval produced nothing, so
/// the model falls back to general knowledge instead of inventing
/// context-derived facts.
pub const NO_CONTEXT_MARKER: &str = "No relevant documents found.";

const SYSTEM_TEMPLATE: &str = "You are an AI knowledge assistant that helps people work with their organization's uploaded documents. Create a natural, encouraging conversation: be warm and personal, show genuine interest in the question, give practical suggestions and invite follow-up questions.

Try to answer the question from the knowledge provided in the context below first. Only if the context does not contain the answer may you use your general knowledge. Be concise and helpful. Never invent information when relying on the context, and never attribute to the context anything it does not say.

IMPORTANT: whenever you use information from the context, you must cite the source with its page number. Use the exact format [Source: filename.pdf, Page X] at the end of the relevant sentence or paragraph. If you use several sources, cite each source separately with its own bracket.

Answer in the same language as the question.";

/// Assemble the full prompt for one chat turn.
///
/// Omitted organization fields are skipped entirely rather than
/// rendered as empty labels; an empty chunk list renders the explicit
/// no-context marker.
pub fn assemble(
    chunks: &[RetrievedChunk],
    org: Option<&Org>,
    history: &[ChatMessage],
    question: &str,
) -> String {
    let mut prompt = String::from(SYSTEM_TEMPLATE);

    if let Some(org) = org {
        prompt.push_str("\n\n");
        prompt.push_str(&format_org_context(org));
    }

    if !history.is_empty() {
        prompt.push_str("\n\nConversation so far:\n");
        prompt.push_str(&format_history(history));
    }

    prompt.push_str("\n\nContext:\n");
    prompt.push_str(&format_chunks(chunks));

    prompt.push_str("\n\nQuestion:\n");
    prompt.push_str(question);

    prompt
}

/// Serialize retrieved chunks as enumerated blocks with provenance.
pub fn format_chunks(chunks: &[RetrievedChunk]) -> String {
    if chunks.is_empty() {
        return NO_CONTEXT_MARKER.to_string();
    }

    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            format!(
                "Chunk {} (Source: {}, Page: {}):\n{}",
                i + 1,
                chunk.source,
                chunk.page,
                chunk.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn format_org_context(org: &Org) -> String {
    let mut block = String::from("Organization Context:\n");
    block.push_str(&format!("- Company: {}\n", org.display_name));
    if let Some(industry) = non_empty(&org.industry) {
        block.push_str(&format!("- Industry: {}\n", industry));
    }
    if let Some(segments) = non_empty(&org.customer_segments) {
        block.push_str(&format!("- Customer Segments: {}\n", segments));
    }
    if let Some(context) = non_empty(&org.llm_context) {
        block.push_str(&format!("- Additional Context: {}\n", context));
    }
    block.trim_end().to_string()
}

fn format_history(history: &[ChatMessage]) -> String {
    history
        .iter()
        .map(|message| match message.role.as_str() {
            "user" => format!("Human: {}", message.content),
            "assistant" => format!("Assistant: {}", message.content),
            other => format!("{}: {}", other, message.content),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::store::PageRef;

    fn chunk(content: &str, source: &str, page: PageRef) -> RetrievedChunk {
        RetrievedChunk {
            content: content.to_string(),
            source: source.to_string(),
            page,
            score: 0.9,
        }
    }

    fn acme() -> Org {
        Org {
            id: "org-1".to_string(),
            url: "acme".to_string(),
            display_name: "Acme Corp".to_string(),
            industry: Some("Manufacturing".to_string()),
            customer_segments: None,
            llm_context: Some("Acme builds rockets.".to_string()),
            icon_url: None,
            created_at: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn chunks_are_enumerated_with_provenance() {
        let chunks = vec![
            chunk("First passage.", "report.pdf", PageRef::Number(3)),
            chunk("Second passage.", "notes.pdf", PageRef::NotAvailable),
        ];

        let formatted = format_chunks(&chunks);
        assert!(formatted.contains("Chunk 1 (Source: report.pdf, Page: 3):\nFirst passage."));
        assert!(formatted.contains("Chunk 2 (Source: notes.pdf, Page: N/A):\nSecond passage."));
    }

    #[test]
    fn empty_retrieval_renders_the_marker() {
        let prompt = assemble(&[], None, &[], "What is the refund policy?");
        assert!(prompt.contains(NO_CONTEXT_MARKER));
        assert!(prompt.ends_with("What is the refund policy?"));
    }

    #[test]
    fn citation_instruction_is_always_present() {
        let prompt = assemble(&[], None, &[], "anything");
        assert!(prompt.contains("[Source: filename.pdf, Page X]"));
        assert!(prompt.contains("Never invent information"));
        assert!(prompt.contains("same language as the question"));
    }

    #[test]
    fn org_context_skips_missing_fields() {
        let prompt = assemble(&[], Some(&acme()), &[], "q");
        assert!(prompt.contains("- Company: Acme Corp"));
        assert!(prompt.contains("- Industry: Manufacturing"));
        assert!(prompt.contains("- Additional Context: Acme builds rockets."));
        assert!(!prompt.contains("Customer Segments"));
    }

    #[test]
    fn history_is_rendered_as_dialogue_turns() {
        let history = vec![
            ChatMessage::user("What does Acme sell?"),
            ChatMessage::assistant("Rockets, mostly."),
        ];
        let prompt = assemble(&[], None, &history, "And to whom?");
        assert!(prompt.contains("Human: What does Acme sell?"));
        assert!(prompt.contains("Assistant: Rockets, mostly."));
    }

    #[test]
    fn no_history_block_without_history() {
        let prompt = assemble(&[], None, &[], "q");
        assert!(!prompt.contains("Conversation so far:"));
    }
}
