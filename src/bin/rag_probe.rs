//! Diagnostic probe for the RAG pipeline.
//!
//! Verifies tenant filtering end to end against the live stores:
//! filtered retrieval per organization, an unfiltered sweep showing the
//! tenant mix, and optionally a full grounded chat turn whose answer is
//! checked for citation markers.
//!
//! Usage: rag-probe <query> [org-slug]

use std::env;

use orgchat_backend::chat::citations;
use orgchat_backend::llm::ChatMessage;
use orgchat_backend::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut args = env::args().skip(1);
    let query = match args.next() {
        Some(query) => query,
        None => {
            eprintln!("usage: rag-probe <query> [org-slug]");
            std::process::exit(2);
        }
    };
    let chat_org = args.next();

    let state = AppState::initialize().await?;

    let orgs = state.orgs.list().await?;
    println!("organizations: {}", orgs.len());
    for org in &orgs {
        println!("  - {} ({})", org.display_name, org.url);
    }

    println!("\nquery: {:?}\n", query);

    let retriever = orgchat_backend::rag::Retriever::new(
        state.vector_store.clone(),
        state.llm.clone(),
        state.settings.rag.top_k,
    );

    for org in &orgs {
        let chunks = retriever.retrieve(&query, Some(org.url.as_str()), 3).await?;
        println!("{} ({}): {} chunks", org.display_name, org.url, chunks.len());
        for (i, chunk) in chunks.iter().enumerate() {
            println!(
                "  {}. {} page {} (score {:.3})",
                i + 1,
                chunk.source,
                chunk.page,
                chunk.score
            );
        }
    }

    // Unfiltered sweep: diagnostics only, shows the tenant mix.
    let all = retriever.retrieve(&query, None, 5).await?;
    println!("\nunfiltered: {} chunks across all tenants", all.len());

    let Some(org_slug) = chat_org else {
        return Ok(());
    };

    println!("\nchat turn against '{}':", org_slug);
    let mut rx = state
        .chat
        .answer(&[ChatMessage::user(query)], Some(org_slug.as_str()))
        .await?;

    let mut answer = String::new();
    while let Some(item) = rx.recv().await {
        match item {
            Ok(token) => {
                print!("{}", token);
                answer.push_str(&token);
            }
            Err(err) => {
                eprintln!("\nstream error: {}", err);
                break;
            }
        }
    }
    println!();

    let cited = citations::extract_citations(&answer);
    if cited.is_empty() {
        println!("no citation markers in answer");
    } else {
        println!("citations:");
        for citation in cited {
            println!("  [Source: {}, Page {}]", citation.source, citation.page);
        }
    }

    Ok(())
}
