//! Document ingestion pipeline: load -> chunk -> embed -> store, with
//! lifecycle bookkeeping on the document row at every phase boundary.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use super::loader::{self, PageSection};
use super::splitter::{ChunkProvenance, SplitChunk, TextSplitter};
use crate::core::config::settings::RagSettings;
use crate::core::errors::ApiError;
use crate::documents::{DocumentRecord, DocumentStore};
use crate::llm::LlmService;
use crate::orgs::{Org, OrgStore};
use crate::rag::store::{PageRef, StoredChunk, VectorStore};

#[derive(Debug, Clone)]
pub struct IngestReport {
    pub chunks_written: usize,
}

#[derive(Clone)]
pub struct IngestPipeline {
    documents: DocumentStore,
    orgs: OrgStore,
    store: Arc<dyn VectorStore>,
    llm: LlmService,
    settings: RagSettings,
    documents_dir: PathBuf,
    /// Filenames with an ingestion currently in flight. Concurrent
    /// ingestion of the same file is not safe (the delete-then-upsert
    /// replace would interleave), so it is rejected up front.
    active: Arc<Mutex<HashSet<String>>>,
}

impl IngestPipeline {
    pub fn new(
        documents: DocumentStore,
        orgs: OrgStore,
        store: Arc<dyn VectorStore>,
        llm: LlmService,
        settings: RagSettings,
        documents_dir: PathBuf,
    ) -> Self {
        Self {
            documents,
            orgs,
            store,
            llm,
            settings,
            documents_dir,
            active: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Run the full pipeline for one uploaded file.
    ///
    /// Tenant resolution is best-effort here: an unknown slug means the
    /// chunks are stored untagged, and isolation is enforced at
    /// retrieval time. Every failure in the inner pipeline is recorded
    /// on the document row before being returned to the caller.
    pub async fn ingest(
        &self,
        filename: &str,
        org_slug: Option<&str>,
    ) -> Result<IngestReport, ApiError> {
        let filename = filename.trim();
        if filename.is_empty() {
            return Err(ApiError::BadRequest("no filename provided".to_string()));
        }

        let document = self
            .documents
            .get_by_filename(filename)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("document not found: {}", filename)))?;

        let _guard = self.acquire_slot(filename)?;

        let org = match org_slug {
            Some(slug) => {
                let org = self.orgs.lookup(slug).await?;
                if org.is_none() {
                    tracing::warn!(
                        "org '{}' not found; ingesting {} without tenant tag",
                        slug,
                        filename
                    );
                }
                org
            }
            None => None,
        };

        self.documents.mark_processing(&document.id).await?;

        match self.run(&document, filename, org_slug, org.as_ref()).await {
            Ok(report) => {
                self.documents
                    .mark_completed(&document.id, report.chunks_written)
                    .await?;
                tracing::info!(
                    "ingested {}: {} chunks written",
                    filename,
                    report.chunks_written
                );
                Ok(report)
            }
            Err(err) => {
                let message = err.to_string();
                if let Err(update_err) = self.documents.mark_failed(&document.id, &message).await {
                    tracing::error!(
                        "failed to record ingestion failure for {}: {}",
                        filename,
                        update_err
                    );
                }
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        document: &DocumentRecord,
        filename: &str,
        org_slug: Option<&str>,
        org: Option<&Org>,
    ) -> Result<IngestReport, ApiError> {
        let path = self.documents_dir.join(filename);
        let sections = loader::load_pdf(&path)?;
        if sections.is_empty() {
            return Err(ApiError::Pipeline("no content found in PDF".to_string()));
        }
        tracing::debug!("loaded {} sections from {}", sections.len(), filename);

        let chunks = self.split_sections(&sections, filename, org_slug, org);
        if chunks.is_empty() {
            return Err(ApiError::Pipeline("no content found in PDF".to_string()));
        }

        // Last gate before persistence: provenance must be complete on
        // every chunk, whatever the earlier stages did.
        for chunk in &chunks {
            if chunk.provenance.source.is_empty() {
                return Err(ApiError::Pipeline(format!(
                    "chunk {} of {} lost its source attribution",
                    chunk.chunk_index, filename
                )));
            }
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let mut embeddings: Vec<Vec<f32>> = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.settings.embed_batch_size) {
            embeddings.extend(self.llm.embed(batch).await?);
        }

        // Re-ingesting the same file for the same tenant replaces its
        // chunks instead of duplicating them.
        self.store.delete_source(filename, org_slug).await?;

        let items: Vec<(StoredChunk, Vec<f32>)> = chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| (self.to_stored_chunk(chunk), embedding))
            .collect();
        let written = items.len();
        self.store.upsert(items).await?;

        // Second-pass linkage keyed by source filename; losing it keeps
        // the chunks retrievable, so it is logged rather than fatal.
        match self
            .store
            .link_document(filename, org_slug, &document.id)
            .await
        {
            Ok(linked) => tracing::debug!("linked {} chunks to document {}", linked, document.id),
            Err(err) => tracing::warn!(
                "failed to link chunks of {} to document {}: {}",
                filename,
                document.id,
                err
            ),
        }

        Ok(IngestReport {
            chunks_written: written,
        })
    }

    fn split_sections(
        &self,
        sections: &[PageSection],
        filename: &str,
        org_slug: Option<&str>,
        org: Option<&Org>,
    ) -> Vec<SplitChunk> {
        let splitter = TextSplitter::new(self.settings.chunk_size, self.settings.chunk_overlap);

        let mut chunks = Vec::new();
        for section in sections {
            let provenance = ChunkProvenance {
                source: filename.to_string(),
                page: section
                    .page
                    .map(PageRef::Number)
                    .unwrap_or(PageRef::NotAvailable),
                org_slug: org_slug.map(|s| s.to_string()),
                org_id: org.map(|o| o.id.clone()),
            };
            chunks.extend(splitter.split(&section.text, &provenance));
        }
        chunks
    }

    fn to_stored_chunk(&self, chunk: &SplitChunk) -> StoredChunk {
        let provenance = &chunk.provenance;
        let metadata = serde_json::json!({
            "source": provenance.source,
            "page": provenance.page.to_json(),
            "orgUrl": provenance.org_slug,
            "orgId": provenance.org_id,
            "chunk_index": chunk.chunk_index,
            "start_offset": chunk.start_offset,
        });

        StoredChunk {
            chunk_id: uuid::Uuid::new_v4().to_string(),
            content: chunk.text.clone(),
            source: provenance.source.clone(),
            org_slug: provenance.org_slug.clone(),
            document_id: None,
            metadata: Some(metadata),
        }
    }

    fn acquire_slot(&self, filename: &str) -> Result<IngestSlot, ApiError> {
        let mut active = self
            .active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !active.insert(filename.to_string()) {
            return Err(ApiError::Conflict(format!(
                "ingestion already in progress for {}",
                filename
            )));
        }
        Ok(IngestSlot {
            active: Arc::clone(&self.active),
            filename: filename.to_string(),
        })
    }
}

/// Releases the per-filename ingestion slot on drop, including on the
/// error paths.
#[derive(Debug)]
struct IngestSlot {
    active: Arc<Mutex<HashSet<String>>>,
    filename: String,
}

impl Drop for IngestSlot {
    fn drop(&mut self) {
        let mut active = self
            .active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        active.remove(&self.filename);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::core::config::settings::LlmSettings;
    use crate::documents::{DocumentStatus, NewDocument};
    use crate::ingest::loader::test_pdf;
    use crate::llm::testing::MockProvider;
    use crate::orgs::NewOrg;
    use crate::rag::SqliteVectorStore;

    struct Harness {
        pipeline: IngestPipeline,
        documents: DocumentStore,
        orgs: OrgStore,
        store: Arc<SqliteVectorStore>,
        provider: Arc<MockProvider>,
        dir: tempfile::TempDir,
    }

    async fn harness() -> Harness {
        harness_with(MockProvider::default(), LlmSettings::default()).await
    }

    async fn harness_with(provider: MockProvider, llm_settings: LlmSettings) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let documents = DocumentStore::new(dir.path().join("core.db")).await.unwrap();
        let orgs = OrgStore::new(dir.path().join("core.db")).await.unwrap();
        let store = Arc::new(
            SqliteVectorStore::with_path(dir.path().join("vectors.db"))
                .await
                .unwrap(),
        );
        let provider = Arc::new(provider);
        let llm = LlmService::new(provider.clone(), llm_settings);

        let pipeline = IngestPipeline::new(
            documents.clone(),
            orgs.clone(),
            store.clone(),
            llm,
            RagSettings::default(),
            dir.path().to_path_buf(),
        );

        Harness {
            pipeline,
            documents,
            orgs,
            store,
            provider,
            dir,
        }
    }

    async fn register_upload(h: &Harness, filename: &str, org_slug: Option<&str>) {
        h.documents
            .create(NewDocument {
                filename: filename.to_string(),
                original_name: filename.to_string(),
                file_size: 1,
                mime_type: "application/pdf".to_string(),
                org_id: None,
                org_slug: org_slug.map(|s| s.to_string()),
                storage_path: None,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn two_page_pdf_lands_tagged_and_completed() {
        let h = harness().await;
        h.orgs
            .create(NewOrg {
                url: "acme".to_string(),
                display_name: "Acme Corp".to_string(),
                industry: None,
                customer_segments: None,
                llm_context: None,
                icon_url: None,
            })
            .await
            .unwrap();

        let filename = "manual.pdf";
        let page_one = "rocket assembly instructions ".repeat(40);
        let page_two = "fuel handling procedures ".repeat(40);
        test_pdf::write_pdf(&h.dir.path().join(filename), &[&page_one, &page_two]);
        register_upload(&h, filename, Some("acme")).await;

        let report = h.pipeline.ingest(filename, Some("acme")).await.unwrap();
        assert!(report.chunks_written >= 2);

        let doc = h.documents.get_by_filename(filename).await.unwrap().unwrap();
        assert_eq!(doc.status, DocumentStatus::Completed);
        assert_eq!(doc.chunks_processed, Some(report.chunks_written as i64));

        // chunk count on the row equals chunks actually persisted
        assert_eq!(
            h.store.count(Some("acme")).await.unwrap(),
            report.chunks_written
        );

        // every chunk carries the tenant and a page, and is linked back
        let results = h
            .store
            .search(&crate::llm::testing::embedding_for("rocket"), 100, Some("acme"))
            .await
            .unwrap();
        let mut pages_seen = std::collections::HashSet::new();
        for result in &results {
            let chunk = &result.chunk;
            assert_eq!(chunk.org_slug.as_deref(), Some("acme"));
            assert_eq!(chunk.source, filename);
            assert_eq!(chunk.document_id.as_deref(), Some(doc.id.as_str()));
            let metadata = chunk.metadata.as_ref().unwrap();
            let page = metadata.get("page").and_then(|v| v.as_u64()).unwrap();
            pages_seen.insert(page);
            assert!(metadata.get("orgUrl").unwrap().as_str() == Some("acme"));
        }
        assert_eq!(pages_seen, [1u64, 2u64].into_iter().collect());
    }

    #[tokio::test]
    async fn empty_pdf_always_fails_with_a_message() {
        let h = harness().await;
        let filename = "empty.pdf";
        test_pdf::write_pdf(&h.dir.path().join(filename), &[]);
        register_upload(&h, filename, None).await;

        for _ in 0..2 {
            let err = h.pipeline.ingest(filename, None).await.unwrap_err();
            assert!(matches!(err, ApiError::Pipeline(_)));

            let doc = h.documents.get_by_filename(filename).await.unwrap().unwrap();
            assert_eq!(doc.status, DocumentStatus::Failed);
            let message = doc.error_message.unwrap();
            assert!(!message.is_empty());
            assert!(message.contains("no content found"));
        }
        assert_eq!(h.store.count(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unparseable_file_fails_the_document() {
        let h = harness().await;
        let filename = "broken.pdf";
        std::fs::write(h.dir.path().join(filename), b"definitely not a pdf").unwrap();
        register_upload(&h, filename, None).await;

        let err = h.pipeline.ingest(filename, None).await.unwrap_err();
        assert!(matches!(err, ApiError::Pipeline(_)));

        let doc = h.documents.get_by_filename(filename).await.unwrap().unwrap();
        assert_eq!(doc.status, DocumentStatus::Failed);
        assert!(doc.error_message.unwrap().contains("failed to load PDF"));
    }

    #[tokio::test]
    async fn unknown_document_is_not_found() {
        let h = harness().await;
        let err = h.pipeline.ingest("ghost.pdf", None).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn blank_filename_is_rejected() {
        let h = harness().await;
        let err = h.pipeline.ingest("  ", None).await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn reingest_replaces_chunks_instead_of_duplicating() {
        let h = harness().await;
        let filename = "report.pdf";
        let text = "quarterly figures and commentary ".repeat(50);
        test_pdf::write_pdf(&h.dir.path().join(filename), &[&text]);
        register_upload(&h, filename, Some("acme")).await;

        let first = h.pipeline.ingest(filename, Some("acme")).await.unwrap();
        let second = h.pipeline.ingest(filename, Some("acme")).await.unwrap();
        assert_eq!(first.chunks_written, second.chunks_written);
        assert_eq!(
            h.store.count(Some("acme")).await.unwrap(),
            second.chunks_written
        );

        let doc = h.documents.get_by_filename(filename).await.unwrap().unwrap();
        assert_eq!(doc.status, DocumentStatus::Completed);
    }

    #[tokio::test]
    async fn unknown_org_slug_still_tags_chunks_with_it() {
        // tenant resolution is best-effort at ingestion; the slug in
        // the request is what retrieval will filter on later
        let h = harness().await;
        let filename = "untracked-org.pdf";
        let text = "content for a yet-unregistered tenant ".repeat(40);
        test_pdf::write_pdf(&h.dir.path().join(filename), &[&text]);
        register_upload(&h, filename, Some("newco")).await;

        h.pipeline.ingest(filename, Some("newco")).await.unwrap();
        assert!(h.store.count(Some("newco")).await.unwrap() > 0);

        let results = h
            .store
            .search(&crate::llm::testing::embedding_for("content"), 10, Some("newco"))
            .await
            .unwrap();
        let metadata = results[0].chunk.metadata.as_ref().unwrap();
        assert!(metadata.get("orgId").unwrap().is_null());
    }

    #[tokio::test]
    async fn embedding_failure_marks_the_document_failed() {
        let provider = MockProvider {
            fail_embed: true,
            ..MockProvider::default()
        };
        let settings = LlmSettings {
            max_retries: 0,
            ..LlmSettings::default()
        };
        let h = harness_with(provider, settings).await;

        let filename = "doomed.pdf";
        test_pdf::write_pdf(&h.dir.path().join(filename), &["some extractable text here"]);
        register_upload(&h, filename, None).await;

        let err = h.pipeline.ingest(filename, None).await.unwrap_err();
        assert!(matches!(err, ApiError::Upstream(_)));

        let doc = h.documents.get_by_filename(filename).await.unwrap().unwrap();
        assert_eq!(doc.status, DocumentStatus::Failed);
        assert!(doc.error_message.unwrap().contains("mock embed failure"));
        assert_eq!(h.provider.embed_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.store.count(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn second_ingest_of_same_file_is_rejected_while_running() {
        let h = harness().await;
        let slot = h.pipeline.acquire_slot("busy.pdf").unwrap();

        let err = h.pipeline.acquire_slot("busy.pdf").unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));

        drop(slot);
        assert!(h.pipeline.acquire_slot("busy.pdf").is_ok());
    }
}
