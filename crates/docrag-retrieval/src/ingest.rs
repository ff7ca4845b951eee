//! Document ingestion: extract, chunk, embed and index under an owner scope.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use docrag_core::chunker::Chunker;
use docrag_core::config::Settings;
use docrag_core::data_processor::{DataProcessor, ExtractedDocument};
use docrag_core::error::{Error, Result};
use docrag_core::filter::Filter;
use docrag_core::traits::{KeywordIndex, VectorIndex};
use docrag_core::types::{ChunkId, DeleteSelector, IndexRecord};
use docrag_embed::Embedder;

use crate::jobs::{JobId, JobRegistry, JobStatus};

/// Upper bound on the chunks looked up when replacing a document.
const MAX_CHUNKS_PER_DOCUMENT: usize = 100_000;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentOutcome {
    pub document: String,
    pub doc_id: Option<String>,
    pub job_id: JobId,
    pub chunks: usize,
    pub error: Option<String>,
}

impl DocumentOutcome {
    pub fn is_success(&self) -> bool { self.error.is_none() }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    pub documents: Vec<DocumentOutcome>,
}

impl IngestReport {
    pub fn succeeded(&self) -> usize { self.documents.iter().filter(|d| d.is_success()).count() }
    pub fn failed(&self) -> usize { self.documents.len() - self.succeeded() }
    pub fn total_chunks(&self) -> usize { self.documents.iter().map(|d| d.chunks).sum() }
}

pub struct Ingestor {
    processor: DataProcessor,
    chunker: Chunker,
    embedder: Arc<Embedder>,
    index: Arc<dyn VectorIndex>,
    keyword: Option<Arc<dyn KeywordIndex>>,
    jobs: Arc<JobRegistry>,
    scope_field: String,
}

impl Ingestor {
    pub fn new(chunker: Chunker, embedder: Arc<Embedder>, index: Arc<dyn VectorIndex>, scope_field: impl Into<String>) -> Self {
        Self {
            processor: DataProcessor::new(),
            chunker,
            embedder,
            index,
            keyword: None,
            jobs: Arc::new(JobRegistry::new()),
            scope_field: scope_field.into(),
        }
    }

    pub fn from_settings(settings: &Settings, embedder: Arc<Embedder>, index: Arc<dyn VectorIndex>) -> Self {
        Self::new(Chunker::from_settings(&settings.chunking), embedder, index, settings.retrieval.scope_field.clone())
    }

    #[must_use]
    pub fn with_keyword_index(mut self, keyword: Arc<dyn KeywordIndex>) -> Self {
        self.keyword = Some(keyword);
        self
    }

    /// Shares a registry with other components, e.g. a status endpoint.
    #[must_use]
    pub fn with_jobs(mut self, jobs: Arc<JobRegistry>) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn jobs(&self) -> &Arc<JobRegistry> { &self.jobs }

    /// Supported files under `root`, for callers that size a progress bar first.
    pub fn list_files(&self, root: &Path) -> Vec<std::path::PathBuf> { self.processor.list_files(root) }

    /// Ingests every supported file under `root`. A failing document is
    /// recorded and the batch moves on.
    pub async fn ingest_path<F>(&self, root: &Path, scope_key: &str, mut on_document: F) -> IngestReport
    where
        F: FnMut(&DocumentOutcome),
    {
        let files = self.processor.list_files(root);
        info!(root = %root.display(), files = files.len(), "Starting ingestion");
        let mut report = IngestReport::default();
        for path in files {
            let outcome = self.ingest_file(&path, scope_key).await;
            on_document(&outcome);
            report.documents.push(outcome);
        }
        info!(succeeded = report.succeeded(), failed = report.failed(), chunks = report.total_chunks(), "Ingestion finished");
        report
    }

    /// Extracts and ingests one file, tracking it as a job.
    pub async fn ingest_file(&self, path: &Path, scope_key: &str) -> DocumentOutcome {
        let document = path.display().to_string();
        let job_id = self.jobs.create(&document);
        self.set_status(job_id, JobStatus::Processing, None, None);

        let mut doc_id = None;
        let result = match self.processor.extract(path) {
            Ok(extracted) => {
                doc_id = Some(extracted.meta.doc_id.clone());
                self.ingest_document(&extracted, scope_key).await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(chunks) => {
                self.set_status(job_id, JobStatus::Completed, Some(chunks), None);
                DocumentOutcome { document, doc_id, job_id, chunks, error: None }
            }
            Err(e) => {
                warn!(document = %document, error = %e, "Document ingestion failed");
                self.set_status(job_id, JobStatus::Failed, None, Some(e.to_string()));
                DocumentOutcome { document, doc_id, job_id, chunks: 0, error: Some(e.to_string()) }
            }
        }
    }

    /// Chunks, embeds and indexes an already extracted document, replacing any
    /// chunks previously stored for it under `scope_key`. Returns the number of
    /// chunks written. Page counts on `doc` drive page attribution.
    ///
    /// New chunks are written before stale ones are removed, so a failed write
    /// leaves the previous version searchable. The keyword index follows the
    /// vector index; when it cannot be updated the document stays vector-only
    /// and its old keyword entries are dropped.
    pub async fn ingest_document(&self, doc: &ExtractedDocument, scope_key: &str) -> Result<usize> {
        if scope_key.trim().is_empty() {
            return Err(Error::Validation("scope key must not be empty".into()));
        }
        let doc_id = doc.meta.doc_id.as_str();
        let chunk_set = self.chunker.chunk(&doc.text, &doc.meta, doc.pages.as_deref());
        if let Some(reason) = &chunk_set.fallback {
            warn!(doc_id, reason = %reason, "Chunking fell back to a single chunk");
        }

        let embedded = self.embedder.create_embeddings_with_metadata(&chunk_set.chunks).await?;
        let records = embedded
            .into_iter()
            .map(|e| e.into_record(&self.scope_field, scope_key))
            .collect::<Result<Vec<IndexRecord>>>()?;

        let document = Filter::new().eq("doc_id", doc_id).eq(self.scope_field.as_str(), scope_key);
        let previous = self.stored_ids(&document).await?;
        let written = if records.is_empty() {
            0
        } else {
            self.index.upsert(&records).await.map_err(|e| Error::external("vector-index", format!("{e:#}")))?
        };

        let fresh: HashSet<&str> = records.iter().map(|r| r.id.as_str()).collect();
        let stale: Vec<ChunkId> = previous.into_iter().filter(|id| !fresh.contains(id.as_str())).collect();
        if !stale.is_empty() {
            let removed = self
                .index
                .delete(&DeleteSelector::Ids(stale.clone()))
                .await
                .map_err(|e| Error::external("vector-index", format!("{e:#}")))?;
            debug!(doc_id, removed, "Removed previous chunks");
        }

        if let Some(keyword) = &self.keyword {
            let refreshed = keyword.index(&records).and_then(|_| {
                if stale.is_empty() {
                    Ok(0)
                } else {
                    keyword.delete(&DeleteSelector::Ids(stale))
                }
            });
            if let Err(e) = refreshed {
                warn!(doc_id, error = %e, "Keyword index update failed, document is vector-only");
                if let Err(e) = keyword.delete(&DeleteSelector::Filter(document)) {
                    warn!(doc_id, error = %e, "Could not drop outdated keyword entries");
                }
            }
        }

        info!(doc_id, filename = %doc.meta.source_filename, chunks = written, "Document indexed");
        Ok(written)
    }

    /// Ids already stored for one document, found with a zero query vector.
    async fn stored_ids(&self, document: &Filter) -> Result<Vec<ChunkId>> {
        let zero = vec![0.0f32; self.embedder.dimension()];
        let hits = self
            .index
            .query(&zero, MAX_CHUNKS_PER_DOCUMENT, document, false)
            .await
            .map_err(|e| Error::external("vector-index", format!("{e:#}")))?;
        Ok(hits.into_iter().map(|c| c.id).collect())
    }

    fn set_status(&self, id: JobId, status: JobStatus, chunks: Option<usize>, error: Option<String>) {
        if let Err(e) = self.jobs.update(id, status, chunks, error) {
            warn!(job = %id, error = %e, "Job status update failed");
        }
    }
}
