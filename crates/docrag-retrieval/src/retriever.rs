//! Two-stage retrieval: scoped vector search, optional keyword fusion,
//! cross-encoder reranking and citation building.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use docrag_core::config::Settings;
use docrag_core::error::{Error, Result};
use docrag_core::filter::Filter;
use docrag_core::traits::{KeywordIndex, VectorIndex};
use docrag_core::types::{meta_str, meta_u64, DeleteSelector, RerankedCandidate, RetrievalConfig, SearchCandidate, SourceCitation};
use docrag_embed::Embedder;
use docrag_rerank::Reranker;

use crate::citation::to_citation;
use crate::context::RetrievalContext;
use crate::fusion::fuse;
use crate::query::{preview, validate_query};

#[derive(Debug, Clone, PartialEq)]
pub struct RetrieverOptions {
    pub scope_field: String,
    pub rerank_enabled: bool,
    pub top_k_to_rerank: usize,
    pub snippet_chars: usize,
    pub context_budget_chars: usize,
    pub rrf_k: u32,
}

impl Default for RetrieverOptions {
    fn default() -> Self { Self::from_settings(&Settings::default()) }
}

impl RetrieverOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            scope_field: settings.retrieval.scope_field.clone(),
            rerank_enabled: settings.rerank.enabled,
            top_k_to_rerank: settings.rerank.top_k_to_rerank,
            snippet_chars: settings.retrieval.snippet_chars,
            context_budget_chars: settings.retrieval.context_budget_chars,
            rrf_k: settings.retrieval.rrf_k,
        }
    }
}

pub struct Retriever {
    embedder: Arc<Embedder>,
    index: Arc<dyn VectorIndex>,
    reranker: Arc<Reranker>,
    keyword: Option<Arc<dyn KeywordIndex>>,
    options: RetrieverOptions,
}

impl Retriever {
    pub fn new(embedder: Arc<Embedder>, index: Arc<dyn VectorIndex>, reranker: Arc<Reranker>, options: RetrieverOptions) -> Self {
        Self { embedder, index, reranker, keyword: None, options }
    }

    /// Attaches a keyword index used by hybrid requests and document deletion.
    #[must_use]
    pub fn with_keyword_index(mut self, keyword: Arc<dyn KeywordIndex>) -> Self {
        self.keyword = Some(keyword);
        self
    }

    pub fn options(&self) -> &RetrieverOptions { &self.options }
    pub fn embedder(&self) -> &Arc<Embedder> { &self.embedder }
    pub fn reranker(&self) -> &Arc<Reranker> { &self.reranker }

    /// Citations for `query` among the chunks owned by `scope_key`, best first.
    ///
    /// A rejected query gives an empty list. Embedding and index failures are
    /// returned as `Error::Retrieval`; reranking failures only cost ordering.
    pub async fn retrieve(&self, query: &str, scope_key: &str, config: &RetrievalConfig) -> Result<Vec<SourceCitation>> {
        config.validate()?;
        check_scope(scope_key)?;
        if !validate_query(query) {
            return Ok(Vec::new());
        }

        let vector = self
            .embedder
            .embed_one(query)
            .await
            .map_err(|e| Error::retrieval("query embedding failed", e))?;

        let rerank = config.rerank && self.options.rerank_enabled;
        // Fusion needs more than the final k from each list to reorder anything.
        let width = if rerank || config.hybrid_search { config.k.max(self.options.top_k_to_rerank) } else { config.k };
        let filter = Filter::scoped(config.filters.as_ref(), &self.options.scope_field, scope_key);

        let candidates = self.search(query, &vector, width, &filter, config.hybrid_search).await?;
        let found = candidates.len();
        let ranked = self.rank(query, candidates, config.k, rerank);

        let citations: Vec<SourceCitation> = ranked
            .iter()
            .filter(|c| config.threshold.map_or(true, |t| c.score() >= t))
            .map(|c| to_citation(c, self.options.snippet_chars))
            .collect();

        info!(
            query = %preview(query, 50),
            candidates = found,
            results = citations.len(),
            reranked = rerank,
            hybrid = config.hybrid_search,
            "Retrieval completed"
        );
        Ok(citations)
    }

    /// `retrieve` plus the formatted LLM context.
    pub async fn get_context(&self, query: &str, scope_key: &str, config: &RetrievalConfig) -> Result<RetrievalContext> {
        let citations = self.retrieve(query, scope_key, config).await?;
        Ok(RetrievalContext::new(query, citations, self.options.context_budget_chars))
    }

    /// Chunks of the given documents in document order, then chunk order.
    pub async fn search_by_document(&self, doc_ids: &[String], scope_key: &str, top_k: usize) -> Result<Vec<SourceCitation>> {
        check_scope(scope_key)?;
        if doc_ids.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }
        let documents = Filter::documents(doc_ids, &[]);
        let filter = Filter::scoped(Some(&documents), &self.options.scope_field, scope_key);
        let zero = vec![0.0f32; self.embedder.dimension()];

        let hits = self
            .index
            .query(&zero, top_k.saturating_mul(10), &filter, true)
            .await
            .map_err(|e| Error::retrieval("document search failed", Error::external("vector-index", format!("{e:#}"))))?;

        let order: HashMap<&str, usize> = doc_ids.iter().enumerate().map(|(i, id)| (id.as_str(), i)).collect();
        let mut chunks: Vec<RerankedCandidate> = hits.into_iter().map(RerankedCandidate::from).collect();
        chunks.sort_by_key(|c| {
            let doc = meta_str(&c.metadata, "doc_id").and_then(|d| order.get(d).copied()).unwrap_or(usize::MAX);
            (doc, meta_u64(&c.metadata, "chunk_index").unwrap_or(u64::MAX))
        });
        chunks.truncate(top_k);
        debug!(documents = doc_ids.len(), chunks = chunks.len(), "Document search completed");
        Ok(chunks.iter().map(|c| to_citation(c, self.options.snippet_chars)).collect())
    }

    /// Removes a document's chunks owned by `scope_key`. Returns the vector rows removed.
    pub async fn delete_document(&self, doc_id: &str, scope_key: &str) -> Result<usize> {
        check_scope(scope_key)?;
        let selector = DeleteSelector::Filter(Filter::new().eq("doc_id", doc_id).eq(self.options.scope_field.as_str(), scope_key));
        let removed = self
            .index
            .delete(&selector)
            .await
            .map_err(|e| Error::retrieval("document deletion failed", Error::external("vector-index", format!("{e:#}"))))?;
        if let Some(keyword) = &self.keyword {
            if let Err(e) = keyword.delete(&selector) {
                warn!(doc_id, error = %e, "Keyword index deletion failed");
            }
        }
        info!(doc_id, removed, "Document deleted");
        Ok(removed)
    }

    async fn search(&self, query: &str, vector: &[f32], width: usize, filter: &Filter, hybrid: bool) -> Result<Vec<SearchCandidate>> {
        let dense = self
            .index
            .query(vector, width, filter, true)
            .await
            .map_err(|e| Error::retrieval("vector search failed", Error::external("vector-index", format!("{e:#}"))))?;

        if !hybrid {
            return Ok(dense);
        }
        let Some(keyword) = &self.keyword else {
            debug!("Hybrid search requested without a keyword index, using vector results only");
            return Ok(dense);
        };
        match keyword.search(query, width, filter) {
            Ok(sparse) => {
                debug!(dense = dense.len(), sparse = sparse.len(), "Fusing vector and keyword results");
                let mut fused = fuse(&[dense, sparse], self.options.rrf_k);
                fused.truncate(width);
                Ok(fused)
            }
            Err(e) => {
                warn!(error = %e, "Keyword search failed, using vector results only");
                Ok(dense)
            }
        }
    }

    fn rank(&self, query: &str, candidates: Vec<SearchCandidate>, k: usize, rerank: bool) -> Vec<RerankedCandidate> {
        if !rerank || candidates.len() <= k {
            return candidates.into_iter().take(k).map(RerankedCandidate::from).collect();
        }
        let outcome = self.reranker.rerank_with_metadata(query, candidates, Some(k));
        if outcome.is_degraded() {
            warn!(status = ?outcome.status, "Reranking degraded, keeping index order");
        }
        // A degraded outcome is the untruncated input order.
        let mut ranked = outcome.into_value();
        ranked.truncate(k);
        ranked
    }
}

fn check_scope(scope_key: &str) -> Result<()> {
    if scope_key.trim().is_empty() {
        return Err(Error::Validation("scope key must not be empty".into()));
    }
    Ok(())
}
