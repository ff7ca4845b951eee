//! Capability interfaces for the collaborators the pipeline talks to.
//!
//! Every trait is object safe and `Send + Sync` so implementations can sit
//! behind `Arc<dyn _>` and be swapped for deterministic fakes in tests.

use async_trait::async_trait;

use crate::filter::Filter;
use crate::types::{DeleteSelector, IndexRecord, SearchCandidate};

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Provider name used in error messages and logs.
    fn name(&self) -> &str;
    fn model(&self) -> &str;
    fn dimension(&self) -> usize;

    /// Token count under the provider's tokenizer. The default is the common
    /// four-characters-per-token estimate.
    fn count_tokens(&self, text: &str) -> usize { text.chars().count().div_ceil(4) }

    async fn create_embeddings(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn complete(&self, prompt: &str, max_tokens: u32, temperature: f32) -> anyhow::Result<String>;
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Inserts or replaces records by id. Returns the number written.
    async fn upsert(&self, records: &[IndexRecord]) -> anyhow::Result<usize>;

    /// Nearest neighbours of `vector` that satisfy `filter`, best first.
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &Filter,
        include_metadata: bool,
    ) -> anyhow::Result<Vec<SearchCandidate>>;

    /// Returns the number of records removed.
    async fn delete(&self, selector: &DeleteSelector) -> anyhow::Result<usize>;
}

pub trait CrossEncoder: Send + Sync {
    fn name(&self) -> &str;

    /// One relevance score per `(query, document)` pair, in input order.
    fn predict(&self, pairs: &[(String, String)]) -> anyhow::Result<Vec<f32>>;
}

pub trait KeywordIndex: Send + Sync {
    fn index(&self, records: &[IndexRecord]) -> anyhow::Result<usize>;
    fn search(&self, query: &str, top_k: usize, filter: &Filter) -> anyhow::Result<Vec<SearchCandidate>>;
    fn delete(&self, selector: &DeleteSelector) -> anyhow::Result<usize>;
}
