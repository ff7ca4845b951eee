//! Domain types shared by the chunking, embedding, index and retrieval crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::filter::Filter;

pub type ChunkId = String;
pub type Meta = serde_json::Map<String, Value>;

pub const MIN_K: usize = 1;
pub const MAX_K: usize = 50;

/// Identity of a source document, carried into every chunk cut from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub doc_id: String,
    pub source_filename: String,
    pub file_type: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub extra: Meta,
}

impl DocumentMeta {
    pub fn new(doc_id: impl Into<String>, source_filename: impl Into<String>, file_type: impl Into<String>) -> Self {
        Self {
            doc_id: doc_id.into(),
            source_filename: source_filename.into(),
            file_type: file_type.into(),
            created_at: Utc::now(),
            extra: Meta::new(),
        }
    }

    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// Character count of one source page; only the relative sizes matter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    pub char_count: usize,
}

impl PageInfo {
    pub fn from_text(text: &str) -> Self { Self { char_count: text.chars().count() } }
}

/// Positional metadata of a chunk.
///
/// `start_char`/`end_char` are character offsets into the whitespace-normalized
/// document text. Unknown keys land in `extra` on deserialization, so metadata
/// read back from an index round-trips without loss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub doc_id: String,
    pub source_filename: String,
    pub file_type: String,
    pub chunk_index: usize,
    pub start_char: usize,
    pub end_char: usize,
    pub char_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Meta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    /// Stable index key: `<doc_id>:<chunk_index>`.
    pub fn id(&self) -> ChunkId { format!("{}:{}", self.metadata.doc_id, self.metadata.chunk_index) }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
    pub embedding_model: String,
    pub token_count: usize,
}

impl EmbeddedChunk {
    /// Flattens the chunk into an index record owned by `scope_key`.
    ///
    /// The scope entry is written last so nothing in the chunk's extra
    /// metadata can claim a different owner.
    pub fn into_record(self, scope_field: &str, scope_key: &str) -> Result<IndexRecord> {
        let id = self.chunk.id();
        let mut metadata = match serde_json::to_value(&self.chunk.metadata) {
            Ok(Value::Object(map)) => map,
            Ok(_) => return Err(Error::document(&self.chunk.metadata.doc_id, "chunk metadata is not an object")),
            Err(e) => return Err(Error::document(&self.chunk.metadata.doc_id, e)),
        };
        metadata.insert("text".into(), Value::String(self.chunk.text));
        metadata.insert("embedding_model".into(), Value::String(self.embedding_model));
        metadata.insert("token_count".into(), Value::from(self.token_count));
        metadata.insert(scope_field.to_string(), Value::String(scope_key.to_string()));
        Ok(IndexRecord { id, vector: self.embedding, metadata })
    }
}

/// A row written to a vector or keyword index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexRecord {
    pub id: ChunkId,
    pub vector: Vec<f32>,
    pub metadata: Meta,
}

impl IndexRecord {
    pub fn text(&self) -> &str { self.metadata.get("text").and_then(Value::as_str).unwrap_or("") }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeleteSelector {
    Ids(Vec<ChunkId>),
    Filter(Filter),
}

/// A coarse hit returned by an index. Higher `score` is closer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchCandidate {
    pub id: ChunkId,
    pub score: f32,
    pub metadata: Meta,
}

impl SearchCandidate {
    pub fn new(id: impl Into<ChunkId>, score: f32, metadata: Meta) -> Self { Self { id: id.into(), score, metadata } }
    pub fn text(&self) -> &str { meta_str(&self.metadata, "text").unwrap_or("") }
}

/// A candidate after the fine ranking stage.
///
/// `rerank_score` is `None` when no cross-encoder scored this candidate; the
/// vector score then stays authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RerankedCandidate {
    pub id: ChunkId,
    pub metadata: Meta,
    pub original_score: f32,
    pub rerank_score: Option<f32>,
}

impl RerankedCandidate {
    pub fn score(&self) -> f32 { self.rerank_score.unwrap_or(self.original_score) }
    pub fn score_improvement(&self) -> Option<f32> { self.rerank_score.map(|s| s - self.original_score) }
    pub fn text(&self) -> &str { meta_str(&self.metadata, "text").unwrap_or("") }
}

impl From<SearchCandidate> for RerankedCandidate {
    fn from(c: SearchCandidate) -> Self { Self { id: c.id, metadata: c.metadata, original_score: c.score, rerank_score: None } }
}

/// Externally visible retrieval result bound to one chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceCitation {
    pub document_id: String,
    pub filename: String,
    pub page_number: Option<u32>,
    pub chunk_index: usize,
    pub chunk_text: String,
    pub relevance_score: f32,
    pub snippet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Per-request retrieval options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub k: usize,
    pub rerank: bool,
    pub filters: Option<Filter>,
    pub threshold: Option<f32>,
    pub hybrid_search: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self { Self { k: 8, rerank: true, filters: None, threshold: None, hybrid_search: false } }
}

impl RetrievalConfig {
    #[must_use]
    pub fn with_k(mut self, k: usize) -> Self { self.k = k; self }
    #[must_use]
    pub fn with_rerank(mut self, rerank: bool) -> Self { self.rerank = rerank; self }
    #[must_use]
    pub fn with_threshold(mut self, threshold: f32) -> Self { self.threshold = Some(threshold); self }
    #[must_use]
    pub fn with_filters(mut self, filters: Filter) -> Self { self.filters = Some(filters); self }
    #[must_use]
    pub fn with_hybrid_search(mut self, hybrid: bool) -> Self { self.hybrid_search = hybrid; self }

    pub fn validate(&self) -> Result<()> {
        if !(MIN_K..=MAX_K).contains(&self.k) {
            return Err(Error::Validation(format!("k must be within {MIN_K}..={MAX_K}, got {}", self.k)));
        }
        if let Some(t) = self.threshold {
            if !(0.0..=1.0).contains(&t) {
                return Err(Error::Validation(format!("threshold must be within 0.0..=1.0, got {t}")));
            }
        }
        Ok(())
    }
}

pub fn meta_str<'a>(meta: &'a Meta, key: &str) -> Option<&'a str> { meta.get(key).and_then(Value::as_str) }

pub fn meta_u64(meta: &Meta, key: &str) -> Option<u64> {
    match meta.get(key)? {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
