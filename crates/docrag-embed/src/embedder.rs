//! Provider-agnostic embedding service: preparation, token budget, batching,
//! retry with exponential backoff and dimension checks.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use docrag_core::chunker::normalize_whitespace;
use docrag_core::config::{ChunkingSettings, EmbeddingSettings};
use docrag_core::error::{Error, Result};
use docrag_core::traits::EmbeddingProvider;
use docrag_core::types::{Chunk, EmbeddedChunk};

#[derive(Debug, Clone, PartialEq)]
pub struct EmbedderOptions {
    pub batch_size: usize,
    pub max_tokens: usize,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub inter_batch_delay: Duration,
    pub min_text_chars: usize,
}

impl Default for EmbedderOptions {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_tokens: 8000,
            max_retries: 3,
            retry_base_delay: Duration::from_secs(1),
            inter_batch_delay: Duration::from_millis(100),
            min_text_chars: 10,
        }
    }
}

impl EmbedderOptions {
    pub fn from_settings(embedding: &EmbeddingSettings, chunking: &ChunkingSettings) -> Self {
        Self {
            batch_size: embedding.batch_size.max(1),
            max_tokens: embedding.max_tokens,
            max_retries: embedding.max_retries,
            retry_base_delay: Duration::from_millis(embedding.retry_base_delay_ms),
            inter_batch_delay: Duration::from_millis(embedding.inter_batch_delay_ms),
            min_text_chars: chunking.min_chunk_chars,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CostEstimate {
    pub model: String,
    pub total_tokens: usize,
    pub estimated_cost_usd: f64,
}

/// USD per million input tokens.
pub fn price_per_million_tokens(model: &str) -> f64 {
    match model {
        "text-embedding-3-small" => 0.02,
        "text-embedding-3-large" => 0.13,
        "text-embedding-ada-002" => 0.10,
        _ => 0.0,
    }
}

pub struct Embedder {
    provider: Arc<dyn EmbeddingProvider>,
    options: EmbedderOptions,
    dimension: usize,
}

impl Embedder {
    /// `dimension` is the size every vector must have; it is fixed per index.
    pub fn new(provider: Arc<dyn EmbeddingProvider>, options: EmbedderOptions, dimension: usize) -> Self {
        if provider.dimension() != dimension {
            warn!(provider = provider.name(), provider_dim = provider.dimension(), configured_dim = dimension, "Provider dimension differs from configured dimension");
        }
        Self { provider, options, dimension }
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> { &self.provider }
    pub fn options(&self) -> &EmbedderOptions { &self.options }
    pub fn dimension(&self) -> usize { self.dimension }
    pub fn model(&self) -> &str { self.provider.model() }

    /// Whitespace-normalizes texts and drops those shorter than the minimum length.
    pub fn prepare_texts(&self, texts: &[String]) -> Vec<String> {
        texts
            .iter()
            .map(|t| normalize_whitespace(t))
            .filter(|t| t.chars().count() >= self.options.min_text_chars)
            .collect()
    }

    /// Longest whole-word prefix of `text` within the token ceiling. When not
    /// even the first word fits, that word is cut by characters instead.
    pub fn truncate_to_budget(&self, text: &str) -> String {
        let max = self.options.max_tokens;
        if self.provider.count_tokens(text) <= max {
            return text.to_string();
        }
        let words: Vec<&str> = text.split_whitespace().collect();
        let fits = |n: usize| self.provider.count_tokens(&words[..n].join(" ")) <= max;
        let (mut lo, mut hi) = (0usize, words.len());
        while lo < hi {
            let mid = (lo + hi).div_ceil(2);
            if fits(mid) { lo = mid } else { hi = mid - 1 }
        }
        if lo == 0 {
            return self.truncate_chars(words.first().copied().unwrap_or_default());
        }
        debug!(kept_words = lo, total_words = words.len(), max_tokens = max, "Truncated text to token budget");
        words[..lo].join(" ")
    }

    /// Longest character prefix of `word` within the token ceiling, never empty.
    fn truncate_chars(&self, word: &str) -> String {
        let chars: Vec<char> = word.chars().collect();
        let fits = |n: usize| self.provider.count_tokens(&chars[..n].iter().collect::<String>()) <= self.options.max_tokens;
        let (mut lo, mut hi) = (1usize.min(chars.len()), chars.len());
        while lo < hi {
            let mid = (lo + hi).div_ceil(2);
            if fits(mid) { lo = mid } else { hi = mid - 1 }
        }
        debug!(kept_chars = lo, word_chars = chars.len(), max_tokens = self.options.max_tokens, "Cut oversized word to token budget");
        chars[..lo].iter().collect()
    }

    /// One vector per input text, in input order. Fails as a whole if any batch fails.
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let truncated: Vec<String> = texts.iter().map(|t| self.truncate_to_budget(t)).collect();
        self.embed_truncated(&truncated).await
    }

    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| Error::external(self.provider.name(), "no embedding returned"))
    }

    /// Embeds the chunks whose text survives preparation and attaches model and token count.
    pub async fn create_embeddings_with_metadata(&self, chunks: &[Chunk]) -> Result<Vec<EmbeddedChunk>> {
        let mut kept = Vec::with_capacity(chunks.len());
        let mut texts = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let cleaned = normalize_whitespace(&chunk.text);
            if cleaned.chars().count() < self.options.min_text_chars {
                debug!(chunk_id = %chunk.id(), chars = cleaned.len(), "Skipping chunk below minimum length");
                continue;
            }
            texts.push(self.truncate_to_budget(&cleaned));
            kept.push(chunk);
        }

        let vectors = self.embed_truncated(&texts).await?;
        let model = self.provider.model().to_string();
        Ok(kept
            .into_iter()
            .zip(texts.iter().zip(vectors))
            .map(|(chunk, (text, embedding))| EmbeddedChunk {
                chunk: chunk.clone(),
                embedding,
                embedding_model: model.clone(),
                token_count: self.provider.count_tokens(text),
            })
            .collect())
    }

    pub fn estimate_cost(&self, texts: &[String]) -> CostEstimate {
        let total_tokens: usize = texts.iter().map(|t| self.provider.count_tokens(t)).sum();
        #[allow(clippy::cast_precision_loss)]
        let estimated_cost_usd = total_tokens as f64 / 1_000_000.0 * price_per_million_tokens(self.provider.model());
        CostEstimate { model: self.provider.model().to_string(), total_tokens, estimated_cost_usd }
    }

    async fn embed_truncated(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let batches = texts.len().div_ceil(self.options.batch_size);
        let mut out = Vec::with_capacity(texts.len());
        for (i, batch) in texts.chunks(self.options.batch_size).enumerate() {
            if i > 0 && !self.options.inter_batch_delay.is_zero() {
                tokio::time::sleep(self.options.inter_batch_delay).await;
            }
            let vectors = self.embed_batch_with_retry(batch).await?;
            self.check_batch(batch.len(), &vectors)?;
            out.extend(vectors);
            debug!(batch = i + 1, batches, "Embedded batch");
        }
        info!(provider = self.provider.name(), texts = texts.len(), batches, "Embeddings created");
        Ok(out)
    }

    async fn embed_batch_with_retry(&self, batch: &[String]) -> Result<Vec<Vec<f32>>> {
        let attempts = self.options.max_retries.max(1);
        let mut last_error = None;
        for attempt in 0..attempts {
            match self.provider.create_embeddings(batch).await {
                Ok(vectors) => return Ok(vectors),
                Err(e) => {
                    warn!(provider = self.provider.name(), attempt = attempt + 1, attempts, error = %e, "Embedding batch failed");
                    last_error = Some(e);
                    if attempt + 1 < attempts {
                        tokio::time::sleep(backoff(self.options.retry_base_delay, attempt)).await;
                    }
                }
            }
        }
        let cause = last_error.map_or_else(|| "no attempt made".to_string(), |e| format!("{e:#}"));
        Err(Error::external(self.provider.name(), format!("embedding failed after {attempts} attempts: {cause}")))
    }

    /// Count and dimension problems are configuration errors, so they are not retried.
    fn check_batch(&self, expected: usize, vectors: &[Vec<f32>]) -> Result<()> {
        if vectors.len() != expected {
            return Err(Error::external(
                self.provider.name(),
                format!("returned {} vectors for {} inputs", vectors.len(), expected),
            ));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(Error::DimensionMismatch { expected: self.dimension, actual: bad.len() });
        }
        Ok(())
    }
}

/// `base * 2^attempt`, saturating instead of overflowing.
pub fn backoff(base: Duration, attempt: u32) -> Duration {
    base.checked_mul(2u32.saturating_pow(attempt)).unwrap_or(Duration::MAX)
}
