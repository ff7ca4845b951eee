use std::hash::Hasher;

use async_trait::async_trait;
use twox_hash::XxHash64;

use docrag_core::traits::EmbeddingProvider;

use crate::pool::l2_normalize;

/// Deterministic bag-of-words embeddings for tests and offline runs.
///
/// Each lowercased alphanumeric token lands in an xxhash bucket; texts that
/// share words get a positive cosine similarity.
#[derive(Debug, Clone)]
pub struct HashEmbeddingProvider {
    dimension: usize,
    model: String,
}

impl HashEmbeddingProvider {
    pub fn new(dimension: usize) -> Self { Self { dimension, model: format!("hash-{dimension}") } }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dimension];
        if self.dimension == 0 {
            return v;
        }
        for token in tokens(text) {
            let mut hasher = XxHash64::with_seed(0);
            hasher.write(token.as_bytes());
            let h = hasher.finish();
            #[allow(clippy::cast_possible_truncation)]
            let idx = (h % self.dimension as u64) as usize;
            #[allow(clippy::cast_precision_loss)]
            let weight = 0.5 + ((h >> 32) as f32 / u32::MAX as f32) * 0.5;
            v[idx] += weight;
        }
        l2_normalize(&mut v);
        v
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()).map(str::to_lowercase)
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    fn name(&self) -> &str { "hash" }
    fn model(&self) -> &str { &self.model }
    fn dimension(&self) -> usize { self.dimension }
    fn count_tokens(&self, text: &str) -> usize { text.split_whitespace().count() }

    async fn create_embeddings(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}
