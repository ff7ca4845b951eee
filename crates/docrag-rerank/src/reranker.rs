use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use docrag_core::config::RerankSettings;
use docrag_core::traits::CrossEncoder;
use docrag_core::types::{RerankedCandidate, SearchCandidate};
use docrag_embed::resolve_model_dir;

use crate::cross_encoder::CandleCrossEncoder;

/// Score given to every document when no cross-encoder is loaded.
pub const NEUTRAL_SCORE: f32 = 0.5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RerankStatus {
    /// Scores came from the cross-encoder.
    Reranked,
    /// No model is loaded.
    Neutral,
    /// Scoring failed; the input came back untouched.
    Unranked(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RerankOutcome<T> {
    pub value: T,
    pub status: RerankStatus,
}

impl<T> RerankOutcome<T> {
    pub fn is_degraded(&self) -> bool { self.status != RerankStatus::Reranked }
    pub fn into_value(self) -> T { self.value }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RerankerInfo {
    pub model_name: String,
    pub is_available: bool,
    pub batch_size: usize,
    pub max_length: usize,
}

pub struct Reranker {
    model: Option<Arc<dyn CrossEncoder>>,
    model_name: String,
    batch_size: usize,
    max_length: usize,
}

impl Reranker {
    pub fn new(model: Option<Arc<dyn CrossEncoder>>, batch_size: usize, max_length: usize) -> Self {
        let model_name = model.as_ref().map_or_else(|| "none".to_string(), |m| m.name().to_string());
        Self { model, model_name, batch_size: batch_size.max(1), max_length }
    }

    /// A reranker that hands out neutral scores.
    pub fn disabled() -> Self { Self::new(None, 16, 512) }

    /// Loads the configured cross-encoder. A missing or broken model is logged
    /// and leaves the reranker in neutral mode.
    pub fn from_settings(settings: &RerankSettings) -> Self {
        let model = if settings.enabled { load_cross_encoder(settings) } else { None };
        let mut reranker = Self::new(model, settings.batch_size, settings.max_length);
        reranker.model_name = settings.model.clone();
        reranker
    }

    pub fn is_available(&self) -> bool { self.model.is_some() }

    pub fn info(&self) -> RerankerInfo {
        RerankerInfo {
            model_name: self.model_name.clone(),
            is_available: self.is_available(),
            batch_size: self.batch_size,
            max_length: self.max_length,
        }
    }

    /// One score per document, same order as `documents`.
    pub fn rerank(&self, query: &str, documents: &[String]) -> RerankOutcome<Vec<f32>> {
        let Some(model) = &self.model else {
            warn!(documents = documents.len(), "Reranker model not available, returning neutral scores");
            return RerankOutcome { value: vec![NEUTRAL_SCORE; documents.len()], status: RerankStatus::Neutral };
        };
        if documents.is_empty() {
            return RerankOutcome { value: Vec::new(), status: RerankStatus::Reranked };
        }

        match self.score(model.as_ref(), query, documents) {
            Ok(scores) => {
                debug!(documents = documents.len(), "Reranking completed");
                RerankOutcome { value: scores, status: RerankStatus::Reranked }
            }
            Err(e) => {
                warn!(model = %self.model_name, error = %e, "Reranking failed, returning neutral scores");
                RerankOutcome { value: vec![NEUTRAL_SCORE; documents.len()], status: RerankStatus::Unranked(format!("{e:#}")) }
            }
        }
    }

    /// Attaches cross-encoder scores and sorts best first, keeping input order on ties.
    ///
    /// Without a model, or when scoring fails, the candidates come back in
    /// their original order with no `rerank_score`.
    pub fn rerank_with_metadata(
        &self,
        query: &str,
        candidates: Vec<SearchCandidate>,
        top_k: Option<usize>,
    ) -> RerankOutcome<Vec<RerankedCandidate>> {
        let unranked = |candidates: Vec<SearchCandidate>| candidates.into_iter().map(RerankedCandidate::from).collect::<Vec<_>>();
        if self.model.is_none() {
            return RerankOutcome { value: unranked(candidates), status: RerankStatus::Neutral };
        }
        if candidates.is_empty() {
            return RerankOutcome { value: Vec::new(), status: RerankStatus::Reranked };
        }

        let documents: Vec<String> = candidates.iter().map(|c| c.text().to_string()).collect();
        let outcome = self.rerank(query, &documents);
        if outcome.status != RerankStatus::Reranked {
            return RerankOutcome { value: unranked(candidates), status: outcome.status };
        }

        let mut reranked: Vec<RerankedCandidate> = candidates
            .into_iter()
            .zip(outcome.value)
            .map(|(c, score)| RerankedCandidate { rerank_score: Some(score), ..RerankedCandidate::from(c) })
            .collect();
        // sort_by is stable, so equal scores keep index order.
        reranked.sort_by(|a, b| b.score().total_cmp(&a.score()));
        reranked.truncate(top_k.unwrap_or(usize::MAX));
        info!(candidates = reranked.len(), "Candidates reranked");
        RerankOutcome { value: reranked, status: RerankStatus::Reranked }
    }

    /// `rerank_with_metadata` per query, in order. Extra lists on either side are ignored.
    pub fn batch_rerank(
        &self,
        queries: &[String],
        candidate_lists: Vec<Vec<SearchCandidate>>,
        top_k: Option<usize>,
    ) -> Vec<RerankOutcome<Vec<RerankedCandidate>>> {
        if queries.len() != candidate_lists.len() {
            warn!(queries = queries.len(), lists = candidate_lists.len(), "Query and candidate list counts differ");
        }
        queries
            .iter()
            .zip(candidate_lists)
            .map(|(query, candidates)| self.rerank_with_metadata(query, candidates, top_k))
            .collect()
    }

    fn score(&self, model: &dyn CrossEncoder, query: &str, documents: &[String]) -> anyhow::Result<Vec<f32>> {
        let mut scores = Vec::with_capacity(documents.len());
        for batch in documents.chunks(self.batch_size) {
            let pairs: Vec<(String, String)> =
                batch.iter().map(|d| (query.to_string(), truncate_text(d, self.max_length))).collect();
            let batch_scores = model.predict(&pairs)?;
            if batch_scores.len() != pairs.len() {
                anyhow::bail!("{} returned {} scores for {} pairs", model.name(), batch_scores.len(), pairs.len());
            }
            // A non-finite score ranks as irrelevant instead of sorting first.
            scores.extend(batch_scores.into_iter().map(|s| if s.is_finite() { s } else { 0.0 }));
        }
        Ok(scores)
    }
}

fn load_cross_encoder(settings: &RerankSettings) -> Option<Arc<dyn CrossEncoder>> {
    let loaded = resolve_model_dir(settings.model_dir.as_deref(), &settings.model)
        .and_then(|dir| CandleCrossEncoder::load(&dir, &settings.model, settings.max_length));
    match loaded {
        Ok(model) => {
            info!(model = %settings.model, "Reranker model loaded");
            Some(Arc::new(model))
        }
        Err(e) => {
            warn!(model = %settings.model, error = %e, "Reranker model unavailable, reranking disabled");
            None
        }
    }
}

/// Cuts `text` to `max_chars` characters and marks the cut with `...`.
///
/// The cut moves back to the last space when that space lies past 80% of
/// the limit.
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    let Some((byte_end, _)) = text.char_indices().nth(max_chars) else {
        return text.to_string();
    };
    let truncated = &text[..byte_end];
    match truncated.rfind(' ') {
        Some(b) if truncated[..b].chars().count() as f64 > max_chars as f64 * 0.8 => format!("{}...", &truncated[..b]),
        _ => format!("{truncated}..."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_untouched() {
        assert_eq!(truncate_text("hello world", 20), "hello world");
        assert_eq!(truncate_text("exactly", 7), "exactly");
    }

    #[test]
    fn cut_prefers_late_word_boundary() {
        // Space at char 9 of a 10-char limit: past 80%.
        assert_eq!(truncate_text("abcdefghi jklmnop", 10), "abcdefghi...");
        // Space at char 2: too far back, raw cut.
        assert_eq!(truncate_text("ab cdefghijklmnop", 10), "ab cdefghi...");
    }

    #[test]
    fn cut_counts_characters_not_bytes() {
        assert_eq!(truncate_text("ééééééé", 3), "ééé...");
    }
}
