use serde::Serialize;

use docrag_core::types::RerankedCandidate;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RerankMetrics {
    pub avg_original_score: f64,
    pub avg_reranked_score: f64,
    pub avg_improvement: f64,
    /// Pearson correlation; 0 when either side has no variance.
    pub correlation: f64,
    /// Share of the top five by original score that stay in the top five after reranking.
    pub top_k_overlap_ratio: f64,
    pub total_items: usize,
}

impl RerankMetrics {
    /// `None` when the lists are empty or differ in length.
    pub fn compute(original: &[f32], reranked: &[f32]) -> Option<Self> {
        if original.is_empty() || original.len() != reranked.len() {
            return None;
        }
        let a: Vec<f64> = original.iter().map(|&x| f64::from(x)).collect();
        let b: Vec<f64> = reranked.iter().map(|&x| f64::from(x)).collect();
        let (mean_a, mean_b) = (mean(&a), mean(&b));

        let top_k = a.len().min(5);
        let (top_a, top_b) = (top_indices(&a, top_k), top_indices(&b, top_k));
        let overlap = top_a.iter().filter(|i| top_b.contains(i)).count();

        #[allow(clippy::cast_precision_loss)]
        let top_k_overlap_ratio = overlap as f64 / top_k as f64;
        Some(Self {
            avg_original_score: mean_a,
            avg_reranked_score: mean_b,
            avg_improvement: mean_b - mean_a,
            correlation: pearson(&a, &b, mean_a, mean_b),
            top_k_overlap_ratio,
            total_items: a.len(),
        })
    }
}

/// Metrics over the candidates that carry a rerank score.
pub fn improvement_metrics(reranked: &[RerankedCandidate]) -> Option<RerankMetrics> {
    let (original, scores): (Vec<f32>, Vec<f32>) =
        reranked.iter().filter_map(|c| c.rerank_score.map(|s| (c.original_score, s))).unzip();
    RerankMetrics::compute(&original, &scores)
}

#[allow(clippy::cast_precision_loss)]
fn mean(xs: &[f64]) -> f64 { xs.iter().sum::<f64>() / xs.len() as f64 }

fn pearson(a: &[f64], b: &[f64], mean_a: f64, mean_b: f64) -> f64 {
    let cov: f64 = a.iter().zip(b).map(|(x, y)| (x - mean_a) * (y - mean_b)).sum();
    let var_a: f64 = a.iter().map(|x| (x - mean_a).powi(2)).sum();
    let var_b: f64 = b.iter().map(|y| (y - mean_b).powi(2)).sum();
    let denom = (var_a * var_b).sqrt();
    if denom <= f64::EPSILON { 0.0 } else { cov / denom }
}

fn top_indices(xs: &[f64], k: usize) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..xs.len()).collect();
    idx.sort_by(|&i, &j| xs[j].total_cmp(&xs[i]));
    idx.truncate(k);
    idx
}
