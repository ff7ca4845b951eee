//! Cross-encoder reranking with neutral and unranked fallbacks.

pub mod cross_encoder;
pub mod metrics;
pub mod reranker;

pub use cross_encoder::CandleCrossEncoder;
pub use metrics::{improvement_metrics, RerankMetrics};
pub use reranker::{truncate_text, RerankOutcome, RerankStatus, Reranker, RerankerInfo, NEUTRAL_SCORE};
