//! Tantivy BM25 keyword index used by hybrid retrieval.

pub mod index;
pub mod tantivy_utils;

pub use index::TantivyKeywordIndex;
