use std::sync::RwLock;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use docrag_core::filter::Filter;
use docrag_core::traits::VectorIndex;
use docrag_core::types::{DeleteSelector, IndexRecord, Meta, SearchCandidate};

/// In-process cosine index for tests and single-run pipelines.
pub struct MemoryVectorIndex {
    dimension: usize,
    records: RwLock<Vec<IndexRecord>>,
}

impl MemoryVectorIndex {
    pub fn new(dimension: usize) -> Self { Self { dimension, records: RwLock::new(Vec::new()) } }

    pub fn len(&self) -> usize { self.records.read().map(|r| r.len()).unwrap_or(0) }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut na, mut nb) = (0f32, 0f32, 0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    let denom = na.sqrt() * nb.sqrt();
    if denom <= f32::EPSILON { 0.0 } else { dot / denom }
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn upsert(&self, records: &[IndexRecord]) -> Result<usize> {
        if let Some(bad) = records.iter().find(|r| r.vector.len() != self.dimension) {
            bail!("record {} has dimension {}, index expects {}", bad.id, bad.vector.len(), self.dimension);
        }
        let mut stored = self.records.write().map_err(|_| anyhow!("vector index lock poisoned"))?;
        for record in records {
            match stored.iter_mut().find(|r| r.id == record.id) {
                Some(existing) => *existing = record.clone(),
                None => stored.push(record.clone()),
            }
        }
        Ok(records.len())
    }

    async fn query(&self, vector: &[f32], top_k: usize, filter: &Filter, include_metadata: bool) -> Result<Vec<SearchCandidate>> {
        if vector.len() != self.dimension {
            bail!("query vector has dimension {}, index expects {}", vector.len(), self.dimension);
        }
        let stored = self.records.read().map_err(|_| anyhow!("vector index lock poisoned"))?;
        let mut hits: Vec<SearchCandidate> = stored
            .iter()
            .filter(|r| filter.matches(&r.metadata))
            .map(|r| {
                let metadata = if include_metadata { r.metadata.clone() } else { Meta::new() };
                SearchCandidate::new(r.id.clone(), cosine(vector, &r.vector), metadata)
            })
            .collect();
        // Stable: ties keep insertion order.
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn delete(&self, selector: &DeleteSelector) -> Result<usize> {
        let mut stored = self.records.write().map_err(|_| anyhow!("vector index lock poisoned"))?;
        let before = stored.len();
        match selector {
            DeleteSelector::Ids(ids) => stored.retain(|r| !ids.contains(&r.id)),
            DeleteSelector::Filter(filter) if filter.is_empty() => return Ok(0),
            DeleteSelector::Filter(filter) => stored.retain(|r| !filter.matches(&r.metadata)),
        }
        Ok(before - stored.len())
    }
}
