//! bge-reranker style cross-encoder on candle.

use std::path::Path;
use std::time::Instant;

use anyhow::{anyhow, Result};
use candle_core::{DType, Device};
use candle_transformers::models::xlm_roberta::XLMRobertaForSequenceClassification;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use docrag_core::traits::CrossEncoder;
use docrag_embed::local::ModelFiles;
use docrag_embed::tokenize::{encode_batch, limit_length, pad_id};

pub struct CandleCrossEncoder {
    model: XLMRobertaForSequenceClassification,
    tokenizer: Tokenizer,
    device: Device,
    max_len: usize,
    pad_id: u32,
    name: String,
}

impl CandleCrossEncoder {
    pub fn load(model_dir: &Path, model_name: &str, max_len: usize) -> Result<Self> {
        info!(model = model_name, dir = %model_dir.display(), "Loading cross-encoder");
        let mut files = ModelFiles::load(model_dir)?;
        let max_len = files.max_len(max_len);
        limit_length(&mut files.tokenizer, max_len)?;
        let model = XLMRobertaForSequenceClassification::new(1, &files.config, files.vb)?;
        let pad_id = pad_id(&files.tokenizer);
        Ok(Self { model, tokenizer: files.tokenizer, device: files.device, max_len, pad_id, name: model_name.to_string() })
    }
}

impl CrossEncoder for CandleCrossEncoder {
    fn name(&self) -> &str { &self.name }

    fn predict(&self, pairs: &[(String, String)]) -> Result<Vec<f32>> {
        if pairs.is_empty() {
            return Ok(Vec::new());
        }
        let start = Instant::now();
        let inputs: Vec<(&str, &str)> = pairs.iter().map(|(q, d)| (q.as_str(), d.as_str())).collect();
        let batch = encode_batch(&self.tokenizer, inputs, self.max_len, self.pad_id, &self.device)?;
        let logits = self.model.forward(&batch.input_ids, &batch.attention_mask, &batch.token_type_ids)?;
        // [B, 1] logits -> [B] probabilities.
        let probs = candle_nn::ops::sigmoid(&logits.to_dtype(DType::F32)?.squeeze(1)?)?;
        let scores: Vec<f32> = probs.to_device(&Device::Cpu)?.to_vec1()?;
        if scores.len() != pairs.len() {
            return Err(anyhow!("cross-encoder returned {} scores for {} pairs", scores.len(), pairs.len()));
        }
        debug!(pairs = pairs.len(), elapsed_ms = start.elapsed().as_millis(), "Cross-encoder batch");
        Ok(scores)
    }
}
