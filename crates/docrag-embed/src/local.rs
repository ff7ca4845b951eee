//! On-device sentence embeddings with an XLM-RoBERTa encoder (BGE-M3 family).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::{Config as XLMRobertaConfig, XLMRobertaModel};
use tokenizers::Tokenizer;
use tracing::{debug, info};

use docrag_core::traits::EmbeddingProvider;

use crate::device::select_device;
use crate::pool::masked_mean_l2;
use crate::tokenize::{encode_batch, limit_length, pad_id};

/// Encoder weights, tokenizer and device loaded from a model directory.
pub struct ModelFiles {
    pub tokenizer: Tokenizer,
    pub config: XLMRobertaConfig,
    pub raw_config: serde_json::Value,
    pub vb: VarBuilder<'static>,
    pub device: Device,
}

impl ModelFiles {
    /// Reads `tokenizer.json`, `config.json` and either `model.safetensors` or
    /// `pytorch_model.bin` from `model_dir`.
    pub fn load(model_dir: &Path) -> Result<Self> {
        let device = select_device();

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;

        let config_text = std::fs::read_to_string(model_dir.join("config.json"))?;
        let config: XLMRobertaConfig = serde_json::from_str(&config_text)?;
        let raw_config: serde_json::Value = serde_json::from_str(&config_text)?;

        let safetensors = model_dir.join("model.safetensors");
        let vb = if safetensors.exists() {
            // SAFETY: the weights file is memory-mapped read-only and not modified while loaded.
            unsafe { VarBuilder::from_mmaped_safetensors(&[safetensors], DType::F32, &device)? }
        } else {
            let weights = candle_core::pickle::read_all(model_dir.join("pytorch_model.bin"))?;
            let weights_map: std::collections::HashMap<String, candle_core::Tensor> = weights.into_iter().collect();
            VarBuilder::from_tensors(weights_map, DType::F32, &device)
        };
        Ok(Self { tokenizer, config, raw_config, vb, device })
    }

    /// Longest input the position embeddings allow, capped at `cap`.
    pub fn max_len(&self, cap: usize) -> usize {
        let positions = self.raw_config.get("max_position_embeddings").and_then(serde_json::Value::as_u64).unwrap_or(514);
        usize::try_from(positions.saturating_sub(2)).unwrap_or(cap).min(cap)
    }
}

struct LocalModel {
    model: XLMRobertaModel,
    tokenizer: Tokenizer,
    device: Device,
    max_len: usize,
    pad_id: u32,
}

impl LocalModel {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let start = Instant::now();
        let inputs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let batch = encode_batch(&self.tokenizer, inputs, self.max_len, self.pad_id, &self.device)?;
        let hidden = self.model.forward(&batch.input_ids, &batch.attention_mask, &batch.token_type_ids, None, None, None)?;
        let pooled = masked_mean_l2(&hidden, &batch.attention_mask)?;
        let vectors: Vec<Vec<f32>> = pooled.to_device(&Device::Cpu)?.to_dtype(DType::F32)?.to_vec2()?;
        debug!(texts = texts.len(), elapsed_ms = start.elapsed().as_millis(), "Local embedding batch");
        Ok(vectors)
    }
}

pub struct LocalEmbeddingProvider {
    inner: Arc<LocalModel>,
    model_name: String,
    dimension: usize,
}

impl LocalEmbeddingProvider {
    pub fn load(model_dir: &Path, model_name: &str) -> Result<Self> {
        info!(model = model_name, dir = %model_dir.display(), "Loading local embedding model");
        let mut files = ModelFiles::load(model_dir)?;
        let max_len = files.max_len(512);
        limit_length(&mut files.tokenizer, max_len)?;
        let dimension = files
            .raw_config
            .get("hidden_size")
            .and_then(serde_json::Value::as_u64)
            .and_then(|d| usize::try_from(d).ok())
            .ok_or_else(|| anyhow!("config.json has no hidden_size"))?;
        let model = XLMRobertaModel::new(&files.config, files.vb)?;
        let pad_id = pad_id(&files.tokenizer);
        info!(model = model_name, dimension, max_len, "Local embedding model loaded");
        Ok(Self {
            inner: Arc::new(LocalModel { model, tokenizer: files.tokenizer, device: files.device, max_len, pad_id }),
            model_name: model_name.to_string(),
            dimension,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbeddingProvider {
    fn name(&self) -> &str { "local" }
    fn model(&self) -> &str { &self.model_name }
    fn dimension(&self) -> usize { self.dimension }

    fn count_tokens(&self, text: &str) -> usize {
        self.inner.tokenizer.encode(text, false).map_or_else(|_| text.chars().count().div_ceil(4), |e| e.len())
    }

    async fn create_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let inner = Arc::clone(&self.inner);
        let texts = texts.to_vec();
        tokio::task::spawn_blocking(move || inner.embed(&texts))
            .await
            .map_err(|e| anyhow!("embedding task failed: {}", e))?
    }
}

/// Locates a model directory: the configured path, then `APP_MODEL_DIR`,
/// `MODEL_DIR`, then `models/<name>` relative to the working directory and its parent.
pub fn resolve_model_dir(configured: Option<&str>, model_name: &str) -> Result<PathBuf> {
    let candidates = configured
        .map(docrag_core::config::expand_path)
        .into_iter()
        .chain(std::env::var("APP_MODEL_DIR").ok().map(PathBuf::from))
        .chain(std::env::var("MODEL_DIR").ok().map(PathBuf::from))
        .chain([Path::new("models").join(model_name), Path::new("../models").join(model_name)]);
    for dir in candidates {
        if dir.exists() {
            info!(dir = %dir.display(), "Using model directory");
            return Ok(dir);
        }
    }
    Err(anyhow!("Could not locate model directory for '{}'", model_name))
}
