//! Embedding providers and the batching/retry embedding service.

pub mod device;
pub mod embedder;
pub mod hashing;
pub mod local;
pub mod openai;
pub mod pool;
pub mod tokenize;

use std::sync::Arc;

use anyhow::{anyhow, Result};
use tracing::info;

use docrag_core::config::{EmbeddingBackend, Settings};
use docrag_core::traits::{CompletionProvider, EmbeddingProvider};

pub use device::select_device;
pub use embedder::{CostEstimate, Embedder, EmbedderOptions};
pub use hashing::HashEmbeddingProvider;
pub use local::{resolve_model_dir, LocalEmbeddingProvider};
pub use openai::{OpenAiCompletionProvider, OpenAiEmbeddingProvider};
pub use pool::{l2_normalize, masked_mean_l2};

/// API key from settings, falling back to `OPENAI_API_KEY`.
pub fn api_key(settings: &Settings) -> Result<String> {
    settings
        .embedding
        .api_key
        .clone()
        .or_else(|| std::env::var("OPENAI_API_KEY").ok())
        .ok_or_else(|| anyhow!("no API key configured (embedding.api_key or OPENAI_API_KEY)"))
}

/// `completion.api_key`, then the embedding key lookup.
pub fn completion_api_key(settings: &Settings) -> Result<String> {
    match &settings.completion.api_key {
        Some(key) => Ok(key.clone()),
        None => api_key(settings).map_err(|_| anyhow!("no API key configured (completion.api_key, embedding.api_key or OPENAI_API_KEY)")),
    }
}

pub fn build_completion_provider(settings: &Settings) -> Result<Arc<dyn CompletionProvider>> {
    let completion = &settings.completion;
    let provider = OpenAiCompletionProvider::new(&completion.api_base, completion_api_key(settings)?, completion.model.clone())?;
    info!(model = %completion.model, "Completion provider ready");
    Ok(Arc::new(provider))
}

pub fn build_provider(settings: &Settings) -> Result<Arc<dyn EmbeddingProvider>> {
    let embedding = &settings.embedding;
    let provider: Arc<dyn EmbeddingProvider> = match embedding.provider {
        EmbeddingBackend::Hash => Arc::new(HashEmbeddingProvider::new(embedding.dimension)),
        EmbeddingBackend::OpenAi => Arc::new(OpenAiEmbeddingProvider::new(
            &embedding.api_base,
            api_key(settings)?,
            embedding.model.clone(),
            embedding.dimension,
        )?),
        EmbeddingBackend::Local => {
            let dir = resolve_model_dir(embedding.model_dir.as_deref(), &embedding.model)?;
            Arc::new(LocalEmbeddingProvider::load(&dir, &embedding.model)?)
        }
    };
    info!(provider = provider.name(), model = provider.model(), "Embedding provider ready");
    Ok(provider)
}

/// Provider plus service wired from settings.
pub fn build_embedder(settings: &Settings) -> Result<Embedder> {
    let provider = build_provider(settings)?;
    let options = EmbedderOptions::from_settings(&settings.embedding, &settings.chunking);
    Ok(Embedder::new(provider, options, settings.embedding.dimension))
}
