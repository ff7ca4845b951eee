//! HTTP clients for OpenAI-compatible `/embeddings` and `/chat/completions` endpoints.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tiktoken_rs::CoreBPE;
use tracing::debug;

use docrag_core::traits::{CompletionProvider, EmbeddingProvider};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Deserialize)]
struct EmbedData {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

fn http_client() -> Result<reqwest::Client> { Ok(reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?) }

async fn post_json<B: Serialize + ?Sized, R: for<'de> Deserialize<'de>>(client: &reqwest::Client, url: &str, api_key: &str, body: &B) -> Result<R> {
    let response = client.post(url).bearer_auth(api_key).json(body).send().await?;
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(anyhow!("HTTP {} from {}: {}", status, url, text));
    }
    Ok(response.json::<R>().await?)
}

pub struct OpenAiEmbeddingProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    dimension: usize,
    bpe: Arc<CoreBPE>,
}

impl OpenAiEmbeddingProvider {
    pub fn new(api_base: &str, api_key: impl Into<String>, model: impl Into<String>, dimension: usize) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            endpoint: format!("{}/embeddings", api_base.trim_end_matches('/')),
            api_key: api_key.into(),
            model: model.into(),
            dimension,
            bpe: Arc::new(tiktoken_rs::cl100k_base()?),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    fn name(&self) -> &str { "openai" }
    fn model(&self) -> &str { &self.model }
    fn dimension(&self) -> usize { self.dimension }
    fn count_tokens(&self, text: &str) -> usize { self.bpe.encode_with_special_tokens(text).len() }

    async fn create_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        // Only the v3 models accept a requested output size.
        let dimensions = self.model.starts_with("text-embedding-3").then_some(self.dimension);
        let request = EmbedRequest { model: &self.model, input: texts, dimensions };
        let mut response: EmbedResponse = post_json(&self.client, &self.endpoint, &self.api_key, &request).await?;
        response.data.sort_by_key(|d| d.index);
        debug!(model = %self.model, inputs = texts.len(), "OpenAI embeddings received");
        Ok(response.data.into_iter().map(|d| d.embedding).collect())
    }
}

/// Chat completion client. The prompt is sent as a single user message, so
/// any system instructions must already be part of it.
pub struct OpenAiCompletionProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl OpenAiCompletionProvider {
    pub fn new(api_base: &str, api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            endpoint: format!("{}/chat/completions", api_base.trim_end_matches('/')),
            api_key: api_key.into(),
            model: model.into(),
        })
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompletionProvider {
    fn name(&self) -> &str { "openai" }

    async fn complete(&self, prompt: &str, max_tokens: u32, temperature: f32) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage { role: "user", content: prompt }],
            max_tokens,
            temperature,
        };
        let response: ChatResponse = post_json(&self.client, &self.endpoint, &self.api_key, &request).await?;
        debug!(model = %self.model, prompt_chars = prompt.len(), "Completion received");
        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("completion response had no content"))
    }
}
