//! Shared wiring for the `docrag-ingest` and `docrag-query` binaries.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use docrag_core::config::{resolve_with_base, Settings};
use docrag_core::traits::KeywordIndex;
use docrag_core::types::RetrievalConfig;
use docrag_embed::{build_completion_provider, build_embedder};
use docrag_rerank::Reranker;
use docrag_retrieval::{Answerer, Ingestor, Retriever, RetrieverOptions};
use docrag_text::TantivyKeywordIndex;
use docrag_vector::build_vector_index;

/// `RUST_LOG` when set, `info` otherwise.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

/// Pipeline components built once from settings.
pub struct App {
    pub settings: Settings,
    pub ingestor: Ingestor,
    pub retriever: Arc<Retriever>,
}

impl App {
    /// Relative paths in `settings` resolve against `base`.
    pub async fn build(settings: Settings, base: &Path) -> Result<Self> {
        let embedder = Arc::new(build_embedder(&settings)?);
        let index = build_vector_index(&settings, base).await?;
        let keyword: Arc<dyn KeywordIndex> = match &settings.text.index_dir {
            Some(dir) => Arc::new(TantivyKeywordIndex::open_or_create(&resolve_with_base(base, dir), &settings.retrieval.scope_field)?),
            None => Arc::new(TantivyKeywordIndex::in_ram(&settings.retrieval.scope_field)?),
        };
        let reranker = Arc::new(Reranker::from_settings(&settings.rerank));

        let ingestor = Ingestor::from_settings(&settings, embedder.clone(), index.clone()).with_keyword_index(keyword.clone());
        let retriever = Retriever::new(embedder, index, reranker, RetrieverOptions::from_settings(&settings)).with_keyword_index(keyword);
        info!(vector = ?settings.vector.backend, embedding = ?settings.embedding.provider, "Pipeline ready");
        Ok(Self { settings, ingestor, retriever: Arc::new(retriever) })
    }

    /// Built on demand so retrieval-only runs need no completion key.
    pub fn answerer(&self) -> Result<Answerer> {
        let llm = build_completion_provider(&self.settings)?;
        Ok(Answerer::new(self.retriever.clone(), llm, self.settings.completion.clone()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IngestArgs {
    pub path: PathBuf,
    pub user: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryArgs {
    pub question: String,
    pub user: String,
    pub config: RetrievalConfig,
    pub answer: bool,
}

fn flag_value<'a>(args: &'a [String], i: usize, flag: &str) -> Result<&'a str> {
    args.get(i + 1).map(String::as_str).ok_or_else(|| anyhow!("{flag} requires a value"))
}

/// `<path> --user <id>`
pub fn parse_ingest_args(args: &[String]) -> Result<IngestArgs> {
    let (mut path, mut user) = (None, None);
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--user" | "-u" => {
                user = Some(flag_value(args, i, "--user")?.to_string());
                i += 1;
            }
            a if !a.starts_with('-') => path = Some(PathBuf::from(a)),
            other => bail!("unknown flag {other}"),
        }
        i += 1;
    }
    Ok(IngestArgs {
        path: path.ok_or_else(|| anyhow!("missing <path>"))?,
        user: user.ok_or_else(|| anyhow!("missing --user <id>"))?,
    })
}

/// `"<question>" --user <id> [--k N] [--threshold T] [--no-rerank] [--hybrid] [--answer]`
pub fn parse_query_args(args: &[String], default_k: usize) -> Result<QueryArgs> {
    let (mut question, mut user) = (None, None);
    let mut config = RetrievalConfig::default().with_k(default_k);
    let mut answer = false;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--user" | "-u" => {
                user = Some(flag_value(args, i, "--user")?.to_string());
                i += 1;
            }
            "--k" | "-k" => {
                let raw = flag_value(args, i, "--k")?;
                config.k = raw.parse().map_err(|_| anyhow!("--k expects a number, got '{raw}'"))?;
                i += 1;
            }
            "--threshold" | "-t" => {
                let raw = flag_value(args, i, "--threshold")?;
                config.threshold = Some(raw.parse().map_err(|_| anyhow!("--threshold expects a number, got '{raw}'"))?);
                i += 1;
            }
            "--no-rerank" => config.rerank = false,
            "--hybrid" => config.hybrid_search = true,
            "--answer" => answer = true,
            a if !a.starts_with('-') => question = Some(a.to_string()),
            other => bail!("unknown flag {other}"),
        }
        i += 1;
    }
    config.validate()?;
    Ok(QueryArgs {
        question: question.ok_or_else(|| anyhow!("missing \"<question>\""))?,
        user: user.ok_or_else(|| anyhow!("missing --user <id>"))?,
        config,
        answer,
    })
}
