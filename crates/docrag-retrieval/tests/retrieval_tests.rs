use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tempfile::TempDir;

use docrag_core::chunker::Chunker;
use docrag_core::data_processor::ExtractedDocument;
use docrag_core::filter::Filter;
use docrag_core::traits::{CompletionProvider, CrossEncoder, EmbeddingProvider, KeywordIndex, VectorIndex};
use docrag_core::types::{DeleteSelector, DocumentMeta, IndexRecord, Meta, PageInfo, RetrievalConfig, SearchCandidate};
use docrag_core::Error;
use docrag_embed::{Embedder, EmbedderOptions};
use docrag_rerank::Reranker;
use docrag_retrieval::{Answerer, ChatTurn, Ingestor, JobStatus, Retriever, RetrieverOptions, NO_CONTEXT};
use docrag_text::TantivyKeywordIndex;
use docrag_vector::MemoryVectorIndex;

const VOCAB: &[&str] = &["machine", "learning", "subset", "ai", "cooking", "pasta", "recipe", "tomato", "garden", "soil"];

/// One dimension per known word; everything else is ignored.
struct VocabProvider;

#[async_trait]
impl EmbeddingProvider for VocabProvider {
    fn name(&self) -> &str { "vocab" }
    fn model(&self) -> &str { "vocab-10" }
    fn dimension(&self) -> usize { VOCAB.len() }

    async fn create_embeddings(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0f32; VOCAB.len()];
                for word in t.split(|c: char| !c.is_alphanumeric()).map(str::to_lowercase) {
                    if let Some(i) = VOCAB.iter().position(|w| *w == word) {
                        v[i] += 1.0;
                    }
                }
                let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm > 0.0 {
                    v.iter_mut().for_each(|x| *x /= norm);
                }
                v
            })
            .collect())
    }
}

/// Returns a fixed candidate list and records the filter it was queried with.
struct FixedIndex {
    hits: Vec<SearchCandidate>,
    seen: Mutex<Vec<Filter>>,
}

impl FixedIndex {
    fn new(hits: Vec<SearchCandidate>) -> Self { Self { hits, seen: Mutex::new(Vec::new()) } }
}

#[async_trait]
impl VectorIndex for FixedIndex {
    async fn upsert(&self, records: &[IndexRecord]) -> anyhow::Result<usize> { Ok(records.len()) }

    async fn query(&self, _vector: &[f32], top_k: usize, filter: &Filter, _include_metadata: bool) -> anyhow::Result<Vec<SearchCandidate>> {
        self.seen.lock().unwrap().push(filter.clone());
        Ok(self.hits.iter().take(top_k).cloned().collect())
    }

    async fn delete(&self, _selector: &DeleteSelector) -> anyhow::Result<usize> { Ok(0) }
}

struct DownIndex;

#[async_trait]
impl VectorIndex for DownIndex {
    async fn upsert(&self, _records: &[IndexRecord]) -> anyhow::Result<usize> { anyhow::bail!("connection refused") }
    async fn query(&self, _v: &[f32], _k: usize, _f: &Filter, _m: bool) -> anyhow::Result<Vec<SearchCandidate>> { anyhow::bail!("connection refused") }
    async fn delete(&self, _selector: &DeleteSelector) -> anyhow::Result<usize> { anyhow::bail!("connection refused") }
}

/// Memory index whose writes can be switched off.
struct FlakyIndex {
    inner: MemoryVectorIndex,
    fail_upsert: AtomicBool,
}

#[async_trait]
impl VectorIndex for FlakyIndex {
    async fn upsert(&self, records: &[IndexRecord]) -> anyhow::Result<usize> {
        if self.fail_upsert.load(Ordering::SeqCst) {
            anyhow::bail!("write timed out");
        }
        self.inner.upsert(records).await
    }
    async fn query(&self, v: &[f32], k: usize, f: &Filter, m: bool) -> anyhow::Result<Vec<SearchCandidate>> { self.inner.query(v, k, f, m).await }
    async fn delete(&self, selector: &DeleteSelector) -> anyhow::Result<usize> { self.inner.delete(selector).await }
}

/// Rejects writes and remembers what it was asked to delete.
#[derive(Default)]
struct ReadOnlyKeyword {
    deletes: Mutex<Vec<DeleteSelector>>,
}

impl KeywordIndex for ReadOnlyKeyword {
    fn index(&self, _records: &[IndexRecord]) -> anyhow::Result<usize> { anyhow::bail!("disk full") }
    fn search(&self, _query: &str, _top_k: usize, _filter: &Filter) -> anyhow::Result<Vec<SearchCandidate>> { Ok(Vec::new()) }
    fn delete(&self, selector: &DeleteSelector) -> anyhow::Result<usize> {
        self.deletes.lock().unwrap().push(selector.clone());
        Ok(0)
    }
}

/// Prefers documents that mention the last query word.
struct LastWordEncoder;

impl CrossEncoder for LastWordEncoder {
    fn name(&self) -> &str { "last-word" }
    fn predict(&self, pairs: &[(String, String)]) -> anyhow::Result<Vec<f32>> {
        Ok(pairs
            .iter()
            .map(|(q, d)| {
                let last = q.split_whitespace().last().unwrap_or_default().to_lowercase();
                if d.to_lowercase().contains(&last) { 0.95 } else { 0.05 }
            })
            .collect())
    }
}

struct BrokenEncoder;

impl CrossEncoder for BrokenEncoder {
    fn name(&self) -> &str { "broken" }
    fn predict(&self, _pairs: &[(String, String)]) -> anyhow::Result<Vec<f32>> { anyhow::bail!("out of memory") }
}

struct EchoLlm;

#[async_trait]
impl CompletionProvider for EchoLlm {
    fn name(&self) -> &str { "echo" }
    async fn complete(&self, prompt: &str, _max_tokens: u32, _temperature: f32) -> anyhow::Result<String> { Ok(prompt.to_string()) }
}

fn embedder() -> Arc<Embedder> {
    let options = EmbedderOptions { retry_base_delay: Duration::ZERO, inter_batch_delay: Duration::ZERO, ..EmbedderOptions::default() };
    Arc::new(Embedder::new(Arc::new(VocabProvider), options, VOCAB.len()))
}

fn options() -> RetrieverOptions { RetrieverOptions { rerank_enabled: true, top_k_to_rerank: 20, ..RetrieverOptions::default() } }

fn document(doc_id: &str, filename: &str, text: &str) -> ExtractedDocument {
    ExtractedDocument::new(DocumentMeta::new(doc_id, filename, "txt"), text)
}

fn candidate(id: &str, score: f32, text: &str) -> SearchCandidate {
    let mut meta = Meta::new();
    meta.insert("doc_id".into(), json!(id));
    meta.insert("source_filename".into(), json!(format!("{id}.txt")));
    meta.insert("chunk_index".into(), json!(0));
    meta.insert("text".into(), json!(text));
    SearchCandidate::new(format!("{id}:0"), score, meta)
}

struct Pipeline {
    index: Arc<MemoryVectorIndex>,
    ingestor: Ingestor,
    retriever: Retriever,
}

fn memory_pipeline(reranker: Reranker) -> Pipeline { memory_pipeline_with(Chunker::default(), reranker) }

fn memory_pipeline_with(chunker: Chunker, reranker: Reranker) -> Pipeline {
    let index = Arc::new(MemoryVectorIndex::new(VOCAB.len()));
    let embedder = embedder();
    Pipeline {
        ingestor: Ingestor::new(chunker, embedder.clone(), index.clone(), "user_id"),
        retriever: Retriever::new(embedder, index.clone(), Arc::new(reranker), options()),
        index,
    }
}

fn exact() -> RetrievalConfig { RetrievalConfig::default().with_k(1).with_threshold(0.5).with_rerank(false) }

#[tokio::test]
async fn machine_learning_question_finds_its_chunk() {
    let p = memory_pipeline(Reranker::disabled());
    p.ingestor.ingest_document(&document("ml", "ml.txt", "Machine learning is a subset of AI."), "alice").await.unwrap();
    p.ingestor.ingest_document(&document("food", "food.txt", "Cooking pasta with a tomato recipe."), "alice").await.unwrap();

    let citations = p.retriever.retrieve("What is machine learning?", "alice", &exact()).await.unwrap();
    assert_eq!(citations.len(), 1);
    let c = &citations[0];
    assert_eq!(c.chunk_text, "Machine learning is a subset of AI.");
    assert_eq!(c.document_id, "ml");
    assert_eq!(c.filename, "ml.txt");
    assert_eq!(c.chunk_index, 0);
    assert!(c.relevance_score >= 0.5 && c.relevance_score <= 1.0);
    assert_eq!(c.snippet, c.chunk_text);
}

#[tokio::test]
async fn other_owners_chunks_never_leak() {
    let p = memory_pipeline(Reranker::disabled());
    p.ingestor.ingest_document(&document("bob-ml", "bob.txt", "Machine learning is a subset of AI."), "bob").await.unwrap();
    p.ingestor.ingest_document(&document("alice-garden", "garden.txt", "Garden soil needs compost."), "alice").await.unwrap();

    let sneaky = RetrievalConfig::default().with_rerank(false).with_filters(Filter::new().eq("user_id", "bob"));
    let citations = p.retriever.retrieve("machine learning", "alice", &sneaky).await.unwrap();
    assert!(citations.iter().all(|c| c.document_id == "alice-garden"));

    let any_doc = RetrievalConfig::default().with_rerank(false).with_filters(Filter::documents(&["bob-ml".to_string()], &[]));
    assert!(p.retriever.retrieve("machine learning", "alice", &any_doc).await.unwrap().is_empty());
}

#[tokio::test]
async fn scope_condition_replaces_caller_condition() {
    let index = Arc::new(FixedIndex::new(Vec::new()));
    let retriever = Retriever::new(embedder(), index.clone(), Arc::new(Reranker::disabled()), options());
    let config = RetrievalConfig::default().with_filters(Filter::new().eq("user_id", "mallory").eq("file_type", "pdf"));
    retriever.retrieve("soil", "alice", &config).await.unwrap();

    let seen = index.seen.lock().unwrap();
    assert_eq!(seen[0], Filter::new().eq("file_type", "pdf").eq("user_id", "alice"));
}

#[tokio::test]
async fn threshold_drops_weak_results() {
    let hits = vec![candidate("a", 0.6, "garden soil"), candidate("b", 0.4, "garden tools")];
    let retriever = Retriever::new(embedder(), Arc::new(FixedIndex::new(hits)), Arc::new(Reranker::disabled()), options());

    let strict = RetrievalConfig::default().with_rerank(false).with_threshold(0.99);
    assert!(retriever.retrieve("garden", "alice", &strict).await.unwrap().is_empty());

    let loose = RetrievalConfig::default().with_rerank(false).with_threshold(0.5);
    let kept = retriever.retrieve("garden", "alice", &loose).await.unwrap();
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].document_id, "a");
}

#[tokio::test]
async fn invalid_input_is_rejected_or_empty() {
    let retriever = Retriever::new(embedder(), Arc::new(FixedIndex::new(vec![candidate("a", 0.9, "x")])), Arc::new(Reranker::disabled()), options());

    assert!(retriever.retrieve("   ", "alice", &RetrievalConfig::default()).await.unwrap().is_empty());
    assert!(retriever.retrieve("x; DROP TABLE users", "alice", &RetrievalConfig::default()).await.unwrap().is_empty());

    let err = retriever.retrieve("garden", "alice", &RetrievalConfig::default().with_k(0)).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    let err = retriever.retrieve("garden", "alice", &RetrievalConfig::default().with_threshold(1.5)).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    let err = retriever.retrieve("garden", " ", &RetrievalConfig::default()).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn index_failure_is_a_retryable_retrieval_error() {
    let retriever = Retriever::new(embedder(), Arc::new(DownIndex), Arc::new(Reranker::disabled()), options());
    let err = retriever.retrieve("garden", "alice", &RetrievalConfig::default()).await.unwrap_err();
    assert!(matches!(err, Error::Retrieval { .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn reranking_reorders_and_keeps_k() {
    let hits = vec![candidate("a", 0.9, "garden soil"), candidate("b", 0.8, "pasta recipe"), candidate("c", 0.7, "tomato sauce")];
    let reranker = Reranker::new(Some(Arc::new(LastWordEncoder)), 16, 512);
    let retriever = Retriever::new(embedder(), Arc::new(FixedIndex::new(hits)), Arc::new(reranker), options());

    let citations = retriever.retrieve("recipe with tomato", "alice", &RetrievalConfig::default().with_k(2)).await.unwrap();
    assert_eq!(citations.len(), 2);
    assert_eq!(citations[0].document_id, "c");
    assert!((citations[0].relevance_score - 0.95).abs() < 1e-6);
}

#[tokio::test]
async fn failed_reranking_keeps_index_order_and_scores() {
    let hits = vec![candidate("a", 0.9, "one"), candidate("b", 0.8, "two"), candidate("c", 0.7, "three"), candidate("d", 0.6, "four")];
    let reranker = Reranker::new(Some(Arc::new(BrokenEncoder)), 16, 512);
    let retriever = Retriever::new(embedder(), Arc::new(FixedIndex::new(hits)), Arc::new(reranker), options());

    let citations = retriever.retrieve("garden", "alice", &RetrievalConfig::default().with_k(2)).await.unwrap();
    let ids: Vec<&str> = citations.iter().map(|c| c.document_id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);
    assert!((citations[0].relevance_score - 0.9).abs() < 1e-6);
}

#[tokio::test]
async fn context_lists_sources_within_budget() {
    let p = memory_pipeline(Reranker::disabled());
    p.ingestor.ingest_document(&document("ml", "ml.txt", "Machine learning is a subset of AI."), "alice").await.unwrap();

    let ctx = p.retriever.get_context("What is machine learning?", "alice", &exact()).await.unwrap();
    assert!(ctx.has_context);
    assert_eq!(ctx.total_chunks, 1);
    assert_eq!(ctx.formatted_context, "[Source: ml.txt]\nMachine learning is a subset of AI.");
    assert!(ctx.formatted_context.chars().count() <= 4000);

    let empty = p.retriever.get_context("What is machine learning?", "nobody", &exact()).await.unwrap();
    assert!(!empty.has_context);
    assert_eq!(empty.formatted_context, NO_CONTEXT);
}

#[tokio::test]
async fn hybrid_search_surfaces_keyword_matches() {
    let index: Arc<dyn VectorIndex> = Arc::new(MemoryVectorIndex::new(VOCAB.len()));
    let keyword = Arc::new(TantivyKeywordIndex::in_ram("user_id").unwrap());
    let embedder = embedder();
    let ingestor = Ingestor::new(Chunker::default(), embedder.clone(), index.clone(), "user_id").with_keyword_index(keyword.clone());
    let retriever = Retriever::new(embedder, index, Arc::new(Reranker::disabled()), options()).with_keyword_index(keyword);

    ingestor.ingest_document(&document("ml", "ml.txt", "Machine learning basics for everyone."), "alice").await.unwrap();
    ingestor.ingest_document(&document("bake", "bake.txt", "Zucchini bread baking guide."), "alice").await.unwrap();

    // Neither query word is in the embedding vocabulary, so vector order is insertion order.
    let dense = retriever.retrieve("zucchini bread", "alice", &RetrievalConfig::default().with_k(1).with_rerank(false)).await.unwrap();
    assert_eq!(dense[0].document_id, "ml");

    let hybrid = RetrievalConfig::default().with_k(1).with_rerank(false).with_hybrid_search(true);
    let fused = retriever.retrieve("zucchini bread", "alice", &hybrid).await.unwrap();
    assert_eq!(fused[0].document_id, "bake");
    assert!((0.0..=1.0).contains(&fused[0].relevance_score));

    assert!(retriever.retrieve("zucchini bread", "bob", &hybrid).await.unwrap().is_empty());
}

#[tokio::test]
async fn hybrid_threshold_is_not_met_by_rank_alone() {
    let hits = vec![candidate("weak", 0.05, "garden soil"), candidate("weaker", 0.01, "garden tools")];
    let keyword = Arc::new(TantivyKeywordIndex::in_ram("user_id").unwrap());
    let retriever = Retriever::new(embedder(), Arc::new(FixedIndex::new(hits)), Arc::new(Reranker::disabled()), options()).with_keyword_index(keyword);
    let hybrid = RetrievalConfig::default().with_rerank(false).with_hybrid_search(true);

    // The keyword side finds nothing, so each hit is backed by one list only.
    assert!(retriever.retrieve("garden", "alice", &hybrid.clone().with_threshold(0.99)).await.unwrap().is_empty());
    let all = retriever.retrieve("garden", "alice", &hybrid).await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].document_id, "weak");
    assert!(all.iter().all(|c| c.relevance_score <= 0.5 + 1e-6));
}

#[tokio::test]
async fn document_search_orders_by_document_then_chunk() {
    let p = memory_pipeline_with(Chunker::new(60, 10), Reranker::disabled());
    let long = "garden soil ".repeat(20);
    for (id, name) in [("d1", "one.txt"), ("d2", "two.txt"), ("d3", "three.txt")] {
        p.ingestor.ingest_document(&document(id, name, &long), "alice").await.unwrap();
    }

    let hits = p.retriever.search_by_document(&["d2".to_string(), "d1".to_string()], "alice", 100).await.unwrap();
    assert!(hits.len() > 2);
    assert!(hits.iter().all(|c| c.document_id != "d3"));
    let first_d1 = hits.iter().position(|c| c.document_id == "d1").unwrap();
    assert!(hits[..first_d1].iter().all(|c| c.document_id == "d2"));
    assert!(hits[first_d1..].iter().all(|c| c.document_id == "d1"));
    assert!(hits[..first_d1].windows(2).all(|w| w[0].chunk_index < w[1].chunk_index));

    assert_eq!(p.retriever.search_by_document(&["d1".to_string()], "alice", 2).await.unwrap().len(), 2);
    assert!(p.retriever.search_by_document(&["d1".to_string()], "bob", 10).await.unwrap().is_empty());
    assert!(p.retriever.search_by_document(&[], "alice", 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn deleting_a_document_only_touches_its_owner() {
    let p = memory_pipeline(Reranker::disabled());
    let text = "Machine learning is a subset of AI.";
    p.ingestor.ingest_document(&document("a-doc", "ml.txt", text), "alice").await.unwrap();
    p.ingestor.ingest_document(&document("b-doc", "ml.txt", text), "bob").await.unwrap();
    assert_eq!(p.index.len(), 2);

    assert_eq!(p.retriever.delete_document("b-doc", "alice").await.unwrap(), 0);
    assert_eq!(p.retriever.delete_document("a-doc", "alice").await.unwrap(), 1);
    assert!(p.retriever.retrieve("machine learning", "alice", &exact()).await.unwrap().is_empty());
    assert_eq!(p.retriever.retrieve("machine learning", "bob", &exact()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn reingesting_replaces_previous_chunks() {
    let p = memory_pipeline_with(Chunker::new(60, 10), Reranker::disabled());
    let long = "garden soil ".repeat(20);
    let first = p.ingestor.ingest_document(&document("d1", "one.txt", &long), "alice").await.unwrap();
    assert!(first > 1);
    let second = p.ingestor.ingest_document(&document("d1", "one.txt", "Garden soil is short now."), "alice").await.unwrap();
    assert_eq!(second, 1);
    assert_eq!(p.index.len(), 1);
}

#[tokio::test]
async fn reingesting_keeps_keyword_index_in_step() {
    let index = Arc::new(MemoryVectorIndex::new(VOCAB.len()));
    let keyword = Arc::new(TantivyKeywordIndex::in_ram("user_id").unwrap());
    let ingestor = Ingestor::new(Chunker::new(60, 10), embedder(), index.clone(), "user_id").with_keyword_index(keyword.clone());

    let long = "garden soil ".repeat(20);
    let first = ingestor.ingest_document(&document("d1", "one.txt", &long), "alice").await.unwrap();
    assert_eq!(keyword.num_docs(), u64::try_from(first).unwrap());
    ingestor.ingest_document(&document("d1", "one.txt", "Garden soil is short now."), "alice").await.unwrap();
    assert_eq!(index.len(), 1);
    assert_eq!(keyword.num_docs(), 1);
}

#[tokio::test]
async fn failed_write_keeps_previous_version() {
    let index = Arc::new(FlakyIndex { inner: MemoryVectorIndex::new(VOCAB.len()), fail_upsert: AtomicBool::new(false) });
    let ingestor = Ingestor::new(Chunker::new(60, 10), embedder(), index.clone(), "user_id");
    let retriever = Retriever::new(embedder(), index.clone(), Arc::new(Reranker::disabled()), options());

    let long = "garden soil ".repeat(20);
    let first = ingestor.ingest_document(&document("d1", "one.txt", &long), "alice").await.unwrap();
    index.fail_upsert.store(true, Ordering::SeqCst);
    let err = ingestor.ingest_document(&document("d1", "one.txt", "Garden soil is short now."), "alice").await.unwrap_err();
    assert!(matches!(err, Error::ExternalService { .. }));

    assert_eq!(index.inner.len(), first);
    let hits = retriever.retrieve("garden soil", "alice", &RetrievalConfig::default().with_rerank(false)).await.unwrap();
    assert!(hits.iter().all(|c| c.chunk_text.starts_with("garden soil")));
}

#[tokio::test]
async fn keyword_failure_leaves_document_vector_only() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("ml.txt");
    std::fs::write(&path, "Machine learning is a subset of AI.").unwrap();

    let keyword = Arc::new(ReadOnlyKeyword::default());
    let p = memory_pipeline(Reranker::disabled());
    let ingestor = p.ingestor.with_keyword_index(keyword.clone());

    let outcome = ingestor.ingest_file(&path, "alice").await;
    assert!(outcome.is_success());
    assert_eq!(outcome.chunks, 1);
    assert_eq!(ingestor.jobs().get(outcome.job_id).unwrap().status, JobStatus::Completed);
    assert_eq!(p.index.len(), 1);
    assert_eq!(p.retriever.retrieve("What is machine learning?", "alice", &exact()).await.unwrap().len(), 1);

    let doc_id = outcome.doc_id.unwrap();
    let deletes = keyword.deletes.lock().unwrap();
    assert_eq!(*deletes, vec![DeleteSelector::Filter(Filter::new().eq("doc_id", doc_id.as_str()).eq("user_id", "alice"))]);
}

#[tokio::test]
async fn paged_documents_cite_their_pages() {
    let p = memory_pipeline_with(Chunker::new(60, 0), Reranker::disabled());
    let (first, second) = ("garden soil ".repeat(10), "pasta recipe ".repeat(10));
    let pages = vec![PageInfo::from_text(first.trim()), PageInfo::from_text(second.trim())];
    let doc = ExtractedDocument::new(DocumentMeta::new("manual", "manual.pdf", "pdf"), format!("{}\n{}", first.trim(), second.trim())).with_pages(pages);
    let chunks = p.ingestor.ingest_document(&doc, "alice").await.unwrap();
    assert!(chunks > 2);

    let mut citations = p.retriever.retrieve("garden soil", "alice", &RetrievalConfig::default().with_k(50).with_rerank(false)).await.unwrap();
    citations.sort_by_key(|c| c.chunk_index);
    assert_eq!(citations.len(), chunks);
    assert_eq!(citations.first().unwrap().page_number, Some(1));
    assert_eq!(citations.last().unwrap().page_number, Some(2));
    assert!(citations.windows(2).all(|w| w[0].page_number <= w[1].page_number));

    let plain = memory_pipeline(Reranker::disabled());
    plain.ingestor.ingest_document(&document("ml", "ml.txt", "Machine learning is a subset of AI."), "alice").await.unwrap();
    let hits = plain.retriever.retrieve("machine learning", "alice", &exact()).await.unwrap();
    assert_eq!(hits[0].page_number, None);
}

#[tokio::test]
async fn directory_ingestion_reports_each_document_and_tracks_jobs() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("ml.txt"), "Machine learning is a subset of AI.").unwrap();
    std::fs::write(tmp.path().join("food.md"), "# Cooking\nPasta recipe with tomato.").unwrap();
    std::fs::write(tmp.path().join("skip.bin"), [0u8, 1]).unwrap();

    let p = memory_pipeline(Reranker::disabled());
    let mut seen = Vec::new();
    let report = p.ingestor.ingest_path(tmp.path(), "alice", |outcome| seen.push(outcome.document.clone())).await;
    assert_eq!(report.documents.len(), 2);
    assert_eq!(seen.len(), 2);
    assert_eq!(report.failed(), 0);
    assert_eq!(report.total_chunks(), 2);

    let jobs = p.ingestor.jobs().list();
    assert_eq!(jobs.len(), 2);
    assert!(jobs.iter().all(|j| j.status == JobStatus::Completed && j.chunk_count == 1));

    let missing = p.ingestor.ingest_file(&tmp.path().join("gone.txt"), "alice").await;
    assert!(!missing.is_success());
    let job = p.ingestor.jobs().get(missing.job_id).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.is_some());
    assert_eq!(p.ingestor.jobs().remove_finished(), 3);
}

#[tokio::test]
async fn answer_prompt_carries_context_and_history() {
    let p = memory_pipeline(Reranker::disabled());
    p.ingestor.ingest_document(&document("ml", "ml.txt", "Machine learning is a subset of AI."), "alice").await.unwrap();
    let answerer = Answerer::new(Arc::new(p.retriever), Arc::new(EchoLlm), Default::default());

    let history = [ChatTurn::user("hello"), ChatTurn::assistant("hi there")];
    let answer = answerer.answer("What is machine learning?", "alice", &exact(), &history).await.unwrap();
    assert_eq!(answer.citations.len(), 1);
    assert!(answer.has_context);
    assert!(answer.answer.contains("ASSISTANT: hi there"));
    assert!(answer.answer.contains("CONTEXT DOCUMENTS:\n[Source: ml.txt]\nMachine learning is a subset of AI."));
    assert!(answer.answer.contains("USER QUESTION:\nWhat is machine learning?"));
}
