//! Retrieval orchestration over the embedding, index and rerank crates.

pub mod answer;
pub mod citation;
pub mod context;
pub mod fusion;
pub mod ingest;
pub mod jobs;
pub mod prompt;
pub mod query;
pub mod retriever;

pub use answer::{Answer, Answerer};
pub use citation::{make_snippet, to_citation};
pub use context::{format_context, ChunkSource, ContextChunk, RetrievalContext, CONTEXT_UNAVAILABLE, NO_CONTEXT};
pub use fusion::fuse;
pub use ingest::{DocumentOutcome, IngestReport, Ingestor};
pub use jobs::{JobId, JobRecord, JobRegistry, JobStatus};
pub use prompt::{build_rag_prompt, ChatTurn, SYSTEM_PROMPT};
pub use query::validate_query;
pub use retriever::{Retriever, RetrieverOptions};
