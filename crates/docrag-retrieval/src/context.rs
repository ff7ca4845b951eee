//! LLM context assembly under a character budget.

use std::fmt::Write;

use serde::{Deserialize, Serialize};
use tracing::warn;

use docrag_core::types::SourceCitation;

pub const NO_CONTEXT: &str = "No relevant context found.";
pub const CONTEXT_UNAVAILABLE: &str = "Context unavailable.";
const BLOCK_SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkSource {
    pub document_id: String,
    pub filename: String,
    pub page_number: Option<u32>,
    pub chunk_index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextChunk {
    pub text: String,
    pub source: ChunkSource,
    pub relevance_score: f32,
}

impl From<&SourceCitation> for ContextChunk {
    fn from(c: &SourceCitation) -> Self {
        Self {
            text: c.chunk_text.clone(),
            source: ChunkSource {
                document_id: c.document_id.clone(),
                filename: c.filename.clone(),
                page_number: c.page_number,
                chunk_index: c.chunk_index,
            },
            relevance_score: c.relevance_score,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalContext {
    pub query: String,
    pub context_chunks: Vec<ContextChunk>,
    pub formatted_context: String,
    pub citations: Vec<SourceCitation>,
    pub total_chunks: usize,
    pub has_context: bool,
}

impl RetrievalContext {
    pub fn new(query: &str, citations: Vec<SourceCitation>, budget_chars: usize) -> Self {
        let context_chunks: Vec<ContextChunk> = citations.iter().map(ContextChunk::from).collect();
        let formatted_context = format_context_or_placeholder(&context_chunks, budget_chars);
        Self {
            query: query.to_string(),
            total_chunks: context_chunks.len(),
            has_context: !context_chunks.is_empty(),
            context_chunks,
            formatted_context,
            citations,
        }
    }
}

/// Blocks `[Source: <file> - Page <n>]\n<text>` joined by blank lines, in
/// ranking order. Stops at the first block that would take the total length,
/// separators included, past `budget_chars`.
pub fn format_context(chunks: &[ContextChunk], budget_chars: usize) -> Result<String, std::fmt::Error> {
    if chunks.is_empty() {
        return Ok(NO_CONTEXT.to_string());
    }
    let mut out = String::new();
    let mut used = 0usize;
    let mut block = String::new();
    for chunk in chunks {
        block.clear();
        write!(block, "[Source: {}", chunk.source.filename)?;
        if let Some(page) = chunk.source.page_number {
            write!(block, " - Page {page}")?;
        }
        write!(block, "]\n{}", chunk.text)?;

        let separator = if out.is_empty() { 0 } else { BLOCK_SEPARATOR.len() };
        let cost = separator + block.chars().count();
        if used + cost > budget_chars {
            break;
        }
        if separator > 0 {
            out.push_str(BLOCK_SEPARATOR);
        }
        out.push_str(&block);
        used += cost;
    }
    Ok(out)
}

pub fn format_context_or_placeholder(chunks: &[ContextChunk], budget_chars: usize) -> String {
    format_context(chunks, budget_chars).unwrap_or_else(|e| {
        warn!(error = %e, "Context formatting failed");
        CONTEXT_UNAVAILABLE.to_string()
    })
}
