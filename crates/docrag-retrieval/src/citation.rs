use docrag_core::types::{meta_str, meta_u64, RerankedCandidate, SourceCitation};

/// The first `max_chars` characters, with `...` appended when the text was cut.
pub fn make_snippet(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

pub fn to_citation(candidate: &RerankedCandidate, snippet_chars: usize) -> SourceCitation {
    let meta = &candidate.metadata;
    let text = candidate.text();
    SourceCitation {
        document_id: meta_str(meta, "doc_id").unwrap_or_default().to_string(),
        filename: meta_str(meta, "source_filename").unwrap_or_default().to_string(),
        page_number: meta_u64(meta, "page_number").and_then(|p| u32::try_from(p).ok()),
        chunk_index: meta_u64(meta, "chunk_index").and_then(|i| usize::try_from(i).ok()).unwrap_or(0),
        chunk_text: text.to_string(),
        relevance_score: clamp_score(candidate.score()),
        snippet: make_snippet(text, snippet_chars),
        url: meta_str(meta, "url").map(str::to_string),
    }
}

fn clamp_score(score: f32) -> f32 { if score.is_nan() { 0.0 } else { score.clamp(0.0, 1.0) } }
