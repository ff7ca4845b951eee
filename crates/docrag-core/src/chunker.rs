//! Sliding-window chunking over whitespace-normalized text.

use tracing::{debug, warn};

use crate::config::ChunkingSettings;
use crate::types::{Chunk, ChunkMetadata, DocumentMeta, PageInfo};

/// Chunks cut from one document.
///
/// `fallback` is set when windowing failed and the whole normalized text was
/// returned as a single chunk instead.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkSet {
    pub chunks: Vec<Chunk>,
    pub fallback: Option<String>,
}

impl ChunkSet {
    pub fn is_degraded(&self) -> bool { self.fallback.is_some() }
    pub fn len(&self) -> usize { self.chunks.len() }
    pub fn is_empty(&self) -> bool { self.chunks.is_empty() }
    pub fn into_chunks(self) -> Vec<Chunk> { self.chunks }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    target_size: usize,
    overlap: usize,
}

impl Default for Chunker {
    fn default() -> Self { Self::new(1000, 200) }
}

impl Chunker {
    pub fn new(target_size: usize, overlap: usize) -> Self { Self { target_size, overlap } }

    pub fn from_settings(settings: &ChunkingSettings) -> Self { Self::new(settings.chunk_size, settings.chunk_overlap) }

    pub fn target_size(&self) -> usize { self.target_size }
    pub fn overlap(&self) -> usize { self.overlap }

    /// Splits `text` into overlapping chunks that never cut a word unless a
    /// window holds no space at all.
    ///
    /// Never fails: empty input gives an empty set, and a windowing failure
    /// degrades to one chunk holding the whole normalized text.
    pub fn chunk(&self, text: &str, doc: &DocumentMeta, pages: Option<&[PageInfo]>) -> ChunkSet {
        let normalized = normalize_whitespace(text);
        if normalized.is_empty() {
            return ChunkSet::default();
        }
        let chars: Vec<char> = normalized.chars().collect();

        match self.windows(&chars) {
            Ok(spans) => {
                let chunks: Vec<Chunk> = spans
                    .into_iter()
                    .enumerate()
                    .map(|(index, (start, end))| build_chunk(&chars, start, end, index, doc, pages))
                    .collect();
                debug!(doc_id = %doc.doc_id, chunks = chunks.len(), chars = chars.len(), "Chunked document");
                ChunkSet { chunks, fallback: None }
            }
            Err(reason) => {
                warn!(doc_id = %doc.doc_id, reason = %reason, "Chunking failed, using whole text as one chunk");
                let chunk = build_chunk(&chars, 0, chars.len(), 0, doc, pages);
                ChunkSet { chunks: vec![chunk], fallback: Some(reason) }
            }
        }
    }

    /// Trimmed, non-empty `[start, end)` character spans in window order.
    fn windows(&self, chars: &[char]) -> Result<Vec<(usize, usize)>, String> {
        if self.target_size == 0 {
            return Err("window size must be positive".to_string());
        }
        let len = chars.len();
        let mut spans = Vec::new();
        let mut start = 0usize;
        while start < len {
            // `end` may run past the text on the last window; the overlap step
            // below uses the unclamped value so the tail is not re-chunked.
            let mut end = start.saturating_add(self.target_size);
            if end < len {
                if let Some(offset) = chars[start..end].iter().rposition(|c| *c == ' ') {
                    end = start + offset;
                }
            }

            let (mut s, mut e) = (start, end.min(len));
            while s < e && chars[s] == ' ' { s += 1; }
            while e > s && chars[e - 1] == ' ' { e -= 1; }
            if s < e {
                spans.push((s, e));
            }

            start = (start + 1).max(end.saturating_sub(self.overlap));
        }
        Ok(spans)
    }
}

fn build_chunk(chars: &[char], start: usize, end: usize, index: usize, doc: &DocumentMeta, pages: Option<&[PageInfo]>) -> Chunk {
    let text: String = chars[start..end].iter().collect();
    Chunk {
        metadata: ChunkMetadata {
            doc_id: doc.doc_id.clone(),
            source_filename: doc.source_filename.clone(),
            file_type: doc.file_type.clone(),
            chunk_index: index,
            start_char: start,
            end_char: end,
            char_count: end - start,
            page_number: pages.and_then(|p| page_for_offset(start, p)),
            created_at: doc.created_at,
            extra: doc.extra.clone(),
        },
        text,
    }
}

/// Collapses every whitespace run to a single space and trims both ends.
pub fn normalize_whitespace(text: &str) -> String { text.split_whitespace().collect::<Vec<_>>().join(" ") }

/// Estimates the 1-based page holding character `start`, assuming characters
/// are spread evenly over pages. `None` when no pages are known.
pub fn page_for_offset(start: usize, pages: &[PageInfo]) -> Option<u32> {
    if pages.is_empty() {
        return None;
    }
    let total: usize = pages.iter().map(|p| p.char_count).sum();
    if total == 0 {
        return Some(1);
    }
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let estimated = ((start as f64 / total as f64) * pages.len() as f64).floor() as usize + 1;
    let page = estimated.clamp(1, pages.len());
    Some(u32::try_from(page).unwrap_or(u32::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_respect_word_boundaries() {
        let chars: Vec<char> = "alpha beta gamma delta".chars().collect();
        let spans = Chunker::new(12, 0).windows(&chars).expect("spans");
        let texts: Vec<String> = spans.iter().map(|(s, e)| chars[*s..*e].iter().collect()).collect();
        assert_eq!(texts, vec!["alpha beta", "gamma delta"]);
    }

    #[test]
    fn zero_window_is_rejected() {
        assert!(Chunker::new(0, 0).windows(&['a']).is_err());
    }

    #[test]
    fn page_estimate_is_clamped() {
        let pages = [PageInfo { char_count: 10 }, PageInfo { char_count: 10 }];
        assert_eq!(page_for_offset(0, &pages), Some(1));
        assert_eq!(page_for_offset(10, &pages), Some(2));
        assert_eq!(page_for_offset(500, &pages), Some(2));
        assert_eq!(page_for_offset(3, &[]), None);
        assert_eq!(page_for_offset(3, &[PageInfo { char_count: 0 }]), Some(1));
    }
}
