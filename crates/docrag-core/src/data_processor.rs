//! Text extraction for the document formats the ingestion pipeline accepts.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::Context;
use quick_xml::events::Event;
use quick_xml::Reader;
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use tracing::{info, warn};

use crate::chunker::normalize_whitespace;
use crate::error::{Error, Result};
use crate::types::{DocumentMeta, PageInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Txt,
    Markdown,
    Html,
    Pdf,
    Docx,
}

impl FileType {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "txt" | "text" => Some(Self::Txt),
            "md" | "markdown" => Some(Self::Markdown),
            "html" | "htm" => Some(Self::Html),
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Txt => "txt",
            Self::Markdown => "md",
            Self::Html => "html",
            Self::Pdf => "pdf",
            Self::Docx => "docx",
        }
    }
}

/// Raw text of one document plus the identity chunks will inherit.
///
/// `pages` is set for paginated formats and drives chunk page attribution.
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    pub meta: DocumentMeta,
    pub text: String,
    pub pages: Option<Vec<PageInfo>>,
}

impl ExtractedDocument {
    pub fn new(meta: DocumentMeta, text: impl Into<String>) -> Self { Self { meta, text: text.into(), pages: None } }

    #[must_use]
    pub fn with_pages(mut self, pages: Vec<PageInfo>) -> Self {
        self.pages = Some(pages);
        self
    }
}

#[derive(Debug, Default)]
pub struct DataProcessor;

impl DataProcessor {
    pub fn new() -> Self { Self }

    /// Supported files under `root`, sorted. A file path is returned as-is.
    pub fn list_files(&self, root: &Path) -> Vec<PathBuf> {
        if root.is_file() {
            return vec![root.to_path_buf()];
        }
        let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
            .into_iter()
            .filter_map(std::result::Result::ok)
            .filter(|e| e.file_type().is_file())
            .map(walkdir::DirEntry::into_path)
            .filter(|p| FileType::from_path(p).is_some())
            .collect();
        files.sort();
        files
    }

    pub fn extract(&self, path: &Path) -> Result<ExtractedDocument> {
        let path_display = path.display().to_string();
        let file_type = FileType::from_path(path)
            .ok_or_else(|| Error::document(&path_display, "unsupported document type (expected txt, md, html, pdf or docx)"))?;
        if !path.exists() {
            return Err(Error::NotFound(path_display));
        }

        let mut pages = None;
        let mut extra = Vec::new();
        let text = match file_type {
            FileType::Txt | FileType::Markdown => read_file_content(path).map_err(|e| Error::document(&path_display, e))?.trim().to_string(),
            FileType::Html => extract_html_text(&read_file_content(path).map_err(|e| Error::document(&path_display, e))?),
            FileType::Pdf => {
                let extracted = extract_pdf_pages(path).map_err(|e| Error::document(&path_display, format!("{e:#}")))?;
                extra.push(("page_count", extracted.page_count));
                let text = extracted.pages.join("\n");
                // Chunk offsets count characters of the normalized text.
                pages = Some(extracted.pages.iter().map(|p| PageInfo::from_text(&normalize_whitespace(p))).collect());
                text
            }
            FileType::Docx => {
                let extracted = extract_docx_text(path).map_err(|e| Error::document(&path_display, format!("{e:#}")))?;
                extra.push(("paragraph_count", extracted.paragraphs));
                extra.push(("table_count", extracted.tables));
                extracted.text
            }
        };

        let filename = path.file_name().map_or_else(|| path_display.clone(), |n| n.to_string_lossy().to_string());
        let mut meta = DocumentMeta::new(document_id(path), filename, file_type.as_str())
            .with_extra("line_count", text.lines().count())
            .with_extra("content_hash", blake3::hash(text.as_bytes()).to_hex().to_string());
        for (key, value) in extra {
            meta = meta.with_extra(key, value);
        }

        info!(path = %path_display, file_type = file_type.as_str(), chars = text.len(), "Extracted document");
        Ok(ExtractedDocument { meta, text, pages })
    }
}

/// Stable document id derived from the path, so re-ingesting a file replaces its chunks.
pub fn document_id(path: &Path) -> String {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let hash = blake3::hash(canonical.to_string_lossy().as_bytes()).to_hex();
    hash.as_str()[..16].to_string()
}

fn read_file_content(path: &Path) -> std::io::Result<String> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(content),
        Err(_) => Ok(String::from_utf8_lossy(&fs::read(path)?).to_string()),
    }
}

/// Text of each non-empty PDF page in page order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PdfText {
    pub pages: Vec<String>,
    pub page_count: usize,
}

/// A page whose text cannot be decoded is skipped with a warning.
pub fn extract_pdf_pages(path: &Path) -> anyhow::Result<PdfText> {
    let document = lopdf::Document::load(path).context("cannot parse PDF")?;
    let numbers: Vec<u32> = document.get_pages().keys().copied().collect();
    let mut pages = Vec::new();
    for number in &numbers {
        match document.extract_text(&[*number]) {
            Ok(text) if !text.trim().is_empty() => pages.push(text.trim().to_string()),
            Ok(_) => {}
            Err(e) => warn!(page = number, error = %e, "Skipping unreadable PDF page"),
        }
    }
    Ok(PdfText { pages, page_count: numbers.len() })
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocxText {
    pub text: String,
    pub paragraphs: usize,
    pub tables: usize,
}

/// Paragraph text of `word/document.xml` in document order. Table rows become
/// one line each with cells joined by ` | `.
pub fn extract_docx_text(path: &Path) -> anyhow::Result<DocxText> {
    let file = fs::File::open(path)?;
    let mut archive = zip::ZipArchive::new(file).context("not a DOCX archive")?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .context("DOCX has no word/document.xml")?
        .read_to_string(&mut xml)?;
    docx_body_text(&xml)
}

pub fn docx_body_text(xml: &str) -> anyhow::Result<DocxText> {
    let mut reader = Reader::from_str(xml);
    let mut out = DocxText::default();
    let mut lines: Vec<String> = Vec::new();
    let (mut paragraph, mut cell) = (String::new(), String::new());
    let mut row: Vec<String> = Vec::new();
    let mut rows: Vec<String> = Vec::new();
    let (mut in_text, mut table_depth) = (false, 0usize);

    loop {
        match reader.read_event().context("malformed word/document.xml")? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"t" => in_text = true,
                b"tbl" => table_depth += 1,
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"tab" => paragraph.push('\t'),
                b"br" | b"cr" => paragraph.push('\n'),
                _ => {}
            },
            Event::Text(t) if in_text => paragraph.push_str(&t.unescape()?),
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    let text = paragraph.trim().to_string();
                    paragraph.clear();
                    if text.is_empty() {
                        continue;
                    }
                    if table_depth > 0 {
                        if !cell.is_empty() {
                            cell.push(' ');
                        }
                        cell.push_str(&text);
                    } else {
                        out.paragraphs += 1;
                        lines.push(text);
                    }
                }
                b"tc" => row.push(std::mem::take(&mut cell)),
                b"tr" => rows.push(std::mem::take(&mut row).join(" | ")),
                b"tbl" => {
                    table_depth = table_depth.saturating_sub(1);
                    if table_depth == 0 && !rows.is_empty() {
                        out.tables += 1;
                        lines.push(std::mem::take(&mut rows).join("\n"));
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    out.text = lines.join("\n");
    Ok(out)
}

const SKIPPED_ELEMENTS: [&str; 6] = ["script", "style", "noscript", "iframe", "svg", "head"];

/// Visible text of an HTML page, one text node per line.
pub fn extract_html_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut parts = Vec::new();
    let body = Selector::parse("body").ok();
    let root = body
        .as_ref()
        .and_then(|s| document.select(s).next())
        .unwrap_or_else(|| document.root_element());
    collect_text(root, &mut parts);
    parts.join("\n")
}

fn collect_text(element: ElementRef<'_>, parts: &mut Vec<String>) {
    if SKIPPED_ELEMENTS.contains(&element.value().name()) {
        return;
    }
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    parts.push(trimmed.to_string());
                }
            }
            Node::Element(_) => {
                if let Some(child_element) = ElementRef::wrap(child) {
                    collect_text(child_element, parts);
                }
            }
            _ => {}
        }
    }
}
