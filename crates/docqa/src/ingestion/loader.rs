//! Document loaders, selected by file extension

use sha2::{Digest, Sha256};
use std::path::Path;

use crate::error::{Error, Result};

/// Maximum share of control characters tolerated in a text file
const MAX_CONTROL_RATIO: f64 = 0.05;

/// Text extracted from a document, with page boundaries when known
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    /// Original filename
    pub filename: String,
    /// Extracted text content
    pub text: String,
    /// Page starts, ordered by offset (empty for unpaginated formats)
    pub pages: Vec<PageContent>,
    /// Total pages (if applicable)
    pub total_pages: Option<u32>,
}

/// Start of a single page in the extracted text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageContent {
    /// Page number (1-indexed)
    pub page_number: u32,
    /// Byte offset in the full text
    pub char_offset: usize,
}

impl LoadedDocument {
    /// Unpaginated text
    pub fn plain(filename: impl Into<String>, text: String) -> Self {
        Self {
            filename: filename.into(),
            text,
            pages: Vec::new(),
            total_pages: None,
        }
    }

    /// Pages joined by blank lines, with their offsets recorded
    pub fn paged(filename: impl Into<String>, pages: Vec<String>) -> Self {
        let mut text = String::new();
        let mut starts = Vec::with_capacity(pages.len());

        for (i, page) in pages.iter().enumerate() {
            if i > 0 {
                text.push_str("\n\n");
            }
            starts.push(PageContent {
                page_number: i as u32 + 1,
                char_offset: text.len(),
            });
            text.push_str(page.trim_end());
        }

        Self {
            filename: filename.into(),
            text,
            total_pages: Some(starts.len() as u32),
            pages: starts,
        }
    }

    /// Page containing the given byte offset
    pub fn page_at(&self, offset: usize) -> Option<u32> {
        let idx = self.pages.partition_point(|p| p.char_offset <= offset);
        idx.checked_sub(1).map(|i| self.pages[i].page_number)
    }
}

/// Closed set of supported loaders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Loader {
    /// `.pdf`
    Pdf,
    /// `.docx`
    Docx,
    /// Everything else, which must actually be text
    Text,
}

impl Loader {
    /// Pick a loader from the file extension
    pub fn for_path(path: &Path) -> Self {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match extension.as_str() {
            "pdf" => Self::Pdf,
            "docx" => Self::Docx,
            _ => Self::Text,
        }
    }

    /// Read and parse a file
    pub fn load(&self, path: &Path) -> Result<LoadedDocument> {
        let data = std::fs::read(path)?;
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("document")
            .to_string();
        self.load_bytes(&filename, &data)
    }

    /// Parse in-memory file contents
    pub fn load_bytes(&self, filename: &str, data: &[u8]) -> Result<LoadedDocument> {
        match self {
            Self::Pdf => parse_pdf(filename, data),
            Self::Docx => parse_docx(filename, data),
            Self::Text => parse_text(filename, data),
        }
    }
}

/// Parse PDF page by page, falling back to whole-document extraction
fn parse_pdf(filename: &str, data: &[u8]) -> Result<LoadedDocument> {
    if let Ok(doc) = lopdf::Document::load_mem(data) {
        let pages: Vec<String> = doc
            .get_pages()
            .keys()
            .map(|&n| doc.extract_text(&[n]).unwrap_or_default())
            .collect();

        if pages.iter().any(|p| !p.trim().is_empty()) {
            return Ok(LoadedDocument::paged(filename, pages));
        }
    }

    tracing::debug!(filename, "per-page extraction empty, falling back to pdf-extract");

    let content = pdf_extract::extract_text_from_mem(data)
        .map_err(|e| Error::file_parse(filename, e.to_string()))?;

    if content.trim().is_empty() {
        return Err(Error::file_parse(filename, "no extractable text"));
    }

    let mut doc = LoadedDocument::paged(filename, vec![content]);
    // Page boundaries are unknown here
    doc.pages.clear();
    Ok(doc)
}

/// Parse DOCX paragraphs
fn parse_docx(filename: &str, data: &[u8]) -> Result<LoadedDocument> {
    let doc = docx_rs::read_docx(data).map_err(|e| Error::file_parse(filename, e.to_string()))?;

    let mut content = String::new();

    for child in doc.document.children {
        if let docx_rs::DocumentChild::Paragraph(p) = child {
            for child in p.children {
                if let docx_rs::ParagraphChild::Run(run) = child {
                    for child in run.children {
                        if let docx_rs::RunChild::Text(t) = child {
                            content.push_str(&t.text);
                        }
                    }
                }
            }
            content.push('\n');
        }
    }

    if content.trim().is_empty() {
        return Err(Error::file_parse(filename, "no extractable text"));
    }

    Ok(LoadedDocument::plain(filename, content))
}

/// Parse plain text, refusing binary content
fn parse_text(filename: &str, data: &[u8]) -> Result<LoadedDocument> {
    if data.contains(&0) {
        return Err(Error::unsupported(format!("{} contains binary data", filename)));
    }

    let text = std::str::from_utf8(data)
        .map_err(|_| Error::unsupported(format!("{} is not UTF-8 text", filename)))?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let total = text.chars().count();
    if total > 0 {
        let control = text
            .chars()
            .filter(|c| c.is_control() && !matches!(c, '\n' | '\r' | '\t' | '\u{c}'))
            .count();
        if control as f64 / total as f64 > MAX_CONTROL_RATIO {
            return Err(Error::unsupported(format!("{} does not look like text", filename)));
        }
    }

    Ok(LoadedDocument::plain(filename, text.to_string()))
}

/// SHA-256 of raw file bytes, hex encoded
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
