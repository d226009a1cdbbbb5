//! Recursive text chunking with overlap and page tracking

use std::collections::VecDeque;

use unicode_segmentation::UnicodeSegmentation;

use crate::error::{Error, Result};
use crate::types::{Chunk, ChunkMetadata};

use super::loader::LoadedDocument;

/// Separators tried in order: paragraph, line, sentence, word.
/// Below the last one the text is cut on grapheme boundaries.
const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", "! ", "? ", " "];

/// A byte range of the source text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// Text chunker with configurable size and overlap
#[derive(Debug, Clone)]
pub struct TextChunker {
    /// Target chunk size in characters
    chunk_size: usize,
    /// Overlap between chunks in characters
    overlap: usize,
}

impl TextChunker {
    /// Create a new chunker; `overlap` must be smaller than `chunk_size`
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 || overlap >= chunk_size {
            return Err(Error::Config(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                overlap, chunk_size
            )));
        }
        Ok(Self { chunk_size, overlap })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Chunk a loaded document into ordered, overlapping chunks
    pub fn split(&self, doc_id: &str, doc: &LoadedDocument) -> Vec<Chunk> {
        self.spans(&doc.text)
            .into_iter()
            .filter(|span| !doc.text[span.start..span.end].trim().is_empty())
            .enumerate()
            .map(|(i, span)| {
                Chunk::new(
                    doc_id,
                    i as u32,
                    doc.text[span.start..span.end].to_string(),
                    ChunkMetadata {
                        source: doc.filename.clone(),
                        page: doc.page_at(span.start),
                        char_start: span.start,
                        char_end: span.end,
                    },
                )
            })
            .collect()
    }

    /// Compute chunk boundaries.
    ///
    /// Consecutive spans either touch or overlap by at most `overlap`
    /// characters, and together they cover the whole text.
    pub fn spans(&self, text: &str) -> Vec<Span> {
        if text.is_empty() {
            return Vec::new();
        }

        let mut pieces = Vec::new();
        self.split_recursive(text, 0, text.len(), 0, &mut pieces);
        self.merge(text, pieces)
    }

    /// Break `text[start..end]` into pieces no longer than `chunk_size`
    fn split_recursive(
        &self,
        text: &str,
        start: usize,
        end: usize,
        level: usize,
        out: &mut Vec<Span>,
    ) {
        let slice = &text[start..end];
        if char_len(slice) <= self.chunk_size {
            out.push(Span { start, end });
            return;
        }

        let Some(separator) = SEPARATORS.get(level) else {
            self.split_graphemes(text, start, end, out);
            return;
        };

        let mut segments = Vec::new();
        let mut seg_start = start;
        for (pos, sep) in slice.match_indices(separator) {
            let seg_end = start + pos + sep.len();
            segments.push((seg_start, seg_end));
            seg_start = seg_end;
        }
        if seg_start < end {
            segments.push((seg_start, end));
        }

        for (s, e) in segments {
            self.split_recursive(text, s, e, level + 1, out);
        }
    }

    /// Hard split on grapheme boundaries when no separator fits
    fn split_graphemes(&self, text: &str, start: usize, end: usize, out: &mut Vec<Span>) {
        let mut piece_start = start;
        let mut chars = 0usize;

        for (offset, grapheme) in text[start..end].grapheme_indices(true) {
            let g_chars = grapheme.chars().count();
            if chars + g_chars > self.chunk_size && chars > 0 {
                out.push(Span {
                    start: piece_start,
                    end: start + offset,
                });
                piece_start = start + offset;
                chars = 0;
            }
            chars += g_chars;
        }

        if piece_start < end {
            out.push(Span {
                start: piece_start,
                end,
            });
        }
    }

    /// Greedily merge pieces into chunks, carrying trailing pieces as overlap
    fn merge(&self, text: &str, pieces: Vec<Span>) -> Vec<Span> {
        let mut chunks = Vec::new();
        let mut window: VecDeque<(Span, usize)> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(&text[piece.start..piece.end]);

            if !window.is_empty() && total + len > self.chunk_size {
                chunks.push(window_span(&window));

                // Keep at most `overlap` characters, and leave room for the new piece
                while let Some((_, front_len)) = window.front().copied() {
                    if total > self.overlap || total + len > self.chunk_size {
                        window.pop_front();
                        total -= front_len;
                    } else {
                        break;
                    }
                }
            }

            window.push_back((piece, len));
            total += len;
        }

        if !window.is_empty() {
            chunks.push(window_span(&window));
        }

        chunks
    }
}

fn window_span(window: &VecDeque<(Span, usize)>) -> Span {
    let start = window.front().map(|(s, _)| s.start).unwrap_or(0);
    let end = window.back().map(|(s, _)| s.end).unwrap_or(start);
    Span { start, end }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}
