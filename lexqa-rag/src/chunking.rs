//! Document chunking strategies.
//!
//! This module provides the [`Chunker`] trait and two implementations:
//!
//! - [`FixedSizeChunker`]: slides a fixed character window with configurable overlap
//! - [`RecursiveChunker`]: splits hierarchically by paragraphs, lines, words, then characters
//!
//! All sizes and offsets are counted in characters, not bytes, so multi-byte
//! text never gets cut inside a code point.

use serde::{Deserialize, Serialize};

use crate::document::{Chunk, Document, Page};
use crate::error::{RagError, Result};

/// A strategy for splitting documents into chunks.
///
/// Implementations must be deterministic: the same document and
/// configuration always produce the same chunks in the same order.
pub trait Chunker: Send + Sync {
    /// Split a document into chunks.
    ///
    /// Returns an empty `Vec` if the document has no text.
    fn chunk(&self, document: &Document) -> Vec<Chunk>;
}

/// Chunk every document in order, concatenating the results.
pub fn chunk_documents(chunker: &dyn Chunker, documents: &[Document]) -> Vec<Chunk> {
    documents.iter().flat_map(|doc| chunker.chunk(doc)).collect()
}

/// Selects which [`Chunker`] the pipeline builds from its configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkingStrategy {
    /// [`FixedSizeChunker`].
    #[default]
    Fixed,
    /// [`RecursiveChunker`].
    Recursive,
}

/// Reject sizes that would drop text: a window must advance on every step.
fn check_sizes(chunk_size: usize, chunk_overlap: usize) -> Result<()> {
    if chunk_size == 0 {
        return Err(RagError::Config("chunk_size must be greater than zero".to_string()));
    }
    if chunk_overlap >= chunk_size {
        return Err(RagError::Config(format!(
            "chunk_overlap ({chunk_overlap}) must be less than chunk_size ({chunk_size})"
        )));
    }
    Ok(())
}

/// Byte offsets of every char boundary in `text`, including `text.len()`.
fn char_boundaries(text: &str) -> Vec<usize> {
    text.char_indices().map(|(i, _)| i).chain(std::iter::once(text.len())).collect()
}

/// Splits text into fixed-size windows by character count.
///
/// The window advances by `chunk_size - chunk_overlap`, so consecutive
/// chunks from the same page share exactly `chunk_overlap` characters.
/// Splitting stops as soon as a window reaches the end of the text, so the
/// final chunk is never empty or entirely contained in its predecessor.
/// Windows never span two pages unless
/// [`with_merged_pages`](Self::with_merged_pages) is enabled.
///
/// Windows holding only whitespace are skipped, since blank text cannot be
/// embedded. The chunks on either side of a skipped window are then further
/// apart than one step and do not overlap.
///
/// Chunk IDs are generated as `{document_id}#{chunk_index}`.
///
/// # Example
///
/// ```rust,ignore
/// use lexqa_rag::FixedSizeChunker;
///
/// let chunker = FixedSizeChunker::new(1000, 200)?;
/// let chunks = chunker.chunk(&document);
/// ```
#[derive(Debug, Clone)]
pub struct FixedSizeChunker {
    chunk_size: usize,
    chunk_overlap: usize,
    track_start_index: bool,
    merge_pages: bool,
}

impl FixedSizeChunker {
    /// Create a new `FixedSizeChunker`.
    ///
    /// # Arguments
    ///
    /// * `chunk_size`: maximum number of characters per chunk
    /// * `chunk_overlap`: number of overlapping characters between consecutive chunks
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if `chunk_size` is zero or
    /// `chunk_overlap >= chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        check_sizes(chunk_size, chunk_overlap)?;
        Ok(Self { chunk_size, chunk_overlap, track_start_index: true, merge_pages: false })
    }

    /// Record (or omit) each chunk's character offset.
    pub fn with_start_index(mut self, enabled: bool) -> Self {
        self.track_start_index = enabled;
        self
    }

    /// Treat all pages of a document as one text, joined by `\n`.
    pub fn with_merged_pages(mut self, enabled: bool) -> Self {
        self.merge_pages = enabled;
        self
    }

    /// Cut `text` into `(char_start, window)` pairs.
    fn windows<'a>(&self, text: &'a str) -> Vec<(usize, &'a str)> {
        let bounds = char_boundaries(text);
        let len = bounds.len() - 1;
        let step = self.chunk_size - self.chunk_overlap;
        let mut windows = Vec::new();
        let mut start = 0;

        while start < len {
            let end = (start + self.chunk_size).min(len);
            windows.push((start, &text[bounds[start]..bounds[end]]));
            if end == len {
                break;
            }
            start += step;
        }

        windows
    }

    fn make_chunk(&self, document: &Document, page_number: usize, index: usize, start: usize, text: &str) -> Chunk {
        Chunk {
            id: format!("{}#{index}", document.id),
            text: text.to_string(),
            start_index: self.track_start_index.then_some(start),
            document_id: document.id.clone(),
            source_path: document.source_path.clone(),
            page_number,
            chunk_index: index,
        }
    }

    fn chunk_pages(&self, document: &Document) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for page in &document.pages {
            for (start, text) in self.windows(&page.text) {
                if text.trim().is_empty() {
                    continue;
                }
                let index = chunks.len();
                chunks.push(self.make_chunk(document, page.page_number, index, start, text));
            }
        }
        chunks
    }

    fn chunk_merged(&self, document: &Document) -> Vec<Chunk> {
        let (merged, page_starts) = merge_page_texts(&document.pages);
        let mut chunks = Vec::new();
        for (start, text) in self.windows(&merged) {
            if text.trim().is_empty() {
                continue;
            }
            let page_number = page_starts
                .iter()
                .rev()
                .find(|(page_start, _)| *page_start <= start)
                .map_or(1, |(_, number)| *number);
            let index = chunks.len();
            chunks.push(self.make_chunk(document, page_number, index, start, text));
        }
        chunks
    }
}

/// Join page texts with `\n`, returning the merged text and each page's
/// starting character offset paired with its page number.
fn merge_page_texts(pages: &[Page]) -> (String, Vec<(usize, usize)>) {
    let mut merged = String::new();
    let mut starts = Vec::with_capacity(pages.len());
    let mut offset = 0;
    for (i, page) in pages.iter().enumerate() {
        if i > 0 {
            merged.push('\n');
            offset += 1;
        }
        starts.push((offset, page.page_number));
        merged.push_str(&page.text);
        offset += page.text.chars().count();
    }
    (merged, starts)
}

impl Chunker for FixedSizeChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        if document.pages.is_empty() {
            return Vec::new();
        }
        if self.merge_pages { self.chunk_merged(document) } else { self.chunk_pages(document) }
    }
}

/// Splits text hierarchically: paragraphs → lines → words → characters.
///
/// Text is split on the first separator from `["\n\n", "\n", " ", ""]` that
/// occurs in it. Pieces are merged greedily up to `chunk_size`; when a chunk
/// is emitted, its trailing pieces totalling at most `chunk_overlap`
/// characters carry over into the next one. Pieces longer than `chunk_size`
/// are split again with the next separator. Chunks are whitespace-trimmed and
/// never cross page boundaries.
///
/// # Example
///
/// ```rust,ignore
/// use lexqa_rag::RecursiveChunker;
///
/// let chunker = RecursiveChunker::new(1000, 200)?;
/// let chunks = chunker.chunk(&document);
/// ```
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    chunk_size: usize,
    chunk_overlap: usize,
    track_start_index: bool,
}

const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

fn char_len(s: &str) -> usize {
    s.chars().count()
}

impl RecursiveChunker {
    /// Create a new `RecursiveChunker`.
    ///
    /// # Arguments
    ///
    /// * `chunk_size`: maximum number of characters per chunk
    /// * `chunk_overlap`: number of overlapping characters between consecutive chunks
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if `chunk_size` is zero or
    /// `chunk_overlap >= chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        check_sizes(chunk_size, chunk_overlap)?;
        Ok(Self { chunk_size, chunk_overlap, track_start_index: true })
    }

    /// Record (or omit) each chunk's character offset.
    pub fn with_start_index(mut self, enabled: bool) -> Self {
        self.track_start_index = enabled;
        self
    }

    fn split_text(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let (position, separator) = separators
            .iter()
            .enumerate()
            .find(|(_, sep)| sep.is_empty() || text.contains(**sep))
            .map_or((separators.len(), ""), |(i, sep)| (i, *sep));
        let remaining = separators.get(position + 1..).unwrap_or(&[]);

        let pieces: Vec<String> = if separator.is_empty() {
            text.chars().map(String::from).collect()
        } else {
            text.split(separator).filter(|s| !s.is_empty()).map(str::to_string).collect()
        };

        let mut chunks = Vec::new();
        let mut fitting: Vec<String> = Vec::new();
        for piece in pieces {
            if char_len(&piece) <= self.chunk_size {
                fitting.push(piece);
                continue;
            }
            if !fitting.is_empty() {
                chunks.extend(self.merge(&fitting, separator));
                fitting.clear();
            }
            if remaining.is_empty() {
                chunks.push(piece);
            } else {
                chunks.extend(self.split_text(&piece, remaining));
            }
        }
        if !fitting.is_empty() {
            chunks.extend(self.merge(&fitting, separator));
        }
        chunks
    }

    /// Greedily join pieces with `separator` into chunks of at most `chunk_size`.
    fn merge(&self, pieces: &[String], separator: &str) -> Vec<String> {
        let sep_len = char_len(separator);
        let mut chunks = Vec::new();
        let mut current: std::collections::VecDeque<&str> = std::collections::VecDeque::new();
        let mut total = 0;

        for piece in pieces {
            let len = char_len(piece);
            let joiner = if current.is_empty() { 0 } else { sep_len };
            if total + len + joiner > self.chunk_size && !current.is_empty() {
                push_trimmed(&mut chunks, &current, separator);
                // Shed leading pieces until only the overlap remains and the next piece fits.
                loop {
                    let joiner = if current.is_empty() { 0 } else { sep_len };
                    let overflows = total > 0 && total + len + joiner > self.chunk_size;
                    if total <= self.chunk_overlap && !overflows {
                        break;
                    }
                    let Some(front) = current.pop_front() else { break };
                    let shed_joiner = if current.is_empty() { 0 } else { sep_len };
                    total -= char_len(front) + shed_joiner;
                }
            }
            let joiner = if current.is_empty() { 0 } else { sep_len };
            current.push_back(piece);
            total += len + joiner;
        }
        push_trimmed(&mut chunks, &current, separator);
        chunks
    }

    fn chunk_page(&self, page: &Page) -> Vec<(Option<usize>, String)> {
        let texts = self.split_text(&page.text, &SEPARATORS);
        let mut located = Vec::with_capacity(texts.len());
        let mut previous: Option<(usize, usize)> = None;

        for text in texts {
            let from = previous
                .map_or(0, |(start, len)| (start + len).saturating_sub(self.chunk_overlap));
            let start = find_from_char(&page.text, &text, from);
            if let Some(start) = start {
                previous = Some((start, char_len(&text)));
            }
            located.push((start, text));
        }
        located
    }
}

fn push_trimmed(chunks: &mut Vec<String>, current: &std::collections::VecDeque<&str>, separator: &str) {
    let joined = current.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

/// Find `needle` in `haystack` at or after character offset `from`,
/// returning the character offset of the match.
fn find_from_char(haystack: &str, needle: &str, from: usize) -> Option<usize> {
    let byte_from = haystack.char_indices().nth(from).map_or(haystack.len(), |(i, _)| i);
    haystack[byte_from..].find(needle).map(|pos| from + char_len(&haystack[byte_from..byte_from + pos]))
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for page in &document.pages {
            for (start, text) in self.chunk_page(page) {
                let index = chunks.len();
                chunks.push(Chunk {
                    id: format!("{}#{index}", document.id),
                    text,
                    start_index: if self.track_start_index { start } else { None },
                    document_id: document.id.clone(),
                    source_path: document.source_path.clone(),
                    page_number: page.page_number,
                    chunk_index: index,
                });
            }
        }
        chunks
    }
}
