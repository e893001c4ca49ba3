//! Data types for documents, pages, chunks, and search results.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A source document split into pages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Identifier of the document: its path relative to the source directory.
    pub id: String,
    /// Absolute or caller-supplied path of the file the document was read from.
    pub source_path: PathBuf,
    /// Pages in reading order.
    pub pages: Vec<Page>,
}

impl Document {
    /// Build a document from page texts, numbering pages from 1.
    ///
    /// Blank pages are skipped but keep their slot in the numbering.
    pub fn from_page_texts<I, S>(id: impl Into<String>, source_path: impl Into<PathBuf>, texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id = id.into();
        let source_path = source_path.into();
        let pages = texts
            .into_iter()
            .enumerate()
            .map(|(i, text)| Page {
                text: text.into(),
                page_number: i + 1,
                document_id: id.clone(),
                source_path: source_path.clone(),
            })
            .filter(|page| !page.text.trim().is_empty())
            .collect();
        Self { id, source_path, pages }
    }

    /// Total number of characters across all pages.
    pub fn char_count(&self) -> usize {
        self.pages.iter().map(|p| p.text.chars().count()).sum()
    }
}

/// One page of a [`Document`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Page {
    /// The text content of the page.
    pub text: String,
    /// 1-based page number within the document.
    pub page_number: usize,
    /// The ID of the owning [`Document`].
    pub document_id: String,
    /// Path of the file the page came from.
    pub source_path: PathBuf,
}

/// A bounded text window cut from a [`Document`], the unit of embedding and retrieval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Unique identifier, `{document_id}#{chunk_index}`.
    pub id: String,
    /// The text content of the chunk.
    pub text: String,
    /// Character offset of the chunk within its page (or the merged document
    /// text when pages are merged). `None` when offset tracking is disabled.
    pub start_index: Option<usize>,
    /// The ID of the parent [`Document`].
    pub document_id: String,
    /// Path of the source file.
    pub source_path: PathBuf,
    /// Page containing the first character of the chunk.
    pub page_number: usize,
    /// Position of the chunk within its document.
    pub chunk_index: usize,
}

/// A retrieved [`Chunk`] paired with a relevance score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// Cosine similarity to the query (higher is more relevant).
    pub score: f32,
}
