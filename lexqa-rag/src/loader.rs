//! Source document loading.
//!
//! [`DirectoryLoader`] walks a directory, picks up files with a supported
//! extension and turns each into a [`Document`] of page records. PDFs are
//! converted with poppler's `pdftotext`, whose output separates pages with a
//! form feed; plain-text files use the same convention and are a single page
//! when they contain none.
//!
//! Loading blocks on file reads and the `pdftotext` subprocess; async callers
//! run it under `tokio::task::spawn_blocking`.

use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::document::Document;
use crate::error::{RagError, Result};

const PAGE_BREAK: char = '\u{c}';

/// Options controlling which files are loaded and how failures are handled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoaderConfig {
    /// File extensions to load, without the leading dot. Matched case-insensitively.
    pub extensions: Vec<String>,
    /// Descend into subdirectories.
    pub recursive: bool,
    /// Abort on the first file that fails instead of skipping it.
    pub strict: bool,
    /// The `pdftotext` executable.
    pub pdftotext_bin: PathBuf,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            extensions: vec!["pdf".to_string(), "txt".to_string(), "md".to_string()],
            recursive: false,
            strict: false,
            pdftotext_bin: PathBuf::from("pdftotext"),
        }
    }
}

/// A file that could not be loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadFailure {
    /// The offending file.
    pub path: PathBuf,
    /// Why it failed.
    pub message: String,
}

/// Outcome of loading a directory.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// Successfully loaded documents, in path order.
    pub documents: Vec<Document>,
    /// Files that were skipped.
    pub failures: Vec<LoadFailure>,
}

impl LoadReport {
    /// Total number of pages across all loaded documents.
    pub fn page_count(&self) -> usize {
        self.documents.iter().map(|d| d.pages.len()).sum()
    }
}

/// Loads supported documents from a directory. Read-only.
#[derive(Debug, Clone, Default)]
pub struct DirectoryLoader {
    config: LoaderConfig,
}

impl DirectoryLoader {
    /// Create a loader with the given options.
    pub fn new(config: LoaderConfig) -> Self {
        Self { config }
    }

    /// The loader options.
    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Load every supported file under `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Load`] if `dir` is not a readable directory, if no
    /// file has a supported extension, if every matching file failed, or (in
    /// strict mode) on the first file that fails.
    pub fn load(&self, dir: impl AsRef<Path>) -> Result<LoadReport> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(RagError::Load {
                path: dir.to_path_buf(),
                message: "source directory does not exist or is not a directory".to_string(),
            });
        }

        let files = self.discover(dir)?;
        if files.is_empty() {
            return Err(RagError::Load {
                path: dir.to_path_buf(),
                message: format!(
                    "no files with a supported extension ({})",
                    self.config.extensions.join(", ")
                ),
            });
        }

        let mut report = LoadReport::default();
        for path in files {
            match self.load_file(dir, &path) {
                Ok(document) => {
                    debug!(document.id = %document.id, pages = document.pages.len(), "loaded document");
                    report.documents.push(document);
                }
                Err(message) if self.config.strict => {
                    return Err(RagError::Load { path, message });
                }
                Err(message) => {
                    warn!(path = %path.display(), %message, "skipping document");
                    report.failures.push(LoadFailure { path, message });
                }
            }
        }

        if report.documents.is_empty() {
            return Err(RagError::Load {
                path: dir.to_path_buf(),
                message: format!("all {} matching files failed to load", report.failures.len()),
            });
        }

        info!(
            documents = report.documents.len(),
            pages = report.page_count(),
            failures = report.failures.len(),
            "loaded source directory"
        );
        Ok(report)
    }

    fn discover(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let walker = if self.config.recursive {
            WalkDir::new(dir)
        } else {
            WalkDir::new(dir).max_depth(1)
        };

        let mut files = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|e| RagError::Load {
                path: e.path().map_or_else(|| dir.to_path_buf(), Path::to_path_buf),
                message: format!("cannot read directory entry: {e}"),
            })?;
            if entry.file_type().is_file() && self.is_supported(entry.path()) {
                files.push(entry.into_path());
            }
        }

        files.sort();
        Ok(files)
    }

    fn is_supported(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.config.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
    }

    fn load_file(&self, root: &Path, path: &Path) -> std::result::Result<Document, String> {
        let is_pdf = path.extension().and_then(|e| e.to_str()).is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
        let text = if is_pdf {
            self.extract_pdf_text(path)?
        } else {
            std::fs::read_to_string(path).map_err(|e| format!("cannot read file: {e}"))?
        };

        let id = document_id(root, path);
        let document = Document::from_page_texts(id, path, text.split(PAGE_BREAK));
        if document.pages.is_empty() {
            return Err("document contains no text".to_string());
        }
        Ok(document)
    }

    fn extract_pdf_text(&self, path: &Path) -> std::result::Result<String, String> {
        let output = Command::new(&self.config.pdftotext_bin)
            .arg("-layout")
            .arg("-enc")
            .arg("UTF-8")
            .arg(path)
            .arg("-")
            .output()
            .map_err(|e| {
                format!(
                    "failed to run {}: {e} (is poppler installed?)",
                    self.config.pdftotext_bin.display()
                )
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!("pdftotext failed: {}", stderr.trim()));
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        if text.trim().is_empty() {
            return Err("pdftotext produced no text output".to_string());
        }
        Ok(text)
    }
}

/// The document id is its path relative to the source root, `/`-separated.
fn document_id(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
