//! On-disk persistence for [`VectorIndex`].
//!
//! An index path is a directory holding immutable version directories and a
//! `CURRENT` pointer naming the live one:
//!
//! ```text
//! <path>/CURRENT
//! <path>/v-20250101T120000.000Z-1a2b3c4d/manifest.json
//! <path>/v-20250101T120000.000Z-1a2b3c4d/entries.bin
//! ```
//!
//! [`save`] writes a complete new version, then replaces `CURRENT` with an
//! atomic rename. A concurrent [`load`] therefore sees either the old index or
//! the new one, never a partial write. The previous version is kept so readers
//! that resolved `CURRENT` just before the swap can still finish.
//!
//! Both functions do synchronous, fsynced file I/O.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::embedding::EmbeddingModelInfo;
use crate::error::{RagError, Result};
use crate::index::{IndexEntry, Metric, VectorIndex};

const CURRENT_FILE: &str = "CURRENT";
const MANIFEST_FILE: &str = "manifest.json";
const ENTRIES_FILE: &str = "entries.bin";
const VERSION_PREFIX: &str = "v-";

/// Current on-disk format version.
pub const FORMAT_VERSION: u32 = 1;

/// Metadata stored next to the encoded entries of one index version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexManifest {
    /// On-disk format version.
    pub format_version: u32,
    /// Collection name.
    pub collection: String,
    /// Model that produced every vector.
    pub model: EmbeddingModelInfo,
    /// Similarity metric.
    pub metric: Metric,
    /// Number of encoded entries.
    pub entry_count: usize,
    /// When the version was written.
    pub created_at: DateTime<Utc>,
    /// Hex SHA-256 of `entries.bin`.
    pub entries_sha256: String,
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = fs::File::create(path).map_err(|e| RagError::io(path, e))?;
    file.write_all(bytes).map_err(|e| RagError::io(path, e))?;
    file.sync_all().map_err(|e| RagError::io(path, e))
}

fn read_current(path: &Path) -> Option<String> {
    fs::read_to_string(path.join(CURRENT_FILE)).ok().map(|s| s.trim().to_string())
}

/// Persist `index` under `path`, replacing whatever index was there.
///
/// Returns the directory of the newly written version.
///
/// # Errors
///
/// Returns [`RagError::Io`] if any file cannot be written. On error the
/// previously live version, if any, stays current.
pub fn save(index: &VectorIndex, path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    fs::create_dir_all(path).map_err(|e| RagError::io(path, e))?;

    let previous = read_current(path);
    let version = format!(
        "{VERSION_PREFIX}{}-{}",
        Utc::now().format("%Y%m%dT%H%M%S%.3fZ"),
        &uuid::Uuid::new_v4().simple().to_string()[..8]
    );
    let version_dir = path.join(&version);
    fs::create_dir(&version_dir).map_err(|e| RagError::io(&version_dir, e))?;

    let bytes = bincode::serialize(index.entries())
        .map_err(|e| RagError::corrupt(path, format!("cannot encode entries: {e}")))?;
    write_synced(&version_dir.join(ENTRIES_FILE), &bytes)?;

    let manifest = IndexManifest {
        format_version: FORMAT_VERSION,
        collection: index.collection().to_string(),
        model: index.model().clone(),
        metric: index.metric(),
        entry_count: index.len(),
        created_at: Utc::now(),
        entries_sha256: sha256_hex(&bytes),
    };
    let manifest_json = serde_json::to_vec_pretty(&manifest)
        .map_err(|e| RagError::corrupt(path, format!("cannot encode manifest: {e}")))?;
    write_synced(&version_dir.join(MANIFEST_FILE), &manifest_json)?;

    // Swap the pointer: temp file in the same directory, then rename over CURRENT.
    let mut pointer = tempfile::NamedTempFile::new_in(path).map_err(|e| RagError::io(path, e))?;
    pointer.write_all(version.as_bytes()).map_err(|e| RagError::io(pointer.path(), e))?;
    pointer.as_file().sync_all().map_err(|e| RagError::io(pointer.path(), e))?;
    let current = path.join(CURRENT_FILE);
    pointer.persist(&current).map_err(|e| RagError::io(&current, e.error))?;

    prune_versions(path, &version, previous.as_deref());

    info!(
        path = %path.display(),
        version = %version,
        collection = %manifest.collection,
        entries = manifest.entry_count,
        "saved vector index"
    );
    Ok(version_dir)
}

/// Remove version directories other than the live one and its predecessor.
fn prune_versions(path: &Path, live: &str, previous: Option<&str>) {
    let Ok(dir) = fs::read_dir(path) else { return };
    for entry in dir.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with(VERSION_PREFIX) || name == live || Some(name.as_str()) == previous {
            continue;
        }
        match fs::remove_dir_all(entry.path()) {
            Ok(()) => debug!(version = %name, "pruned stale index version"),
            Err(e) => warn!(version = %name, error = %e, "failed to prune stale index version"),
        }
    }
}

/// Resolve `CURRENT` to the live version directory.
fn live_version_dir(path: &Path) -> Result<PathBuf> {
    if !path.is_dir() || !path.join(CURRENT_FILE).is_file() {
        return Err(RagError::IndexNotFound(path.to_path_buf()));
    }
    let version = read_current(path)
        .ok_or_else(|| RagError::corrupt(path, "CURRENT is unreadable"))?;
    if !version.starts_with(VERSION_PREFIX) || version.contains(['/', '\\']) || version.contains("..") {
        return Err(RagError::corrupt(path, format!("CURRENT names an invalid version '{version}'")));
    }
    let version_dir = path.join(&version);
    if !version_dir.is_dir() {
        return Err(RagError::corrupt(path, format!("CURRENT points to missing version '{version}'")));
    }
    Ok(version_dir)
}

/// Read the manifest of the live index version without decoding entries.
///
/// # Errors
///
/// Same as [`load`] for the pointer and manifest checks.
pub fn read_manifest(path: impl AsRef<Path>) -> Result<IndexManifest> {
    let path = path.as_ref();
    read_manifest_in(path, &live_version_dir(path)?)
}

fn read_manifest_in(path: &Path, version_dir: &Path) -> Result<IndexManifest> {
    let raw = fs::read(version_dir.join(MANIFEST_FILE))
        .map_err(|e| RagError::corrupt(path, format!("cannot read manifest: {e}")))?;
    let manifest: IndexManifest = serde_json::from_slice(&raw)
        .map_err(|e| RagError::corrupt(path, format!("invalid manifest: {e}")))?;
    if manifest.format_version != FORMAT_VERSION {
        return Err(RagError::corrupt(
            path,
            format!("unsupported format version {} (expected {FORMAT_VERSION})", manifest.format_version),
        ));
    }
    Ok(manifest)
}

/// Load the live index stored under `path`.
///
/// # Errors
///
/// - [`RagError::IndexNotFound`] if `path` holds no index.
/// - [`RagError::IndexCorrupt`] if the pointer, manifest or entries are
///   unreadable or disagree with each other (checksum, entry count, or
///   vector dimensions).
pub fn load(path: impl AsRef<Path>) -> Result<VectorIndex> {
    let path = path.as_ref();
    // Resolve CURRENT once so a concurrent save cannot mix two versions.
    let version_dir = live_version_dir(path)?;
    let manifest = read_manifest_in(path, &version_dir)?;

    let bytes = fs::read(version_dir.join(ENTRIES_FILE))
        .map_err(|e| RagError::corrupt(path, format!("cannot read entries: {e}")))?;
    let checksum = sha256_hex(&bytes);
    if checksum != manifest.entries_sha256 {
        return Err(RagError::corrupt(path, "entries checksum does not match manifest"));
    }

    let entries: Vec<IndexEntry> = bincode::deserialize(&bytes)
        .map_err(|e| RagError::corrupt(path, format!("cannot decode entries: {e}")))?;
    if entries.len() != manifest.entry_count {
        return Err(RagError::corrupt(
            path,
            format!("manifest lists {} entries, found {}", manifest.entry_count, entries.len()),
        ));
    }
    if let Some(bad) = entries.iter().find(|e| e.vector.len() != manifest.model.dimensions) {
        return Err(RagError::corrupt(
            path,
            format!(
                "entry '{}' has {} dimensions, index expects {}",
                bad.chunk.id,
                bad.vector.len(),
                manifest.model.dimensions
            ),
        ));
    }

    info!(
        path = %path.display(),
        collection = %manifest.collection,
        entries = entries.len(),
        model = %manifest.model,
        "loaded vector index"
    );
    Ok(VectorIndex::from_parts(manifest.collection, manifest.model, entries))
}
