//! `StorageHandle`: bootstraps and owns an index directory's on-disk state
//! — the manifest, the metadata store, segment/CSR caches, and the
//! cross-process lock — and performs orphan segment cleanup on open.

use crate::cache::{CsrMatrixCache, SegmentReaderCache};
use crate::format::manifest::{ManifestError, ManifestManager};
use crate::lock::{IndexLock, LockError};
use crate::meta::{MetaStoreError, MetadataStore};
use parking_lot::Mutex;
use recollex_core::OpenOptions;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Errors raised opening an index directory.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Manifest could not be read or written.
    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),

    /// Metadata store could not be opened.
    #[error("metadata store error: {0}")]
    Meta(#[from] MetaStoreError),

    /// The manifest lock could not be acquired.
    #[error("lock error: {0}")]
    Lock(#[from] LockError),

    /// Underlying filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Filesystem paths making up an index directory, mirroring the layout
/// documented in spec section 6.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    /// The index's root directory.
    pub root: PathBuf,
    /// `manifest.json`.
    pub manifest: PathBuf,
    /// `segments/`.
    pub segments_dir: PathBuf,
    /// `meta.sqlite`.
    pub meta_db: PathBuf,
}

impl StoragePaths {
    /// Compute the standard paths for an index rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        StoragePaths {
            manifest: root.join("manifest.json"),
            segments_dir: root.join("segments"),
            meta_db: root.join("meta.sqlite"),
            root,
        }
    }
}

/// Owns every on-disk resource for one open index directory.
pub struct StorageHandle {
    /// Paths computed for this index directory.
    pub paths: StoragePaths,
    /// The manifest manager. Mutexed rather than exclusively `&mut`-owned: a
    /// flush or compaction takes it briefly to append/replace segments while
    /// concurrent readers only need a short-lived lock to snapshot it.
    pub manifest: Mutex<ManifestManager>,
    /// The metadata store.
    pub meta: MetadataStore,
    /// Open-segment-reader cache.
    pub reader_cache: SegmentReaderCache,
    /// Decoded-CSR cache.
    pub csr_cache: CsrMatrixCache,
    /// Held for the lifetime of this handle when this process is acting as
    /// the writer; `None` for a read-only handle.
    pub write_lock: Option<IndexLock>,
}

impl StorageHandle {
    /// Open (creating if absent) the index directory at `root`, acquiring
    /// the write lock and running orphan segment GC.
    pub fn open(root: impl Into<PathBuf>, options: &OpenOptions) -> Result<StorageHandle, StorageError> {
        let paths = StoragePaths::new(root);
        fs::create_dir_all(&paths.root)?;
        fs::create_dir_all(&paths.segments_dir)?;

        let write_lock = IndexLock::acquire(&paths.root, options.lock_timeout, options.force_pid_lock)?;

        let manifest = if ManifestManager::exists(&paths.manifest) {
            ManifestManager::load(paths.manifest.clone())?
        } else {
            ManifestManager::create(paths.manifest.clone())?
        };

        let meta = MetadataStore::open(&paths.meta_db, options.bitmap_cache_entries)?;

        gc_orphans(&paths.segments_dir, &manifest)?;

        Ok(StorageHandle {
            paths,
            manifest: Mutex::new(manifest),
            meta,
            reader_cache: SegmentReaderCache::new(options.segment_reader_cache_entries),
            csr_cache: CsrMatrixCache::new(options.csr_cache_entries, options.csr_cache_bytes),
            write_lock: Some(write_lock),
        })
    }
}

/// Reconcile `segments_dir`'s contents against the manifest: delete stale
/// `*.tmp` directories left by an interrupted flush, and delete segment
/// directories that exist on disk but are not referenced by the manifest
/// (the result of a crash between segment rename and manifest rename).
fn gc_orphans(segments_dir: &Path, manifest: &ManifestManager) -> Result<(), StorageError> {
    let known: HashSet<&str> = manifest
        .manifest()
        .segments
        .iter()
        .map(|s| s.name.as_str())
        .collect();

    for entry in fs::read_dir(segments_dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let name = name.to_string_lossy();

        if name.ends_with(".tmp") {
            warn!(segment = %name, "removing stale tmp segment directory on open");
            fs::remove_dir_all(&path)?;
            continue;
        }
        if !known.contains(name.as_ref()) {
            warn!(segment = %name, "removing orphan segment directory not referenced by manifest");
            fs::remove_dir_all(&path)?;
            continue;
        }
        info!(segment = %name, "segment present and referenced by manifest");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::SegmentWriter;
    use tempfile::tempdir;

    #[test]
    fn test_open_creates_layout() {
        let dir = tempdir().unwrap();
        let handle = StorageHandle::open(dir.path(), &OpenOptions::for_testing()).unwrap();
        assert!(handle.paths.manifest.exists());
        assert!(handle.paths.segments_dir.is_dir());
        assert!(handle.paths.meta_db.exists());
    }

    #[test]
    fn test_open_gcs_stale_tmp_dir() {
        let dir = tempdir().unwrap();
        let segments_dir = dir.path().join("segments");
        fs::create_dir_all(segments_dir.join("seg_000.tmp")).unwrap();

        let handle = StorageHandle::open(dir.path(), &OpenOptions::for_testing()).unwrap();
        assert!(!handle.paths.segments_dir.join("seg_000.tmp").exists());
    }

    #[test]
    fn test_open_gcs_orphan_segment_not_in_manifest() {
        let dir = tempdir().unwrap();
        let segments_dir = dir.path().join("segments");
        fs::create_dir_all(&segments_dir).unwrap();
        let mut w = SegmentWriter::new();
        w.add_row(1, &[1], &[1.0]);
        w.publish(&segments_dir, "seg_orphan").unwrap();

        // No manifest yet, so this is created fresh with no known segments;
        // `seg_orphan` is unreferenced and must be cleaned up.
        let handle = StorageHandle::open(dir.path(), &OpenOptions::for_testing()).unwrap();
        assert!(!handle.paths.segments_dir.join("seg_orphan").exists());
    }

    #[test]
    fn test_open_keeps_segment_referenced_by_manifest() {
        let dir = tempdir().unwrap();
        let segments_dir = dir.path().join("segments");
        fs::create_dir_all(&segments_dir).unwrap();
        let mut w = SegmentWriter::new();
        w.add_row(1, &[1], &[1.0]);
        w.publish(&segments_dir, "seg_000").unwrap();

        let mut manifest = ManifestManager::create(dir.path().join("manifest.json")).unwrap();
        manifest.append_segment("seg_000".to_string(), 1, 10).unwrap();
        drop(manifest);

        let handle = StorageHandle::open(dir.path(), &OpenOptions::for_testing()).unwrap();
        assert!(handle.paths.segments_dir.join("seg_000").exists());
    }
}
