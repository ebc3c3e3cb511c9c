//! manifest.json format
//!
//! The manifest enumerates segments and declares the index's global `dims`.
//! Unlike most of the teacher's binary formats, spec section 6 requires this
//! file to be plain JSON with forward-compatible unknown-field handling, so
//! we keep the teacher's write-tmp/fsync/rename persistence lifecycle and
//! `ManifestManager` API shape but serialize with `serde_json` instead of a
//! length-prefixed binary encoding.
//!
//! ```text
//! { "version": 1, "dims": 30522, "segments": [ { "name": "seg_000", "rows": [0, 128] } ] }
//! ```

use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Current manifest format version. Readers reject any other value.
pub const MANIFEST_FORMAT_VERSION: u32 = 1;

/// One segment's global row range, `[start_row, end_row)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowRange {
    /// Inclusive start of this segment's global row range.
    pub start_row: u64,
    /// Exclusive end of this segment's global row range.
    pub end_row: u64,
}

impl RowRange {
    /// Number of rows covered by this range.
    pub fn len(&self) -> u64 {
        self.end_row - self.start_row
    }

    /// True if this range covers no rows.
    pub fn is_empty(&self) -> bool {
        self.start_row == self.end_row
    }
}

/// One segment's manifest entry: its directory name and global row range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentRecord {
    /// Segment directory name under `segments/`, e.g. `"seg_000"`.
    pub name: String,
    /// Global row range this segment occupies.
    pub rows: RowRange,
}

/// The manifest: declared dimensionality and the ordered list of segments.
/// `rows` ranges are contiguous and define segment ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Format version; must equal [`MANIFEST_FORMAT_VERSION`].
    pub version: u32,
    /// Global vector dimensionality, fixed at the first segment write.
    pub dims: u32,
    /// Segments in row order.
    pub segments: Vec<SegmentRecord>,
}

impl Manifest {
    /// A fresh manifest with no segments. `dims` is not yet known and is
    /// stamped in on the first segment write.
    pub fn new() -> Self {
        Manifest {
            version: MANIFEST_FORMAT_VERSION,
            dims: 0,
            segments: Vec::new(),
        }
    }

    /// Next contiguous global row number after the last segment, i.e. the
    /// start row a newly appended segment would receive.
    pub fn next_row(&self) -> u64 {
        self.segments
            .last()
            .map(|s| s.rows.end_row)
            .unwrap_or(0)
    }

    /// Total row count across all segments.
    pub fn total_rows(&self) -> u64 {
        self.next_row()
    }

    /// Serialize to the on-disk JSON representation.
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec_pretty(self).expect("Manifest serialization is infallible")
    }

    /// Parse from bytes written by `to_bytes`. Unknown fields are ignored;
    /// a `version` other than [`MANIFEST_FORMAT_VERSION`] is rejected.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ManifestError> {
        let manifest: Manifest = serde_json::from_slice(bytes)?;
        if manifest.version != MANIFEST_FORMAT_VERSION {
            return Err(ManifestError::UnsupportedVersion(manifest.version));
        }
        Ok(manifest)
    }
}

impl Default for Manifest {
    fn default() -> Self {
        Manifest::new()
    }
}

/// Manifest persistence manager: owns the in-memory `Manifest` and its path,
/// and performs atomic write-tmp/fsync/rename persistence.
pub struct ManifestManager {
    path: PathBuf,
    manifest: Manifest,
}

impl ManifestManager {
    /// Create a brand new manifest at `path` (for a fresh index directory).
    pub fn create(path: PathBuf) -> Result<Self, ManifestError> {
        let manager = ManifestManager {
            path,
            manifest: Manifest::new(),
        };
        manager.persist()?;
        Ok(manager)
    }

    /// Load an existing manifest from `path`.
    pub fn load(path: PathBuf) -> Result<Self, ManifestError> {
        let bytes = std::fs::read(&path)?;
        let manifest = Manifest::from_bytes(&bytes)?;
        Ok(ManifestManager { path, manifest })
    }

    /// True if a manifest file exists at `path`.
    pub fn exists(path: &Path) -> bool {
        path.exists()
    }

    /// Persist the current in-memory manifest atomically: write
    /// `manifest.tmp`, fsync it, rename over `manifest.json`, then fsync the
    /// parent directory so the rename itself is durable.
    pub fn persist(&self) -> Result<(), ManifestError> {
        let temp_path = self.path.with_extension("tmp");

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&temp_path)?;
        file.write_all(&self.manifest.to_bytes())?;
        file.sync_all()?;
        drop(file);

        std::fs::rename(&temp_path, &self.path)?;

        if let Some(parent) = self.path.parent() {
            if parent.exists() {
                let dir = File::open(parent)?;
                dir.sync_all()?;
            }
        }

        Ok(())
    }

    /// Path to the manifest file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read-only access to the current manifest.
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Append a new segment record and persist. Fails validation if `dims`
    /// has already been fixed to a different value, or if the new segment's
    /// start row does not continue contiguously from the last segment.
    pub fn append_segment(
        &mut self,
        name: String,
        row_count: u64,
        dims: u32,
    ) -> Result<(), ManifestError> {
        if self.manifest.segments.is_empty() && self.manifest.dims == 0 {
            self.manifest.dims = dims;
        } else if self.manifest.dims != dims {
            return Err(ManifestError::DimsMismatch {
                expected: self.manifest.dims,
                actual: dims,
            });
        }
        let start_row = self.manifest.next_row();
        self.manifest.segments.push(SegmentRecord {
            name,
            rows: RowRange {
                start_row,
                end_row: start_row + row_count,
            },
        });
        self.persist()
    }

    /// Replace the full segment list (used by compaction, which rewrites
    /// segments and must swap the manifest to the rewritten set in one
    /// atomic step) and persist.
    pub fn replace_segments(&mut self, segments: Vec<SegmentRecord>) -> Result<(), ManifestError> {
        self.manifest.segments = segments;
        self.persist()
    }
}

/// Errors raised while reading or writing the manifest.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// The manifest JSON could not be parsed.
    #[error("invalid manifest JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The manifest declared a `version` this build does not understand.
    #[error("unsupported manifest version {0}")]
    UnsupportedVersion(u32),

    /// A new segment declared a different `dims` than the one already fixed.
    #[error("dims mismatch: index fixed at {expected}, segment declares {actual}")]
    DimsMismatch {
        /// The dims value fixed by the first segment.
        expected: u32,
        /// The dims value the new segment tried to declare.
        actual: u32,
    },

    /// Underlying filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
