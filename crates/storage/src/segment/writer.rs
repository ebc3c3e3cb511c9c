//! Segment writer: accumulates rows in memory, then materializes and
//! publishes an immutable CSR segment directory.
//!
//! Flush lifecycle (grounded on the teacher's tmp-dir/fsync/atomic-rename
//! discipline for on-disk artifacts): write into `seg_XXX.tmp/`, fsync every
//! array file, fsync the tmp directory itself, then rename to `seg_XXX/` and
//! fsync the parent `segments/` directory. A crash before the rename leaves
//! only an orphan `.tmp` directory, which startup recovery deletes; a crash
//! after leaves the segment fully visible.

use crate::format::array::{write_f32_array, write_i32_array, write_i64_array, write_u64_array};
use recollex_core::DocId;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Accumulates rows for one new segment.
#[derive(Debug, Default)]
pub struct SegmentWriter {
    indptr: Vec<i64>,
    indices: Vec<i32>,
    data: Vec<f32>,
    row_ids: Vec<u64>,
}

impl SegmentWriter {
    /// A fresh, empty writer.
    pub fn new() -> Self {
        SegmentWriter {
            indptr: vec![0],
            indices: Vec::new(),
            data: Vec::new(),
            row_ids: Vec::new(),
        }
    }

    /// Number of rows buffered so far.
    pub fn row_count(&self) -> usize {
        self.row_ids.len()
    }

    /// True if no rows have been added yet.
    pub fn is_empty(&self) -> bool {
        self.row_ids.is_empty()
    }

    /// Append one row. `term_ids` must be strictly ascending (caller's
    /// responsibility — the engine validates this against `dims` before
    /// calling in). Returns the row's local offset within this writer.
    pub fn add_row(&mut self, doc_id: DocId, term_ids: &[u32], weights: &[f32]) -> u32 {
        debug_assert_eq!(term_ids.len(), weights.len());
        debug_assert!(term_ids.windows(2).all(|w| w[0] < w[1]));
        for (&t, &w) in term_ids.iter().zip(weights) {
            self.indices.push(t as i32);
            self.data.push(w);
        }
        let row = (self.row_ids.len()) as u32;
        self.row_ids.push(doc_id);
        self.indptr.push(self.indices.len() as i64);
        row
    }

    /// Materialize this writer's buffered rows as a new segment directory
    /// named `name` under `segments_dir`, using the tmp-dir/fsync/rename
    /// lifecycle. Returns the final segment directory path.
    pub fn publish(&self, segments_dir: &Path, name: &str) -> io::Result<PathBuf> {
        let tmp_dir = segments_dir.join(format!("{name}.tmp"));
        if tmp_dir.exists() {
            fs::remove_dir_all(&tmp_dir)?;
        }
        fs::create_dir_all(&tmp_dir)?;

        write_i64_array(&tmp_dir.join("indptr"), &self.indptr)?;
        write_i32_array(&tmp_dir.join("indices"), &self.indices)?;
        write_f32_array(&tmp_dir.join("data"), &self.data)?;
        write_u64_array(&tmp_dir.join("row_ids"), &self.row_ids)?;

        let tmp_handle = fs::File::open(&tmp_dir)?;
        tmp_handle.sync_all().ok();

        let final_dir = segments_dir.join(name);
        fs::rename(&tmp_dir, &final_dir)?;

        let parent_handle = fs::File::open(segments_dir)?;
        parent_handle.sync_all()?;

        Ok(final_dir)
    }
}
