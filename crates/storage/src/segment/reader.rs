//! Segment reader: opens an immutable CSR segment directory read-only via
//! memory mapping and exposes row lookup and slicing.

use crate::format::array::{ArrayFile, ArrayFileError};
use recollex_core::DocId;
use rustc_hash::FxHashMap;
use std::path::Path;

/// A compact, gathered CSR view of a subset of rows from one segment, used
/// by the scorer's slice kernel.
#[derive(Debug, Clone, PartialEq)]
pub struct CsrView {
    /// `indptr[i]..indptr[i+1]` bounds row `i`'s entries in `indices`/`data`.
    /// Length is `doc_ids.len() + 1`.
    pub indptr: Vec<i64>,
    /// Column (term) ids, ascending within each row.
    pub indices: Vec<i32>,
    /// Nonzero weights, parallel to `indices`.
    pub data: Vec<f32>,
    /// Original doc id for each gathered row, in the same order as the
    /// requested offsets.
    pub doc_ids: Vec<DocId>,
}

impl CsrView {
    /// Number of rows in this view.
    pub fn row_count(&self) -> usize {
        self.doc_ids.len()
    }

    /// The `(indices, data)` slice for row `i`.
    pub fn row(&self, i: usize) -> (&[i32], &[f32]) {
        let start = self.indptr[i] as usize;
        let end = self.indptr[i + 1] as usize;
        (&self.indices[start..end], &self.data[start..end])
    }
}

/// A read-only handle on one segment's memory-mapped CSR arrays.
pub struct SegmentReader {
    indptr: ArrayFile,
    indices: ArrayFile,
    data: ArrayFile,
    row_ids: ArrayFile,
    row_of_doc_id: FxHashMap<DocId, u32>,
}

impl SegmentReader {
    /// Open a segment directory, memory-mapping its four array files and
    /// building the `doc_id -> row_offset` side index.
    pub fn open(segment_dir: &Path) -> Result<SegmentReader, ArrayFileError> {
        let indptr = ArrayFile::open(&segment_dir.join("indptr"))?;
        let indices = ArrayFile::open(&segment_dir.join("indices"))?;
        let data = ArrayFile::open(&segment_dir.join("data"))?;
        let row_ids = ArrayFile::open(&segment_dir.join("row_ids"))?;

        let ids = row_ids.as_u64_slice();
        let mut row_of_doc_id = FxHashMap::default();
        row_of_doc_id.reserve(ids.len());
        for (row, &doc_id) in ids.iter().enumerate() {
            row_of_doc_id.insert(doc_id, row as u32);
        }

        Ok(SegmentReader {
            indptr,
            indices,
            data,
            row_ids,
            row_of_doc_id,
        })
    }

    /// Number of rows in this segment.
    pub fn row_count(&self) -> usize {
        self.row_ids.len()
    }

    /// The doc id stored at local row offset `row`.
    pub fn doc_id_at(&self, row: u32) -> DocId {
        self.row_ids.as_u64_slice()[row as usize]
    }

    /// The local row offset holding `doc_id`, if present in this segment.
    pub fn row_of(&self, doc_id: DocId) -> Option<u32> {
        self.row_of_doc_id.get(&doc_id).copied()
    }

    /// Gather the given local row offsets into a compact `CsrView`. Offsets
    /// need not be sorted; output preserves the input order.
    pub fn slice_rows(&self, offsets: &[u32]) -> CsrView {
        let indptr = self.indptr.as_i64_slice();
        let indices = self.indices.as_i32_slice();
        let data = self.data.as_f32_slice();
        let row_ids = self.row_ids.as_u64_slice();

        let mut out_indptr = Vec::with_capacity(offsets.len() + 1);
        out_indptr.push(0i64);
        let mut out_indices = Vec::new();
        let mut out_data = Vec::new();
        let mut doc_ids = Vec::with_capacity(offsets.len());

        for &row in offsets {
            let start = indptr[row as usize] as usize;
            let end = indptr[row as usize + 1] as usize;
            out_indices.extend_from_slice(&indices[start..end]);
            out_data.extend_from_slice(&data[start..end]);
            out_indptr.push(out_indices.len() as i64);
            doc_ids.push(row_ids[row as usize]);
        }

        CsrView {
            indptr: out_indptr,
            indices: out_indices,
            data: out_data,
            doc_ids,
        }
    }

    /// Approximate in-memory footprint of this reader's decoded arrays, used
    /// by the CSR-matrix byte-capped cache.
    pub fn byte_size(&self) -> usize {
        self.indptr.len() * 8 + self.indices.len() * 4 + self.data.len() * 4 + self.row_ids.len() * 8
    }

    /// Decode this segment's full arrays into owned `Vec`s, for the
    /// CSR-matrix cache: repeatedly slicing a handful of rows from an mmap
    /// still pays a per-call decode cost, so hot segments keep a fully
    /// decoded copy around instead.
    pub fn to_decoded(&self) -> DecodedCsr {
        DecodedCsr {
            indptr: self.indptr.as_i64_slice(),
            indices: self.indices.as_i32_slice(),
            data: self.data.as_f32_slice(),
            row_ids: self.row_ids.as_u64_slice(),
        }
    }
}

/// A fully decoded segment CSR, held by the CSR-matrix LRU for hot segments.
#[derive(Debug, Clone)]
pub struct DecodedCsr {
    /// Row boundaries, length `row_count + 1`.
    pub indptr: Vec<i64>,
    /// Column ids.
    pub indices: Vec<i32>,
    /// Nonzero weights.
    pub data: Vec<f32>,
    /// Doc id per row.
    pub row_ids: Vec<u64>,
}

impl DecodedCsr {
    /// Approximate heap footprint in bytes, used by the byte-capped cache.
    pub fn byte_size(&self) -> usize {
        self.indptr.len() * 8 + self.indices.len() * 4 + self.data.len() * 4 + self.row_ids.len() * 8
    }

    /// Number of rows in this segment.
    pub fn row_count(&self) -> usize {
        self.row_ids.len()
    }

    /// The `(indices, data)` slice for local row offset `row`.
    pub fn row(&self, row: u32) -> (&[i32], &[f32]) {
        let start = self.indptr[row as usize] as usize;
        let end = self.indptr[row as usize + 1] as usize;
        (&self.indices[start..end], &self.data[start..end])
    }

    /// Gather a set of local row offsets into a compact `CsrView`, same
    /// semantics as `SegmentReader::slice_rows` but over the decoded copy.
    pub fn slice_rows(&self, offsets: &[u32]) -> CsrView {
        let mut out_indptr = Vec::with_capacity(offsets.len() + 1);
        out_indptr.push(0i64);
        let mut out_indices = Vec::new();
        let mut out_data = Vec::new();
        let mut doc_ids = Vec::with_capacity(offsets.len());

        for &row in offsets {
            let start = self.indptr[row as usize] as usize;
            let end = self.indptr[row as usize + 1] as usize;
            out_indices.extend_from_slice(&self.indices[start..end]);
            out_data.extend_from_slice(&self.data[start..end]);
            out_indptr.push(out_indices.len() as i64);
            doc_ids.push(self.row_ids[row as usize]);
        }

        CsrView {
            indptr: out_indptr,
            indices: out_indices,
            data: out_data,
            doc_ids,
        }
    }
}
