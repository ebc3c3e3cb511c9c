//! Exact sparse dot-product scoring over a segment's candidate rows.
//!
//! Two kernels compute identical scores by construction (invariant: kernel
//! agreement up to floating-point summation order): the slice kernel gathers
//! a compact CSR and walks it row by row; the accumulator kernel binary
//! searches each candidate row's sorted `indices` for every query term. The
//! accumulator kernel always walks the full query vector rather than just
//! the MUST/SHOULD-gated subset, so its result is exact regardless of how
//! narrowly gating truncated the terms used for candidate selection.

use recollex_storage::{CsrView, DecodedCsr};
use rustc_hash::FxHashMap;

/// Candidate-set size threshold below which the accumulator kernel is used
/// in place of the slice kernel.
pub const KERNEL_THRESHOLD: usize = 64;

/// One scored row within a segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredRow {
    /// Local row offset within the segment.
    pub row_offset: u32,
    /// Exact sparse dot product `q . X[row]`.
    pub score: f32,
}

/// Score every row of `view` against the full query vector using the slice
/// kernel: dense-map the query once, then walk each row's sparse entries.
pub fn score_slice(view: &CsrView, row_offsets: &[u32], q_terms: &[(u32, f32)]) -> Vec<ScoredRow> {
    let q_map: FxHashMap<i32, f32> = q_terms.iter().map(|&(t, w)| (t as i32, w)).collect();

    (0..view.row_count())
        .map(|i| {
            let (indices, data) = view.row(i);
            let mut score = 0.0f32;
            for (&term, &weight) in indices.iter().zip(data.iter()) {
                if let Some(&q_weight) = q_map.get(&term) {
                    score += q_weight * weight;
                }
            }
            ScoredRow {
                row_offset: row_offsets[i],
                score,
            }
        })
        .collect()
}

/// Score the given local row offsets against the full query vector using
/// the accumulator kernel: for each candidate row, binary search its sorted
/// `indices` for every query term (terms are strictly ascending per row, so
/// this is exact and does not require a dense intermediate).
pub fn score_accumulator(decoded: &DecodedCsr, row_offsets: &[u32], q_terms: &[(u32, f32)]) -> Vec<ScoredRow> {
    row_offsets
        .iter()
        .map(|&row| {
            let (indices, data) = decoded.row(row);
            let mut score = 0.0f32;
            for &(term, weight) in q_terms {
                if let Ok(pos) = indices.binary_search(&(term as i32)) {
                    score += weight * data[pos];
                }
            }
            ScoredRow { row_offset: row, score }
        })
        .collect()
}

/// Score `row_offsets` within one segment, selecting the kernel by
/// candidate-set size: the accumulator kernel below `KERNEL_THRESHOLD`, the
/// slice kernel at or above it.
pub fn score_segment(decoded: &DecodedCsr, row_offsets: &[u32], q_terms: &[(u32, f32)]) -> Vec<ScoredRow> {
    if row_offsets.len() < KERNEL_THRESHOLD {
        score_accumulator(decoded, row_offsets, q_terms)
    } else {
        let view = decoded.slice_rows(row_offsets);
        score_slice(&view, row_offsets, q_terms)
    }
}
