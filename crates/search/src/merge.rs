//! K-way rank merger: score-profile top-k via a bounded min-heap, plus the
//! recency-profile variant ordered by `seq` descending.

use recollex_core::{DocId, Seq};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// One merged result row, carrying everything needed to break ties and
/// materialize the final result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergeRow {
    /// Sparse dot-product score, or `0.0` under the recency profile.
    pub score: f32,
    /// Segment name this row came from.
    pub seq: Seq,
    /// Global doc id.
    pub doc_id: DocId,
    /// Segment name index into the caller's segment list.
    pub segment_idx: usize,
    /// Local row offset within its segment.
    pub row_offset: u32,
}

/// Ordering used by the score-profile min-heap: lowest score first (so the
/// heap's peek is the worst-scoring row currently kept), ties broken by
/// lower `seq` first, then higher `doc_id` first — the reverse of the
/// spec's "higher seq, then lower doc_id wins" tie-break, so that popping
/// the heap's root evicts the correct loser.
#[derive(Debug, Clone, Copy, PartialEq)]
struct HeapEntry(MergeRow);

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; to keep the k *best* rows we want its
        // peek (and first pop on overflow) to be the current *worst* row,
        // so invert score and apply the inverted tie-break here.
        other
            .0
            .score
            .partial_cmp(&self.0.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.0.seq.cmp(&self.0.seq))
            .then_with(|| self.0.doc_id.cmp(&other.0.doc_id))
    }
}

/// Merge per-segment scored rows into the global top-k, ties broken by
/// higher `seq` then lower `doc_id`, descending by score.
pub fn merge_top_k(rows: impl IntoIterator<Item = MergeRow>, k: usize) -> Vec<MergeRow> {
    if k == 0 {
        return Vec::new();
    }
    let mut heap: BinaryHeap<HeapEntry> = BinaryHeap::with_capacity(k + 1);
    for row in rows {
        if heap.len() < k {
            heap.push(HeapEntry(row));
        } else if let Some(worst) = heap.peek() {
            if is_better(&row, &worst.0) {
                heap.pop();
                heap.push(HeapEntry(row));
            }
        }
    }
    let mut out: Vec<MergeRow> = heap.into_iter().map(|e| e.0).collect();
    out.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.seq.cmp(&a.seq))
            .then_with(|| a.doc_id.cmp(&b.doc_id))
    });
    out
}

fn is_better(a: &MergeRow, b: &MergeRow) -> bool {
    match a.score.partial_cmp(&b.score).unwrap_or(Ordering::Equal) {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => match a.seq.cmp(&b.seq) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => a.doc_id < b.doc_id,
        },
    }
}

/// Recency-profile merge: order by `seq` descending, score reported as
/// `0.0` unless `min_score` filtering already dropped the row. Pass the
/// already score-filtered rows (per `min_score`) in; this function only
/// orders and truncates to `k`.
pub fn merge_recent_top_k(rows: impl IntoIterator<Item = MergeRow>, k: usize) -> Vec<MergeRow> {
    let mut all: Vec<MergeRow> = rows.into_iter().collect();
    all.sort_by(|a, b| b.seq.cmp(&a.seq));
    all.truncate(k);
    all
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(score: f32, seq: Seq, doc_id: DocId) -> MergeRow {
        MergeRow {
            score,
            seq,
            doc_id,
            segment_idx: 0,
            row_offset: 0,
        }
    }

    #[test]
    fn test_merge_top_k_orders_by_score_descending() {
        let rows = vec![row(0.5, 1, 1), row(1.0, 2, 2), row(0.9, 3, 3)];
        let merged = merge_top_k(rows, 10);
        assert_eq!(
            merged.iter().map(|r| r.doc_id).collect::<Vec<_>>(),
            vec![2, 3, 1]
        );
    }

    #[test]
    fn test_merge_top_k_truncates_to_k_keeping_best() {
        let rows = vec![row(0.1, 1, 1), row(0.9, 2, 2), row(0.5, 3, 3)];
        let merged = merge_top_k(rows, 2);
        assert_eq!(merged.iter().map(|r| r.doc_id).collect::<Vec<_>>(), vec![2, 3]);
    }

    #[test]
    fn test_merge_top_k_tie_break_higher_seq_then_lower_doc_id() {
        let rows = vec![row(1.0, 5, 10), row(1.0, 5, 5), row(1.0, 2, 1)];
        let merged = merge_top_k(rows, 10);
        // equal score: higher seq wins first; among equal seq, lower doc_id wins
        assert_eq!(
            merged.iter().map(|r| r.doc_id).collect::<Vec<_>>(),
            vec![5, 10, 1]
        );
    }

    #[test]
    fn test_merge_recent_top_k_orders_by_seq_descending() {
        let rows = vec![row(0.0, 1, 1), row(0.0, 3, 3), row(0.0, 2, 2)];
        let merged = merge_recent_top_k(rows, 10);
        assert_eq!(
            merged.iter().map(|r| r.seq).collect::<Vec<_>>(),
            vec![3, 2, 1]
        );
    }

    #[test]
    fn test_merge_recent_top_k_truncates() {
        let rows = vec![row(0.0, 1, 1), row(0.0, 3, 3), row(0.0, 2, 2)];
        let merged = merge_recent_top_k(rows, 2);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].seq, 3);
    }

    #[test]
    fn test_merge_top_k_zero_k_is_empty() {
        let rows = vec![row(1.0, 1, 1)];
        assert!(merge_top_k(rows, 0).is_empty());
    }
}
