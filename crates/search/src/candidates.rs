//! Candidate supplier: turns a filter policy result into the bitmap of
//! doc_ids the scorer will actually evaluate.

use recollex_bitmap::Bitmap;

/// Compute `C = B ∩ (⋂ term:t for t ∈ must) ∩ (⋃ term:t for t ∈ should)`,
/// omitting the union term if `should` is empty, then truncate to `budget`
/// by ascending doc_id if oversized.
pub fn score_candidates(
    base: &Bitmap,
    must: &[u32],
    should: &[u32],
    budget: u32,
    get_bitmap: &dyn Fn(&str) -> Bitmap,
) -> Bitmap {
    let mut c = base.clone();

    for &t in must {
        c.intersect_with(&get_bitmap(&format!("term:{t}")));
        if c.is_empty() {
            return c;
        }
    }

    if !should.is_empty() {
        let mut union = Bitmap::empty();
        for &t in should {
            union.union_with(&get_bitmap(&format!("term:{t}")));
        }
        c.intersect_with(&union);
    }

    truncate_ascending(c, budget)
}

/// Recent-profile variant: the scoped base bitmap directly (tombstones and
/// exclusions already subtracted by the caller), capped to `budget` by
/// ascending doc_id order.
pub fn recency_candidates(base: &Bitmap, budget: u32) -> Bitmap {
    truncate_ascending(base.clone(), budget)
}

fn truncate_ascending(bitmap: Bitmap, budget: u32) -> Bitmap {
    if budget == 0 || bitmap.cardinality() <= budget as u64 {
        return bitmap;
    }
    bitmap.iter_sorted().take(budget as usize).collect()
}
