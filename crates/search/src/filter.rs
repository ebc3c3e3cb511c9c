//! Adaptive MUST/SHOULD term-gating filter policy.
//!
//! Narrows a query down to a manageable candidate set before scoring: first
//! a tag/tombstone scope (`B`), then a greedy selection of MUST terms that
//! keeps `|B ∩ MUST|` near `budget`, then up to `should_cap` further SHOULD
//! terms considered for recall without being required to match.

use recollex_bitmap::Bitmap;
use recollex_core::{DocId, GatingKnobs};

/// The literal tag-list entry that disables scoping from that list.
pub const EVERYTHING: &str = "everything";

/// Tag-based scoping inputs to the filter policy.
#[derive(Debug, Clone, Default)]
pub struct TagScope {
    /// Documents must carry every tag in this list (AND). Empty, or
    /// containing `"everything"`, means no restriction.
    pub all_of: Vec<String>,
    /// Documents must carry at least one tag in this list (OR). Empty, or
    /// containing `"everything"`, means no restriction.
    pub one_of: Vec<String>,
    /// Documents must carry none of these tags. Empty, or containing
    /// `"everything"`, means no restriction.
    pub none_of: Vec<String>,
}

impl TagScope {
    fn effective(list: &[String]) -> Option<&[String]> {
        if list.is_empty() || list.iter().any(|t| t == EVERYTHING) {
            None
        } else {
            Some(list)
        }
    }
}

/// Result of running the filter policy: the scoped base bitmap and the
/// selected MUST/SHOULD term ids.
#[derive(Debug, Clone)]
pub struct FilterResult {
    /// `B`: alive doc ids passing tag scope, tombstone, and exclusion
    /// filters, before term gating.
    pub base: Bitmap,
    /// Term ids every result must contain.
    pub must: Vec<u32>,
    /// Additional term ids considered for recall.
    pub should: Vec<u32>,
}

/// Build the base bitmap `B`: alive documents passing tag scope and
/// exclusion filters. `alive` is the universe-minus-tombstones bitmap
/// maintained by the caller.
pub fn build_base_bitmap(
    alive: &Bitmap,
    scope: &TagScope,
    exclude_doc_ids: &Bitmap,
    get_bitmap: &dyn Fn(&str) -> Bitmap,
) -> Bitmap {
    let mut base = alive.clone();

    if let Some(tags) = TagScope::effective(&scope.all_of) {
        let mut acc = get_bitmap(&tag_bitmap_name(&tags[0]));
        for g in &tags[1..] {
            acc.intersect_with(&get_bitmap(&tag_bitmap_name(g)));
        }
        base.intersect_with(&acc);
    }

    if let Some(tags) = TagScope::effective(&scope.one_of) {
        let mut acc = Bitmap::empty();
        for g in tags {
            acc.union_with(&get_bitmap(&tag_bitmap_name(g)));
        }
        base.intersect_with(&acc);
    }

    if let Some(tags) = TagScope::effective(&scope.none_of) {
        for g in tags {
            base.and_not_into(&get_bitmap(&tag_bitmap_name(g)));
        }
    }

    base.and_not_into(exclude_doc_ids);
    base
}

fn tag_bitmap_name(label_or_kv: &str) -> String {
    match label_or_kv.split_once('=') {
        Some((k, v)) => format!("tag:{k}={v}"),
        None => format!("tag:{label_or_kv}"),
    }
}

/// Run MUST/SHOULD term gating over `q_terms` against base bitmap `base`.
pub fn select_terms(
    base: &Bitmap,
    q_terms: &[(u32, f32)],
    knobs: &GatingKnobs,
    total_docs: u64,
    df_lookup: &dyn Fn(u32) -> u32,
    get_bitmap: &dyn Fn(&str) -> Bitmap,
) -> FilterResult {
    let drop_count = ((q_terms.len() as f32) * (knobs.df_drop_top_percent / 100.0)).floor() as usize;

    let mut by_df: Vec<(u32, f32, u32)> = q_terms
        .iter()
        .map(|&(t, w)| (t, w, df_lookup(t)))
        .collect();
    by_df.sort_by(|a, b| b.2.cmp(&a.2));
    let kept: Vec<(u32, f32)> = by_df
        .into_iter()
        .skip(drop_count.min(q_terms.len()))
        .map(|(t, w, _)| (t, w))
        .collect();

    let mut ranked: Vec<(u32, f32)> = kept
        .into_iter()
        .map(|(t, w)| {
            let df = df_lookup(t) as f32;
            let idf = ((total_docs as f32 + 1.0) / (df + 1.0)).ln();
            (t, w * idf)
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });

    let mut must = Vec::new();
    let mut current = base.clone();
    let mut idx = 0;
    while idx < ranked.len() {
        if current.cardinality() <= knobs.budget as u64 && must.len() >= knobs.min_must as usize {
            break;
        }
        let (term_id, _) = ranked[idx];
        let term_bm = get_bitmap(&format!("term:{term_id}"));
        let tentative = current.intersect(&term_bm);
        if tentative.is_empty() {
            idx += 1;
            continue;
        }
        current = tentative;
        must.push(term_id);
        idx += 1;
    }

    let should: Vec<u32> = ranked
        .iter()
        .skip(idx)
        .filter(|(t, _)| !must.contains(t))
        .take(knobs.should_cap as usize)
        .map(|(t, _)| *t)
        .collect();

    FilterResult {
        base: base.clone(),
        must,
        should,
    }
}

/// Parse an `exclude_doc_ids` caller list: strings or integers, dropping
/// anything non-numeric silently, per the external surface contract.
pub fn parse_exclude_doc_ids<I: IntoIterator<Item = S>, S: AsRef<str>>(items: I) -> Bitmap {
    Bitmap::from_ids(items.into_iter().filter_map(|s| s.as_ref().parse::<DocId>().ok()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn bitmaps(pairs: &[(&str, &[u64])]) -> HashMap<String, Bitmap> {
        pairs
            .iter()
            .map(|(name, ids)| (name.to_string(), Bitmap::from_ids(ids.iter().copied())))
            .collect()
    }

    #[test]
    fn test_effective_everything_disables_list() {
        assert!(TagScope::effective(&["everything".to_string()]).is_none());
        assert!(TagScope::effective(&[]).is_none());
        assert!(TagScope::effective(&["a".to_string()]).is_some());
    }

    #[test]
    fn test_build_base_bitmap_all_of_and_none_of() {
        let alive = Bitmap::from_ids([1, 2, 3, 4]);
        let bm = bitmaps(&[("tag:a", &[1, 2, 3]), ("tag:b", &[2, 3]), ("tag:c", &[3])]);
        let scope = TagScope {
            all_of: vec!["a".to_string(), "b".to_string()],
            one_of: vec![],
            none_of: vec!["c".to_string()],
        };
        let base = build_base_bitmap(&alive, &scope, &Bitmap::empty(), &|n| {
            bm.get(n).cloned().unwrap_or_default()
        });
        assert_eq!(base.iter_sorted().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn test_build_base_bitmap_one_of() {
        let alive = Bitmap::from_ids([1, 2, 3, 4]);
        let bm = bitmaps(&[("tag:a", &[1]), ("tag:b", &[2])]);
        let scope = TagScope {
            all_of: vec![],
            one_of: vec!["a".to_string(), "b".to_string()],
            none_of: vec![],
        };
        let base = build_base_bitmap(&alive, &scope, &Bitmap::empty(), &|n| {
            bm.get(n).cloned().unwrap_or_default()
        });
        assert_eq!(base.iter_sorted().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_build_base_bitmap_exclude() {
        let alive = Bitmap::from_ids([1, 2, 3]);
        let base = build_base_bitmap(
            &alive,
            &TagScope::default(),
            &Bitmap::of_one(2),
            &|_| Bitmap::empty(),
        );
        assert_eq!(base.iter_sorted().collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn test_select_terms_basic() {
        let base = Bitmap::from_ids([1, 2, 3, 4, 5]);
        let bm = bitmaps(&[("term:10", &[1, 2, 3]), ("term:20", &[1])]);
        let knobs = GatingKnobs {
            budget: 10,
            min_must: 0,
            should_cap: 5,
            df_drop_top_percent: 0.0,
        };
        let result = select_terms(
            &base,
            &[(10, 1.0), (20, 1.0)],
            &knobs,
            100,
            &|t| if t == 10 { 3 } else { 1 },
            &|n| bm.get(n).cloned().unwrap_or_default(),
        );
        // budget (10) already exceeds |base|=5 and min_must=0, so no MUST
        // term is needed at all.
        assert!(result.must.is_empty());
        assert_eq!(result.should.len(), 2);
    }

    #[test]
    fn test_select_terms_forces_must_to_shrink_below_budget() {
        let base = Bitmap::from_ids(0..1000u64);
        let bm = bitmaps(&[("term:10", &(0..10u64).collect::<Vec<_>>())]);
        let knobs = GatingKnobs {
            budget: 50,
            min_must: 0,
            should_cap: 5,
            df_drop_top_percent: 0.0,
        };
        let result = select_terms(
            &base,
            &[(10, 1.0)],
            &knobs,
            1000,
            &|_| 10,
            &|n| bm.get(n).cloned().unwrap_or_default(),
        );
        assert_eq!(result.must, vec![10]);
    }

    #[test]
    fn test_select_terms_skips_term_that_would_empty_the_set() {
        let base = Bitmap::from_ids([1, 2, 3]);
        let bm = bitmaps(&[("term:10", &[1, 2, 3]), ("term:20", &[999])]);
        let knobs = GatingKnobs {
            budget: 0,
            min_must: 2,
            should_cap: 5,
            df_drop_top_percent: 0.0,
        };
        let result = select_terms(
            &base,
            &[(10, 2.0), (20, 1.0)],
            &knobs,
            100,
            &|_| 1,
            &|n| bm.get(n).cloned().unwrap_or_default(),
        );
        assert_eq!(result.must, vec![10]);
    }

    #[test]
    fn test_parse_exclude_doc_ids_drops_non_numeric() {
        let excluded = parse_exclude_doc_ids(["1", "bogus", "3"]);
        assert_eq!(excluded.iter_sorted().collect::<Vec<_>>(), vec![1, 3]);
    }
}
