//! Roaring-bitmap codec over 64-bit document ids.
//!
//! Every set of doc ids in Recollex — a term's postings, a tag's postings,
//! the tombstone set, the maintained `universe` union — is a `Bitmap`. We
//! use `RoaringTreemap` (a sorted map of 32-bit Roaring containers keyed by
//! the high 32 bits) rather than plain `RoaringBitmap` because `DocId` is a
//! full `u64`, matching the teacher's `mmap_index.rs` use of Roaring sets as
//! the unit of postings storage, generalized to 64-bit keys.

use recollex_core::DocId;
use roaring::RoaringTreemap;
use std::io;

/// A set of document ids, backed by a Roaring treemap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bitmap(RoaringTreemap);

impl Bitmap {
    /// The empty set.
    pub fn empty() -> Self {
        Bitmap(RoaringTreemap::new())
    }

    /// A set containing exactly one id.
    pub fn of_one(id: DocId) -> Self {
        let mut bm = RoaringTreemap::new();
        bm.insert(id);
        Bitmap(bm)
    }

    /// Build a set from an iterator of ids. The iterator need not be sorted.
    pub fn from_ids<I: IntoIterator<Item = DocId>>(ids: I) -> Self {
        let mut bm = RoaringTreemap::new();
        for id in ids {
            bm.insert(id);
        }
        Bitmap(bm)
    }

    /// True if `id` is a member.
    pub fn contains(&self, id: DocId) -> bool {
        self.0.contains(id)
    }

    /// Number of members.
    pub fn cardinality(&self) -> u64 {
        self.0.len()
    }

    /// True if there are no members.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Insert a single id, returning whether it was newly added.
    pub fn insert(&mut self, id: DocId) -> bool {
        self.0.insert(id)
    }

    /// Remove a single id, returning whether it was present.
    pub fn remove(&mut self, id: DocId) -> bool {
        self.0.remove(id)
    }

    /// Set union: `self | other`.
    pub fn union(&self, other: &Bitmap) -> Bitmap {
        Bitmap(&self.0 | &other.0)
    }

    /// In-place union.
    pub fn union_with(&mut self, other: &Bitmap) {
        self.0 |= &other.0;
    }

    /// Set intersection: `self & other`.
    pub fn intersect(&self, other: &Bitmap) -> Bitmap {
        Bitmap(&self.0 & &other.0)
    }

    /// In-place intersection.
    pub fn intersect_with(&mut self, other: &Bitmap) {
        self.0 &= &other.0;
    }

    /// Set difference: members of `self` not in `other`.
    pub fn difference(&self, other: &Bitmap) -> Bitmap {
        Bitmap(&self.0 - &other.0)
    }

    /// In-place difference: remove every member of `other` from `self`.
    pub fn and_not_into(&mut self, other: &Bitmap) {
        self.0 -= &other.0;
    }

    /// Iterate members in ascending order.
    pub fn iter_sorted(&self) -> impl Iterator<Item = DocId> + '_ {
        self.0.iter()
    }

    /// Serialize to Roaring's own portable treemap format.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.0.serialized_size());
        self.0
            .serialize_into(&mut buf)
            .expect("serializing into a Vec is infallible");
        buf
    }

    /// Deserialize from bytes produced by `serialize`.
    pub fn deserialize(bytes: &[u8]) -> io::Result<Bitmap> {
        RoaringTreemap::deserialize_from(bytes).map(Bitmap)
    }

    /// Sort a batch of bitmaps by ascending cardinality and intersect them
    /// in that order, stopping early once the running intersection is
    /// empty. Grounded on the "sort by cardinality, intersect smallest
    /// first" idiom used for multi-term candidate narrowing: intersecting
    /// small sets first minimizes the work done by later intersections.
    pub fn intersect_many_smallest_first(mut bitmaps: Vec<Bitmap>) -> Bitmap {
        if bitmaps.is_empty() {
            return Bitmap::empty();
        }
        bitmaps.sort_by_key(Bitmap::cardinality);
        let mut acc = bitmaps.remove(0);
        for bm in &bitmaps {
            if acc.is_empty() {
                break;
            }
            acc.intersect_with(bm);
        }
        acc
    }

    /// Union a batch of bitmaps.
    pub fn union_many(bitmaps: &[Bitmap]) -> Bitmap {
        let mut acc = Bitmap::empty();
        for bm in bitmaps {
            acc.union_with(bm);
        }
        acc
    }
}

impl FromIterator<DocId> for Bitmap {
    fn from_iter<I: IntoIterator<Item = DocId>>(iter: I) -> Self {
        Bitmap::from_ids(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_is_empty() {
        let bm = Bitmap::empty();
        assert!(bm.is_empty());
        assert_eq!(bm.cardinality(), 0);
    }

    #[test]
    fn test_of_one_contains_only_that_id() {
        let bm = Bitmap::of_one(42);
        assert!(bm.contains(42));
        assert!(!bm.contains(43));
        assert_eq!(bm.cardinality(), 1);
    }

    #[test]
    fn test_union_and_intersect() {
        let a = Bitmap::from_ids([1, 2, 3]);
        let b = Bitmap::from_ids([2, 3, 4]);
        assert_eq!(
            a.union(&b).iter_sorted().collect::<Vec<_>>(),
            vec![1, 2, 3, 4]
        );
        assert_eq!(
            a.intersect(&b).iter_sorted().collect::<Vec<_>>(),
            vec![2, 3]
        );
    }

    #[test]
    fn test_difference() {
        let a = Bitmap::from_ids([1, 2, 3]);
        let b = Bitmap::from_ids([2]);
        assert_eq!(a.difference(&b).iter_sorted().collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn test_and_not_into() {
        let mut a = Bitmap::from_ids([1, 2, 3]);
        let b = Bitmap::from_ids([2, 3]);
        a.and_not_into(&b);
        assert_eq!(a.iter_sorted().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_intersect_many_smallest_first_empty_short_circuits() {
        let bitmaps = vec![
            Bitmap::from_ids([1, 2, 3]),
            Bitmap::empty(),
            Bitmap::from_ids([1, 2]),
        ];
        let result = Bitmap::intersect_many_smallest_first(bitmaps);
        assert!(result.is_empty());
    }

    #[test]
    fn test_intersect_many_smallest_first_nonempty() {
        let bitmaps = vec![
            Bitmap::from_ids([1, 2, 3, 4]),
            Bitmap::from_ids([2, 3, 4, 5]),
            Bitmap::from_ids([3, 4, 5, 6]),
        ];
        let result = Bitmap::intersect_many_smallest_first(bitmaps);
        assert_eq!(result.iter_sorted().collect::<Vec<_>>(), vec![3, 4]);
    }

    #[test]
    fn test_union_many() {
        let bitmaps = vec![Bitmap::from_ids([1]), Bitmap::from_ids([2]), Bitmap::empty()];
        let result = Bitmap::union_many(&bitmaps);
        assert_eq!(result.iter_sorted().collect::<Vec<_>>(), vec![1, 2]);
    }

    proptest! {
        #[test]
        fn test_serialize_roundtrip(ids in proptest::collection::vec(0u64..1_000_000, 0..200)) {
            let bm = Bitmap::from_ids(ids.iter().copied());
            let bytes = bm.serialize();
            let back = Bitmap::deserialize(&bytes).unwrap();
            prop_assert_eq!(bm, back);
        }
    }
}
