//! Core document identity and tag types.
//!
//! `DocId` is the 64-bit key used both as the Roaring bitmap element and as
//! the metadata store's primary key. `Seq` is a monotonically increasing
//! counter assigned at add-time, used to break score ties and to drive the
//! `recent` profile's recency ordering.

use serde::{Deserialize, Serialize};

/// Stable identifier for a document. Also the element type stored in every
/// Roaring bitmap (`term:*`, `tag:*`, `tombstones`, `universe`).
pub type DocId = u64;

/// Monotonically increasing sequence number assigned when a document is
/// added. Ties in score are broken by descending `Seq` (newer wins), and the
/// `recent` profile orders candidates by `Seq` directly.
pub type Seq = i64;

/// A tag attached to a document: either a flat label or a key/value pair.
///
/// Tags are namespaced into their own bitmaps (`tag:<label>` or
/// `tag:<k>=<v>`) so that tag-filtered search is a bitmap intersection rather
/// than a per-document scan.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tag {
    /// A bare label, e.g. `"starred"`.
    Flat(String),
    /// A key/value pair, e.g. `("lang", "en")`.
    Kv(String, String),
}

impl Tag {
    /// The bitmap name this tag is stored under, e.g. `tag:starred` or
    /// `tag:lang=en`.
    pub fn bitmap_name(&self) -> String {
        match self {
            Tag::Flat(label) => format!("tag:{label}"),
            Tag::Kv(k, v) => format!("tag:{k}={v}"),
        }
    }

    /// Parse a canonical tag filter expression (`"starred"` or `"lang=en"`)
    /// into a `Tag`.
    pub fn parse(expr: &str) -> Tag {
        match expr.split_once('=') {
            Some((k, v)) => Tag::Kv(k.to_string(), v.to_string()),
            None => Tag::Flat(expr.to_string()),
        }
    }
}

/// A document as tracked by the metadata store: identity, placement, and
/// tags. The sparse vector itself lives in a segment's CSR arrays, addressed
/// by `(segment_id, row_offset)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Stable identifier, unique for the lifetime of the index.
    pub doc_id: DocId,
    /// Name of the segment holding this document's CSR row.
    pub segment_id: String,
    /// Row offset into that segment's CSR arrays.
    pub row_offset: u32,
    /// Insertion order, used for tie-breaking and the `recent` profile.
    pub seq: Seq,
    /// Optional verbatim text, stored for hydration/debugging only — it is
    /// never used in scoring.
    pub text: Option<String>,
    /// Tags attached at add-time.
    pub tags: Vec<Tag>,
}

impl Document {
    /// Bitmap names for all tags on this document.
    pub fn tag_bitmap_names(&self) -> Vec<String> {
        self.tags.iter().map(Tag::bitmap_name).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_flat_bitmap_name() {
        let tag = Tag::Flat("starred".to_string());
        assert_eq!(tag.bitmap_name(), "tag:starred");
    }

    #[test]
    fn test_tag_kv_bitmap_name() {
        let tag = Tag::Kv("lang".to_string(), "en".to_string());
        assert_eq!(tag.bitmap_name(), "tag:lang=en");
    }

    #[test]
    fn test_tag_parse_flat() {
        assert_eq!(Tag::parse("starred"), Tag::Flat("starred".to_string()));
    }

    #[test]
    fn test_tag_parse_kv() {
        assert_eq!(
            Tag::parse("lang=en"),
            Tag::Kv("lang".to_string(), "en".to_string())
        );
    }

    #[test]
    fn test_document_tag_bitmap_names() {
        let doc = Document {
            doc_id: 1,
            segment_id: "seg-000001".to_string(),
            row_offset: 0,
            seq: 1,
            text: None,
            tags: vec![
                Tag::Flat("starred".to_string()),
                Tag::Kv("lang".to_string(), "en".to_string()),
            ],
        };
        assert_eq!(
            doc.tag_bitmap_names(),
            vec!["tag:starred".to_string(), "tag:lang=en".to_string()]
        );
    }

    #[test]
    fn test_tag_serde_roundtrip() {
        let tag = Tag::Kv("lang".to_string(), "en".to_string());
        let json = serde_json::to_string(&tag).unwrap();
        let back: Tag = serde_json::from_str(&json).unwrap();
        assert_eq!(tag, back);
    }
}
