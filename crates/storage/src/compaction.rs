//! Compaction: physically drop tombstoned rows by rewriting segments into a
//! single fresh one and swapping the manifest, reconciling every bitmap and
//! stat that referenced the purged doc ids along the way.

use crate::cache::{CsrMatrixCache, SegmentReaderCache};
use crate::format::manifest::{ManifestError, ManifestManager, RowRange, SegmentRecord};
use crate::meta::{MetaStoreError, MetadataStore};
use crate::segment::{SegmentReader, SegmentWriter};
use recollex_bitmap::Bitmap;
use recollex_core::{DocId, Document};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::info;

/// Errors raised during compaction.
#[derive(Debug, thiserror::Error)]
pub enum CompactionError {
    /// Metadata store error.
    #[error("metadata store error: {0}")]
    Meta(#[from] MetaStoreError),

    /// Manifest error.
    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),

    /// Error opening or decoding a segment being rewritten.
    #[error("segment error: {0}")]
    Segment(#[from] crate::format::array::ArrayFileError),

    /// Underlying filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Rewrite all segments into one new segment containing only alive rows,
/// purge tombstoned doc ids from every bitmap/stat/docs row that referenced
/// them, and swap the manifest atomically to point at the new segment.
/// Returns the number of rows physically dropped. A no-op (returns `0`)
/// when no tombstoned doc id currently appears in any segment.
pub fn compact(
    segments_dir: &Path,
    manifest: &mut ManifestManager,
    meta: &MetadataStore,
    reader_cache: &SegmentReaderCache,
    csr_cache: &CsrMatrixCache,
) -> Result<usize, CompactionError> {
    let tombstones = meta.get_bitmap("tombstones")?;
    if tombstones.is_empty() {
        return Ok(0);
    }

    let old_segments: Vec<SegmentRecord> = manifest.manifest().segments.clone();
    let mut writer = SegmentWriter::new();
    let mut purged_docs: Vec<Document> = Vec::new();
    let mut purged_term_ids: HashMap<DocId, Vec<u32>> = HashMap::new();
    let mut moved: Vec<(DocId, u32)> = Vec::new();

    for record in &old_segments {
        let reader = reader_cache
            .get_or_open(&record.name, || SegmentReader::open(&segments_dir.join(&record.name)))?;
        let decoded = reader.to_decoded();

        for local_row in 0..reader.row_count() as u32 {
            let doc_id = decoded.row_ids[local_row as usize];
            let start = decoded.indptr[local_row as usize] as usize;
            let end = decoded.indptr[local_row as usize + 1] as usize;

            if tombstones.contains(doc_id) {
                let term_ids: Vec<u32> = decoded.indices[start..end].iter().map(|&t| t as u32).collect();
                purged_term_ids.insert(doc_id, term_ids);
                if let Some(doc) = meta.get_doc(doc_id)? {
                    purged_docs.push(doc);
                }
                continue;
            }

            let term_ids: Vec<u32> = decoded.indices[start..end].iter().map(|&t| t as u32).collect();
            let weights = decoded.data[start..end].to_vec();
            let new_row = writer.add_row(doc_id, &term_ids, &weights);
            moved.push((doc_id, new_row));
        }
    }

    if purged_docs.is_empty() {
        return Ok(0);
    }

    let epoch = meta.incr_stat("compaction_epoch", 1)?;
    let new_name = format!("seg_compact_{epoch:06}");
    writer.publish(segments_dir, &new_name)?;

    let purged_ids: Vec<DocId> = purged_docs.iter().map(|d| d.doc_id).collect();

    for doc in &purged_docs {
        for tag in &doc.tags {
            meta.remove_from(&tag.bitmap_name(), &Bitmap::of_one(doc.doc_id))?;
        }
    }
    for (&doc_id, term_ids) in &purged_term_ids {
        for &t in term_ids {
            meta.remove_from(&format!("term:{t}"), &Bitmap::of_one(doc_id))?;
            meta.incr_stat(&format!("term_df:{t}"), -1)?;
        }
    }
    meta.remove_from("universe", &Bitmap::from_ids(purged_ids.iter().copied()))?;
    meta.remove_from("tombstones", &Bitmap::from_ids(purged_ids.iter().copied()))?;
    meta.delete_docs(&purged_ids)?;

    let updated_docs: Vec<Document> = moved
        .into_iter()
        .filter_map(|(doc_id, new_row)| {
            meta.get_doc(doc_id).ok().flatten().map(|mut d| {
                d.segment_id = new_name.clone();
                d.row_offset = new_row;
                d
            })
        })
        .collect();
    meta.put_docs(&updated_docs)?;

    manifest.replace_segments(vec![SegmentRecord {
        name: new_name.clone(),
        rows: RowRange {
            start_row: 0,
            end_row: updated_docs.len() as u64,
        },
    }])?;

    for record in &old_segments {
        reader_cache.evict(&record.name);
        csr_cache.evict(&record.name);
        let dir = segments_dir.join(&record.name);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
    }

    info!(
        purged = purged_ids.len(),
        new_segment = %new_name,
        "compaction complete"
    );

    Ok(purged_ids.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use recollex_core::Tag;
    use tempfile::tempdir;

    fn setup(dir: &Path) -> (ManifestManager, MetadataStore, SegmentReaderCache, CsrMatrixCache) {
        let segments_dir = dir.join("segments");
        fs::create_dir_all(&segments_dir).unwrap();
        let mut manifest = ManifestManager::create(dir.join("manifest.json")).unwrap();
        let meta = MetadataStore::open_in_memory(8).unwrap();

        let mut writer = SegmentWriter::new();
        writer.add_row(1, &[10, 20], &[0.5, 0.7]);
        writer.add_row(2, &[30], &[0.9]);
        writer.add_row(3, &[10], &[1.0]);
        writer.publish(&segments_dir, "seg_000").unwrap();
        manifest.append_segment("seg_000".to_string(), 3, 100).unwrap();

        meta.put_docs(&[
            Document { doc_id: 1, segment_id: "seg_000".into(), row_offset: 0, seq: 1, text: None, tags: vec![Tag::Flat("a".into())] },
            Document { doc_id: 2, segment_id: "seg_000".into(), row_offset: 1, seq: 2, text: None, tags: vec![] },
            Document { doc_id: 3, segment_id: "seg_000".into(), row_offset: 2, seq: 3, text: None, tags: vec![Tag::Flat("b".into())] },
        ])
        .unwrap();
        meta.put_bitmap("term:10", &Bitmap::from_ids([1, 3])).unwrap();
        meta.put_bitmap("term:20", &Bitmap::from_ids([1])).unwrap();
        meta.put_bitmap("term:30", &Bitmap::from_ids([2])).unwrap();
        meta.put_bitmap("tag:a", &Bitmap::from_ids([1])).unwrap();
        meta.put_bitmap("tag:b", &Bitmap::from_ids([3])).unwrap();
        meta.put_bitmap("universe", &Bitmap::from_ids([1, 2, 3])).unwrap();

        let reader_cache = SegmentReaderCache::new(8);
        let csr_cache = CsrMatrixCache::new(8, 1024 * 1024);
        (manifest, meta, reader_cache, csr_cache)
    }

    #[test]
    fn test_compact_noop_without_tombstones() {
        let dir = tempdir().unwrap();
        let (mut manifest, meta, reader_cache, csr_cache) = setup(dir.path());
        let dropped = compact(&dir.path().join("segments"), &mut manifest, &meta, &reader_cache, &csr_cache).unwrap();
        assert_eq!(dropped, 0);
        assert_eq!(manifest.manifest().segments.len(), 1);
    }

    #[test]
    fn test_compact_drops_tombstoned_row_and_reconciles_bitmaps() {
        let dir = tempdir().unwrap();
        let (mut manifest, meta, reader_cache, csr_cache) = setup(dir.path());
        meta.put_bitmap("tombstones", &Bitmap::of_one(3)).unwrap();

        let dropped = compact(&dir.path().join("segments"), &mut manifest, &meta, &reader_cache, &csr_cache).unwrap();
        assert_eq!(dropped, 1);

        assert!(meta.get_doc(3).unwrap().is_none());
        assert!(meta.get_doc(1).unwrap().is_some());

        let term10 = meta.get_bitmap("term:10").unwrap();
        assert_eq!(term10.iter_sorted().collect::<Vec<_>>(), vec![1]);
        let tag_b = meta.get_bitmap("tag:b").unwrap();
        assert!(tag_b.is_empty());
        let tombstones = meta.get_bitmap("tombstones").unwrap();
        assert!(tombstones.is_empty());

        assert_eq!(manifest.manifest().segments.len(), 1);
        let new_seg_name = manifest.manifest().segments[0].name.clone();
        assert!(!dir.path().join("segments").join("seg_000").exists());
        assert!(dir.path().join("segments").join(&new_seg_name).exists());
    }
}
