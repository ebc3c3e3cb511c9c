//! The `Engine<E>` facade: the single entry point wiring the metadata
//! store, segment storage, and query-side building blocks from
//! `recollex-search` into `add`/`add_many`/`remove`/`remove_by`/`search`/
//! `search_terms`/`last`.
//!
//! Monomorphized over the encoder type (spec.md's design notes call for
//! avoiding dynamic dispatch on the hot scoring path); there is exactly one
//! concrete `E` per open index, so this costs nothing and keeps `encode`
//! calls inlinable.

use crate::encoder::Encoder;
use crate::error::{EngineError, Result};
use crate::types::{AddManyRecord, Scope, SearchOptions, SearchResult};
use parking_lot::Mutex;
use recollex_bitmap::Bitmap;
use recollex_core::{DocId, Document, Limits, OpenOptions, Profile, Seq, Tag};
use recollex_search::{
    build_base_bitmap, merge_recent_top_k, merge_top_k, parse_exclude_doc_ids, score_candidates,
    score_segment, select_terms, MergeRow, TagScope,
};
use recollex_storage::{SegmentReader, SegmentWriter, StorageHandle};
use rustc_hash::FxHashMap;
use std::path::Path;
use tracing::warn;

/// Rows buffered since the last flush, plus the metadata deltas they imply.
/// Nothing here is durable until `flush` runs.
struct WriteState {
    writer: SegmentWriter,
    docs: Vec<Document>,
    bitmap_unions: FxHashMap<String, Bitmap>,
    term_df_deltas: FxHashMap<String, i64>,
}

impl WriteState {
    fn new() -> Self {
        WriteState {
            writer: SegmentWriter::new(),
            docs: Vec::new(),
            bitmap_unions: FxHashMap::default(),
            term_df_deltas: FxHashMap::default(),
        }
    }

    fn union(&mut self, name: String, doc_id: DocId) {
        self.bitmap_unions.entry(name).or_default().insert(doc_id);
    }
}

/// An open Recollex index bound to one encoder implementation.
pub struct Engine<E: Encoder> {
    storage: StorageHandle,
    encoder: E,
    limits: Limits,
    write_state: Mutex<WriteState>,
}

impl<E: Encoder> Engine<E> {
    /// Open (creating if absent) an index directory at `root`.
    pub fn open(root: impl AsRef<Path>, options: OpenOptions, encoder: E, limits: Limits) -> Result<Self> {
        let storage = StorageHandle::open(root.as_ref(), &options)?;
        Ok(Engine {
            storage,
            encoder,
            limits,
            write_state: Mutex::new(WriteState::new()),
        })
    }

    /// Encode and add one document, running this index's encoder on `text`.
    pub fn add(&self, text: &str, tags: Vec<Tag>, timestamp: Option<i64>) -> Result<DocId> {
        let (indices, data) = self
            .encoder
            .encode(&[text])
            .into_iter()
            .next()
            .unwrap_or_default();
        let ids = self.add_many(vec![AddManyRecord {
            doc_id: None,
            indices,
            data,
            text: Some(text.to_string()),
            tags,
            seq: timestamp,
        }])?;
        Ok(ids[0])
    }

    /// Add a batch of records. A record with empty `indices` and `text: Some`
    /// is encoded via this index's encoder; a record with non-empty
    /// `indices`/`data` is taken as pre-encoded, per the caller surface's
    /// `{ doc_id, indices, data, text?, tags?, seq? }` shape.
    pub fn add_many(&self, records: Vec<AddManyRecord>) -> Result<Vec<DocId>> {
        let mut out = Vec::with_capacity(records.len());
        let mut state = self.write_state.lock();

        for record in records {
            let (indices, data) = if record.indices.is_empty() && record.text.is_some() {
                self.encoder
                    .encode(&[record.text.as_deref().unwrap_or("")])
                    .into_iter()
                    .next()
                    .unwrap_or_default()
            } else {
                (record.indices, record.data)
            };

            let mut tag_labels: Vec<&str> = Vec::with_capacity(record.tags.len());
            for tag in &record.tags {
                match tag {
                    Tag::Flat(l) => tag_labels.push(l.as_str()),
                    Tag::Kv(k, v) => {
                        tag_labels.push(k.as_str());
                        tag_labels.push(v.as_str());
                    }
                }
            }
            self.limits.check(
                indices.len(),
                record.tags.len(),
                &tag_labels,
                record.text.as_ref().map(|t| t.len()),
            )?;
            if indices.windows(2).any(|w| w[0] >= w[1]) {
                return Err(EngineError::validation("term indices must be strictly ascending"));
            }

            let doc_id = match record.doc_id {
                Some(id) => {
                    if self.storage.meta.get_doc(id)?.is_some() {
                        return Err(EngineError::validation(format!("doc_id {id} already exists")));
                    }
                    id
                }
                None => self.storage.meta.next_doc_id()?,
            };
            let seq = match record.seq {
                Some(s) => s,
                None => self.storage.meta.next_seq()?,
            };

            let row_offset = state.writer.add_row(doc_id, &indices, &data);

            for &term in &indices {
                state.union(format!("term:{term}"), doc_id);
                *state.term_df_deltas.entry(format!("term_df:{term}")).or_insert(0) += 1;
            }
            for tag in &record.tags {
                state.union(tag.bitmap_name(), doc_id);
            }
            state.union("universe".to_string(), doc_id);

            state.docs.push(Document {
                doc_id,
                segment_id: String::new(),
                row_offset,
                seq,
                text: record.text,
                tags: record.tags,
            });

            out.push(doc_id);
        }

        Ok(out)
    }

    /// Materialize buffered rows into a new durable segment. A no-op when
    /// nothing has been added since the last flush.
    pub fn flush(&self) -> Result<()> {
        let mut state = self.write_state.lock();
        if state.writer.is_empty() {
            return Ok(());
        }

        let epoch = self.storage.meta.incr_stat("segment_epoch", 1)?;
        let name = format!("seg_{epoch:06}");
        let dims = self.encoder.dims();
        let row_count = state.writer.row_count() as u64;

        state.writer.publish(&self.storage.paths.segments_dir, &name)?;

        {
            let mut manifest = self.storage.manifest.lock();
            manifest.append_segment(name.clone(), row_count, dims)?;
        }

        for doc in state.docs.iter_mut() {
            doc.segment_id = name.clone();
        }

        let bitmap_unions: Vec<(String, Bitmap)> = state.bitmap_unions.drain().collect();
        let term_df_deltas: Vec<(String, i64)> = state.term_df_deltas.drain().collect();
        self.storage.meta.commit_flush(&state.docs, &bitmap_unions, &term_df_deltas)?;

        *state = WriteState::new();
        Ok(())
    }

    /// Tombstone a single doc id. Unknown ids are a silent no-op.
    pub fn remove(&self, doc_id: DocId) -> Result<()> {
        self.storage.meta.union_into("tombstones", &Bitmap::of_one(doc_id))?;
        Ok(())
    }

    /// Tombstone a batch of doc ids. Unknown ids are silently ignored.
    pub fn remove_many(&self, doc_ids: &[DocId]) -> Result<()> {
        self.storage
            .meta
            .union_into("tombstones", &Bitmap::from_ids(doc_ids.iter().copied()))?;
        Ok(())
    }

    /// Tombstone every alive doc id matching `scope`. With `dry_run`, only
    /// reports the count that would be affected.
    pub fn remove_by(&self, scope: &Scope, dry_run: bool) -> Result<u64> {
        let alive = self.alive_bitmap()?;
        let tag_scope = to_tag_scope(scope);
        let matched = build_base_bitmap(&alive, &tag_scope, &Bitmap::empty(), &|name| self.get_bitmap(name));
        let count = matched.cardinality();
        if !dry_run {
            self.storage.meta.union_into("tombstones", &matched)?;
        }
        Ok(count)
    }

    /// Encode `text` and run a score-profile (or recency-profile) search.
    pub fn search(&self, text: &str, opts: &SearchOptions) -> Result<Vec<SearchResult>> {
        let q_terms: Vec<(u32, f32)> = if text.is_empty() {
            Vec::new()
        } else {
            let (indices, data) = self.encoder.encode(&[text]).into_iter().next().unwrap_or_default();
            indices.into_iter().zip(data).collect()
        };
        self.search_terms(&q_terms, opts)
    }

    /// Run a score-profile (or recency-profile) search directly against
    /// pre-encoded query terms.
    pub fn search_terms(&self, q_terms: &[(u32, f32)], opts: &SearchOptions) -> Result<Vec<SearchResult>> {
        let dims = self.storage.manifest.lock().manifest().dims;
        if dims != 0 {
            if let Some(&(bad_term, _)) = q_terms.iter().find(|&&(t, _)| t >= dims) {
                return Err(EngineError::validation(format!(
                    "query term id {bad_term} is out of range for dims {dims}"
                )));
            }
        }

        let alive = self.alive_bitmap()?;
        let exclude = parse_exclude_doc_ids(&opts.exclude_doc_ids);
        let tag_scope = to_tag_scope(&opts.scope);
        let base = build_base_bitmap(&alive, &tag_scope, &exclude, &|name| self.get_bitmap(name));

        let merged = if opts.profile == Profile::Recent {
            // No term gating runs for the recency profile: the candidate
            // budget is `k` (or the caller's override), not a preset.
            let budget = opts.knobs().budget.max(opts.k as u32);
            let candidates = recollex_search::recency_candidates(&base, budget);
            let mut rows = if q_terms.is_empty() {
                self.hydrate_recency_rows(&candidates)?
            } else {
                self.score_all_segments(&candidates, q_terms)?
            };
            if let Some(min_score) = opts.min_score {
                if !q_terms.is_empty() {
                    rows.retain(|r| r.score >= min_score);
                }
            }
            merge_recent_top_k(rows, opts.k)
        } else {
            let knobs = opts.knobs();
            let total_docs = alive.cardinality();
            let filter = select_terms(&base, q_terms, &knobs, total_docs, &|t| self.df_lookup(t), &|name| {
                self.get_bitmap(name)
            });
            let budget = knobs.budget.max(opts.k as u32);
            let candidates = score_candidates(&filter.base, &filter.must, &filter.should, budget, &|name| {
                self.get_bitmap(name)
            });
            let mut rows = self.score_all_segments(&candidates, q_terms)?;
            if let Some(min_score) = opts.min_score {
                rows.retain(|r| r.score >= min_score);
            }
            merge_top_k(rows, opts.k)
        };

        self.hydrate_results(merged)
    }

    /// `last(k, scope) = search("", profile=recent, k, scope)`.
    pub fn last(&self, k: usize, scope: Scope) -> Result<Vec<SearchResult>> {
        let opts = SearchOptions {
            k,
            scope,
            profile: Profile::Recent,
            ..SearchOptions::default()
        };
        self.search("", &opts)
    }

    /// Run compaction, physically dropping tombstoned rows. Returns the
    /// number of rows purged.
    pub fn compact(&self) -> Result<usize> {
        let mut manifest = self.storage.manifest.lock();
        let purged = recollex_storage::compact(
            &self.storage.paths.segments_dir,
            &mut manifest,
            &self.storage.meta,
            &self.storage.reader_cache,
            &self.storage.csr_cache,
        )?;
        Ok(purged)
    }

    fn alive_bitmap(&self) -> Result<Bitmap> {
        let universe = self.storage.meta.get_bitmap("universe")?;
        let tombstones = self.storage.meta.get_bitmap("tombstones")?;
        Ok(universe.difference(&tombstones))
    }

    fn get_bitmap(&self, name: &str) -> Bitmap {
        self.storage.meta.get_bitmap(name).unwrap_or_else(|e| {
            warn!(bitmap = name, error = %e, "bitmap read failed, treating as empty");
            Bitmap::empty()
        })
    }

    /// Document frequency for `term_id`: the `term_df:<t>` stat if ever
    /// written, else the cardinality of `term:<t>` (spec section 7's
    /// "recovered locally" fallback).
    fn df_lookup(&self, term_id: u32) -> u32 {
        let key = format!("term_df:{term_id}");
        match self.storage.meta.has_stat(&key) {
            Ok(true) => self.storage.meta.get_stat(&key).unwrap_or(0).max(0) as u32,
            Ok(false) => self.get_bitmap(&format!("term:{term_id}")).cardinality() as u32,
            Err(e) => {
                warn!(term = term_id, error = %e, "stat read failed, falling back to term bitmap cardinality");
                self.get_bitmap(&format!("term:{term_id}")).cardinality() as u32
            }
        }
    }

    fn reader_for(&self, segment_id: &str) -> Result<std::sync::Arc<SegmentReader>> {
        let segment_dir = self.storage.paths.segments_dir.join(segment_id);
        self.storage
            .reader_cache
            .get_or_open(segment_id, || SegmentReader::open(&segment_dir))
            .map_err(EngineError::from)
    }

    /// Score `candidates` against `q_terms`, grouping by segment so each
    /// segment's reader and decoded CSR are fetched from cache once per
    /// query rather than once per row.
    fn score_all_segments(&self, candidates: &Bitmap, q_terms: &[(u32, f32)]) -> Result<Vec<MergeRow>> {
        let mut by_segment: FxHashMap<String, Vec<(u32, DocId, Seq)>> = FxHashMap::default();
        for doc_id in candidates.iter_sorted() {
            if let Some(doc) = self.storage.meta.get_doc(doc_id)? {
                by_segment
                    .entry(doc.segment_id.clone())
                    .or_default()
                    .push((doc.row_offset, doc_id, doc.seq));
            }
        }

        let mut rows = Vec::new();
        for (segment_idx, (segment_id, mut entries)) in by_segment.into_iter().enumerate() {
            entries.sort_by_key(|&(row_offset, _, _)| row_offset);
            let row_offsets: Vec<u32> = entries.iter().map(|&(r, _, _)| r).collect();

            let reader = self.reader_for(&segment_id)?;
            let decoded = self
                .storage
                .csr_cache
                .get_or_decode(&segment_id, || reader.to_decoded());

            let scored = score_segment(&decoded, &row_offsets, q_terms);

            for (scored_row, &(_, doc_id, seq)) in scored.iter().zip(entries.iter()) {
                rows.push(MergeRow {
                    score: scored_row.score,
                    seq,
                    doc_id,
                    segment_idx,
                    row_offset: scored_row.row_offset,
                });
            }
        }
        Ok(rows)
    }

    fn hydrate_recency_rows(&self, candidates: &Bitmap) -> Result<Vec<MergeRow>> {
        let mut rows = Vec::with_capacity(candidates.cardinality() as usize);
        for doc_id in candidates.iter_sorted() {
            if let Some(doc) = self.storage.meta.get_doc(doc_id)? {
                rows.push(MergeRow {
                    score: 0.0,
                    seq: doc.seq,
                    doc_id,
                    segment_idx: 0,
                    row_offset: doc.row_offset,
                });
            }
        }
        Ok(rows)
    }

    fn hydrate_results(&self, rows: Vec<MergeRow>) -> Result<Vec<SearchResult>> {
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let doc = self.storage.meta.get_doc(row.doc_id)?.ok_or_else(|| {
                EngineError::corruption(format!("doc_id {} missing from metadata store at hydration", row.doc_id))
            })?;
            out.push(SearchResult {
                doc_id: row.doc_id.to_string(),
                segment_id: doc.segment_id,
                row_offset: doc.row_offset,
                score: row.score,
                seq: doc.seq,
                text: doc.text,
                tags: doc.tags,
            });
        }
        Ok(out)
    }
}

fn to_tag_scope(scope: &Scope) -> TagScope {
    TagScope {
        all_of: scope.all_of_tags.clone(),
        one_of: scope.one_of_tags.clone(),
        none_of: scope.none_of_tags.clone(),
    }
}
