//! SQLite-backed metadata store: the docs table, named bitmaps
//! (term/tag/tombstone/universe postings), stats, and a small kv table used
//! for the monotonic `doc_id`/`seq` counters.
//!
//! Bitmap blobs are cached in a bounded LRU so repeated `get_bitmap` calls
//! during a query avoid repeated SQLite reads and Roaring deserialization.

use lru::LruCache;
use parking_lot::Mutex;
use recollex_bitmap::Bitmap;
use recollex_core::{DocId, Document, Seq, Tag};
use rusqlite::{params, Connection, OptionalExtension};
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

/// Errors raised by the metadata store.
#[derive(Debug, thiserror::Error)]
pub enum MetaStoreError {
    /// Underlying SQLite error.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A bitmap blob in the `bitmaps` table failed to deserialize.
    #[error("corrupt bitmap blob for {name}: {source}")]
    BitmapCorrupt {
        /// Bitmap name that failed to decode.
        name: String,
        /// Underlying deserialization error.
        source: std::io::Error,
    },

    /// A docs row's `tags` column failed to parse as JSON.
    #[error("corrupt tags JSON for doc_id {doc_id}: {source}")]
    TagsCorrupt {
        /// The affected doc id.
        doc_id: DocId,
        /// Underlying JSON error.
        source: serde_json::Error,
    },
}

/// The embedded metadata store.
pub struct MetadataStore {
    conn: Mutex<Connection>,
    bitmap_cache: Mutex<LruCache<String, Bitmap>>,
    clock: AtomicU64,
}

impl MetadataStore {
    /// Open (creating if absent) the SQLite database at `path` and ensure
    /// its schema exists.
    pub fn open(path: &Path, bitmap_cache_entries: usize) -> Result<MetadataStore, MetaStoreError> {
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        let capacity = NonZeroUsize::new(bitmap_cache_entries.max(1)).unwrap();
        Ok(MetadataStore {
            conn: Mutex::new(conn),
            bitmap_cache: Mutex::new(LruCache::new(capacity)),
            clock: AtomicU64::new(0),
        })
    }

    /// In-memory store, useful for tests that don't need durability.
    pub fn open_in_memory(bitmap_cache_entries: usize) -> Result<MetadataStore, MetaStoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        let capacity = NonZeroUsize::new(bitmap_cache_entries.max(1)).unwrap();
        Ok(MetadataStore {
            conn: Mutex::new(conn),
            bitmap_cache: Mutex::new(LruCache::new(capacity)),
            clock: AtomicU64::new(0),
        })
    }

    fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS docs (
                doc_id TEXT PRIMARY KEY,
                segment_id TEXT NOT NULL,
                row_offset INTEGER NOT NULL,
                seq INTEGER NOT NULL,
                text TEXT,
                tags TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_docs_segment_row ON docs(segment_id, row_offset);
            CREATE INDEX IF NOT EXISTS idx_docs_seq ON docs(seq);

            CREATE TABLE IF NOT EXISTS bitmaps (
                name TEXT PRIMARY KEY,
                data BLOB NOT NULL,
                last_used INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS stats (
                key TEXT PRIMARY KEY,
                value INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )
    }

    fn tick(&self) -> i64 {
        self.clock.fetch_add(1, Ordering::Relaxed) as i64
    }

    /// Fetch a named bitmap, or the empty bitmap if it has never been
    /// written.
    pub fn get_bitmap(&self, name: &str) -> Result<Bitmap, MetaStoreError> {
        if let Some(bm) = self.bitmap_cache.lock().get(name) {
            return Ok(bm.clone());
        }
        let conn = self.conn.lock();
        let blob: Option<Vec<u8>> = conn
            .query_row("SELECT data FROM bitmaps WHERE name = ?1", params![name], |r| r.get(0))
            .optional()?;
        let bitmap = match blob {
            Some(bytes) => Bitmap::deserialize(&bytes).map_err(|source| MetaStoreError::BitmapCorrupt {
                name: name.to_string(),
                source,
            })?,
            None => Bitmap::empty(),
        };
        drop(conn);
        self.bitmap_cache.lock().put(name.to_string(), bitmap.clone());
        Ok(bitmap)
    }

    /// Overwrite a named bitmap's stored value.
    pub fn put_bitmap(&self, name: &str, bitmap: &Bitmap) -> Result<(), MetaStoreError> {
        let bytes = bitmap.serialize();
        let last_used = self.tick();
        self.conn.lock().execute(
            "INSERT INTO bitmaps(name, data, last_used) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET data = excluded.data, last_used = excluded.last_used",
            params![name, bytes, last_used],
        )?;
        self.bitmap_cache.lock().put(name.to_string(), bitmap.clone());
        Ok(())
    }

    /// Union `delta` into the named bitmap (read-modify-write).
    pub fn union_into(&self, name: &str, delta: &Bitmap) -> Result<(), MetaStoreError> {
        let mut current = self.get_bitmap(name)?;
        current.union_with(delta);
        self.put_bitmap(name, &current)
    }

    /// Remove every member of `delta` from the named bitmap.
    pub fn remove_from(&self, name: &str, delta: &Bitmap) -> Result<(), MetaStoreError> {
        let mut current = self.get_bitmap(name)?;
        current.and_not_into(delta);
        self.put_bitmap(name, &current)
    }

    /// Fetch one document's metadata row.
    pub fn get_doc(&self, doc_id: DocId) -> Result<Option<Document>, MetaStoreError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT doc_id, segment_id, row_offset, seq, text, tags FROM docs WHERE doc_id = ?1",
                params![doc_id.to_string()],
                |r| {
                    Ok((
                        r.get::<_, String>(0)?,
                        r.get::<_, String>(1)?,
                        r.get::<_, i64>(2)?,
                        r.get::<_, i64>(3)?,
                        r.get::<_, Option<String>>(4)?,
                        r.get::<_, Option<String>>(5)?,
                    ))
                },
            )
            .optional()?;
        drop(conn);
        match row {
            None => Ok(None),
            Some((id_str, segment_id, row_offset, seq, text, tags_json)) => {
                let tags: Vec<Tag> = match tags_json {
                    Some(json) => serde_json::from_str(&json)
                        .map_err(|source| MetaStoreError::TagsCorrupt { doc_id, source })?,
                    None => Vec::new(),
                };
                Ok(Some(Document {
                    doc_id: id_str.parse().unwrap_or(doc_id),
                    segment_id,
                    row_offset: row_offset as u32,
                    seq,
                    text,
                    tags,
                }))
            }
        }
    }

    /// Insert or replace a batch of docs rows in one transaction.
    pub fn put_docs(&self, docs: &[Document]) -> Result<(), MetaStoreError> {
        let mut conn = self.conn.lock();
        let txn = conn.transaction()?;
        for doc in docs {
            let tags_json = serde_json::to_string(&doc.tags).expect("tag serialization is infallible");
            txn.execute(
                "INSERT INTO docs(doc_id, segment_id, row_offset, seq, text, tags)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(doc_id) DO UPDATE SET
                    segment_id = excluded.segment_id,
                    row_offset = excluded.row_offset,
                    seq = excluded.seq,
                    text = excluded.text,
                    tags = excluded.tags",
                params![
                    doc.doc_id.to_string(),
                    doc.segment_id,
                    doc.row_offset,
                    doc.seq,
                    doc.text,
                    tags_json,
                ],
            )?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Delete a batch of docs rows. Unknown ids are silently ignored.
    pub fn delete_docs(&self, ids: &[DocId]) -> Result<(), MetaStoreError> {
        let mut conn = self.conn.lock();
        let txn = conn.transaction()?;
        for id in ids {
            txn.execute("DELETE FROM docs WHERE doc_id = ?1", params![id.to_string()])?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Add `delta` (may be negative) to a stat counter, returning its new
    /// value.
    pub fn incr_stat(&self, key: &str, delta: i64) -> Result<i64, MetaStoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO stats(key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = value + excluded.value",
            params![key, delta],
        )?;
        let value: i64 = conn.query_row("SELECT value FROM stats WHERE key = ?1", params![key], |r| r.get(0))?;
        Ok(value)
    }

    /// Read a stat counter, defaulting to `0` if never set. Per spec section
    /// 7's "recovered locally" list, a missing `term_df:<t>` entry should be
    /// treated by the caller as the cardinality of `term:<t>` rather than
    /// literal zero; this method just reports the raw stored value (or its
    /// absence as `0`) and leaves that reconciliation to the caller.
    pub fn get_stat(&self, key: &str) -> Result<i64, MetaStoreError> {
        let conn = self.conn.lock();
        let value: Option<i64> = conn
            .query_row("SELECT value FROM stats WHERE key = ?1", params![key], |r| r.get(0))
            .optional()?;
        Ok(value.unwrap_or(0))
    }

    /// True if `key` has ever been set in `stats` (distinguishes "never
    /// written" from "written as zero").
    pub fn has_stat(&self, key: &str) -> Result<bool, MetaStoreError> {
        let conn = self.conn.lock();
        let exists: Option<i64> = conn
            .query_row("SELECT 1 FROM stats WHERE key = ?1", params![key], |r| r.get(0))
            .optional()?;
        Ok(exists.is_some())
    }

    fn next_counter(&self, key: &str) -> Result<i64, MetaStoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO kv(key, value) VALUES (?1, '0')
             ON CONFLICT(key) DO NOTHING",
            params![key],
        )?;
        let current: String = conn.query_row("SELECT value FROM kv WHERE key = ?1", params![key], |r| r.get(0))?;
        let next: i64 = current.parse::<i64>().unwrap_or(0) + 1;
        conn.execute(
            "UPDATE kv SET value = ?2 WHERE key = ?1",
            params![key, next.to_string()],
        )?;
        Ok(next)
    }

    /// Allocate and persist the next `doc_id`. Monotonic for the life of the
    /// index directory.
    pub fn next_doc_id(&self) -> Result<DocId, MetaStoreError> {
        Ok(self.next_counter("next_doc_id")? as DocId)
    }

    /// Allocate and persist the next `seq`. Monotonic for the life of the
    /// index directory.
    pub fn next_seq(&self) -> Result<Seq, MetaStoreError> {
        self.next_counter("next_seq")
    }

    /// Read an arbitrary `kv` entry.
    pub fn get_kv(&self, key: &str) -> Result<Option<String>, MetaStoreError> {
        let conn = self.conn.lock();
        Ok(conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |r| r.get(0))
            .optional()?)
    }

    /// Write an arbitrary `kv` entry.
    pub fn put_kv(&self, key: &str, value: &str) -> Result<(), MetaStoreError> {
        self.conn.lock().execute(
            "INSERT INTO kv(key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    /// Commit one flush's worth of metadata changes in a single transaction:
    /// the new docs rows, every bitmap union this batch contributed to
    /// (`term:*`, `tag:*`, `universe`), and the `term_df:*` stat deltas.
    /// Matches spec section 4.4 step 3's "single metadata-store transaction".
    pub fn commit_flush(
        &self,
        docs: &[Document],
        bitmap_unions: &[(String, Bitmap)],
        term_df_deltas: &[(String, i64)],
    ) -> Result<(), MetaStoreError> {
        let mut current_bitmaps = Vec::with_capacity(bitmap_unions.len());
        for (name, delta) in bitmap_unions {
            let mut current = self.get_bitmap(name)?;
            current.union_with(delta);
            current_bitmaps.push((name.clone(), current));
        }

        {
            let mut conn = self.conn.lock();
            let txn = conn.transaction()?;
            for doc in docs {
                let tags_json = serde_json::to_string(&doc.tags).expect("tag serialization is infallible");
                txn.execute(
                    "INSERT INTO docs(doc_id, segment_id, row_offset, seq, text, tags)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT(doc_id) DO UPDATE SET
                        segment_id = excluded.segment_id,
                        row_offset = excluded.row_offset,
                        seq = excluded.seq,
                        text = excluded.text,
                        tags = excluded.tags",
                    params![
                        doc.doc_id.to_string(),
                        doc.segment_id,
                        doc.row_offset,
                        doc.seq,
                        doc.text,
                        tags_json,
                    ],
                )?;
            }
            let last_used = self.tick();
            for (name, bitmap) in &current_bitmaps {
                let bytes = bitmap.serialize();
                txn.execute(
                    "INSERT INTO bitmaps(name, data, last_used) VALUES (?1, ?2, ?3)
                     ON CONFLICT(name) DO UPDATE SET data = excluded.data, last_used = excluded.last_used",
                    params![name, bytes, last_used],
                )?;
            }
            for (key, delta) in term_df_deltas {
                txn.execute(
                    "INSERT INTO stats(key, value) VALUES (?1, ?2)
                     ON CONFLICT(key) DO UPDATE SET value = value + excluded.value",
                    params![key, delta],
                )?;
            }
            txn.commit()?;
        }

        let mut cache = self.bitmap_cache.lock();
        for (name, bitmap) in current_bitmaps {
            cache.put(name, bitmap);
        }
        Ok(())
    }

    /// Run `f` inside a single SQLite transaction, matching spec section
    /// 4.2's `begin()/commit()/rollback()` trio as a closure-scoped
    /// transaction (the idiomatic `rusqlite` equivalent): `f` returning `Err`
    /// rolls the transaction back, `Ok` commits it.
    pub fn transaction<F, T>(&self, f: F) -> Result<T, MetaStoreError>
    where
        F: FnOnce(&rusqlite::Transaction) -> Result<T, MetaStoreError>,
    {
        let mut conn = self.conn.lock();
        let txn = conn.transaction()?;
        let result = f(&txn)?;
        txn.commit()?;
        Ok(result)
    }
}
