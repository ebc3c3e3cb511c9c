//! Segmented CSR storage: array/manifest file formats, segment reader and
//! writer, the SQLite-backed metadata store, process-local caches, the
//! cross-process write lock, compaction, and the `StorageHandle` that ties
//! them together over one index directory.

pub mod cache;
pub mod compaction;
pub mod database;
pub mod format;
pub mod lock;
pub mod meta;
pub mod segment;

pub use cache::{CsrMatrixCache, SegmentReaderCache};
pub use compaction::{compact, CompactionError};
pub use database::{StorageError, StorageHandle, StoragePaths};
pub use format::{ArrayFile, ArrayFileError, Manifest, ManifestError, ManifestManager, RowRange, SegmentRecord};
pub use lock::{IndexLock, LockError};
pub use meta::{MetaStoreError, MetadataStore};
pub use segment::{CsrView, DecodedCsr, SegmentReader, SegmentWriter};
