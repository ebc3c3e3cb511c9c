//! Query-side building blocks: adaptive term gating, candidate-set algebra,
//! exact sparse scoring, and k-way rank merging. Orchestrated by the engine
//! crate, which wires these against a live `StorageHandle`.

pub mod candidates;
pub mod filter;
pub mod merge;
pub mod scorer;

pub use candidates::{recency_candidates, score_candidates};
pub use filter::{build_base_bitmap, parse_exclude_doc_ids, select_terms, FilterResult, TagScope, EVERYTHING};
pub use merge::{merge_recent_top_k, merge_top_k, MergeRow};
pub use scorer::{score_accumulator, score_segment, score_slice, ScoredRow, KERNEL_THRESHOLD};
