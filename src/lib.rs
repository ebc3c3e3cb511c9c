//! # Recollex
//!
//! An embeddable local search index for SPLADE-style sparse learned
//! vectors — segmented append-only storage, a SQLite-backed metadata
//! store, and adaptive term gating over an inverted-bitmap index.
//!
//! # Quick Start
//!
//! ```no_run
//! use recollex::{Engine, Encoder, OpenOptions, Limits, SearchOptions, Tag};
//!
//! struct MyEncoder;
//! impl Encoder for MyEncoder {
//!     fn dims(&self) -> u32 { 30522 }
//!     fn encode(&self, texts: &[&str]) -> Vec<(Vec<u32>, Vec<f32>)> {
//!         texts.iter().map(|_| (vec![10, 20], vec![0.5, 0.7])).collect()
//!     }
//! }
//!
//! fn main() -> recollex::Result<()> {
//!     let engine = Engine::open("./my-index", OpenOptions::default(), MyEncoder, Limits::default())?;
//!     let doc_id = engine.add("hello world", vec![Tag::Flat("greeting".into())], None)?;
//!     engine.flush()?;
//!
//!     let results = engine.search("hello", &SearchOptions::default())?;
//!     assert_eq!(results.first().map(|r| r.doc_id.parse::<u64>().unwrap()), Some(doc_id));
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! The [`Engine`] struct is the main entry point. It wires together an
//! inverted-bitmap filter, a k-way rank merger, and segmented CSR storage
//! with a SQLite-backed metadata store. Internal crates (core, bitmap,
//! storage, search) are not exposed directly; only this crate's surface is
//! stable.

// Re-export the public API from recollex-engine.
pub use recollex_engine::*;
