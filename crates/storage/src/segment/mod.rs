//! Immutable CSR segments: writer (flush-time materialization) and reader
//! (memory-mapped, read-only access).

pub mod reader;
pub mod writer;

pub use reader::{CsrView, DecodedCsr, SegmentReader};
pub use writer::SegmentWriter;
