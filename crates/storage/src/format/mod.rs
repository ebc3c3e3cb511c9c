//! On-disk file formats: the manifest and the per-array tensor files.

pub mod array;
pub mod manifest;

pub use array::{ArrayFile, ArrayFileError, DType};
pub use manifest::{Manifest, ManifestError, ManifestManager, RowRange, SegmentRecord};
