//! Size ceilings enforced at the engine boundary.
//!
//! Kept as a small standalone struct, mirroring the teacher's
//! `core/src/limits.rs` split between "things that are always true" and
//! "things a deployment can tune". Every ceiling here is a validation
//! concern: exceeding one returns a `LimitError`, never panics.

use serde::{Deserialize, Serialize};

/// Configurable ceilings on document shape.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Limits {
    /// Maximum number of nonzero (term_id, weight) pairs in a single
    /// document's sparse vector.
    pub max_nnz_per_doc: u32,
    /// Maximum number of tags a single document may carry.
    pub max_tags_per_doc: u32,
    /// Maximum byte length of a tag's label (or of each half of a `k=v`
    /// pair).
    pub max_tag_label_len: u32,
    /// Maximum byte length of the optional stored verbatim text.
    pub max_text_len: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_nnz_per_doc: 4096,
            max_tags_per_doc: 64,
            max_tag_label_len: 256,
            max_text_len: 1 << 20,
        }
    }
}

/// A limit was exceeded. Carries enough context to build an
/// `EngineError::Validation` message at the call site.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LimitError {
    /// Document had more nonzero entries than `max_nnz_per_doc`.
    #[error("document has {actual} nonzero entries, exceeding the limit of {limit}")]
    TooManyNonzeros {
        /// Actual count.
        actual: usize,
        /// Configured ceiling.
        limit: u32,
    },
    /// Document had more tags than `max_tags_per_doc`.
    #[error("document has {actual} tags, exceeding the limit of {limit}")]
    TooManyTags {
        /// Actual count.
        actual: usize,
        /// Configured ceiling.
        limit: u32,
    },
    /// A tag label exceeded `max_tag_label_len`.
    #[error("tag label is {actual} bytes, exceeding the limit of {limit}")]
    TagLabelTooLong {
        /// Actual byte length.
        actual: usize,
        /// Configured ceiling.
        limit: u32,
    },
    /// Stored text exceeded `max_text_len`.
    #[error("text is {actual} bytes, exceeding the limit of {limit}")]
    TextTooLong {
        /// Actual byte length.
        actual: usize,
        /// Configured ceiling.
        limit: u32,
    },
}

impl Limits {
    /// Check a document's shape (nnz count, tag count, tag label lengths,
    /// text length) against these limits. `tag_count` is the number of tags
    /// on the document; `tag_labels` is every string that counts toward
    /// `max_tag_label_len` (a `Kv` tag contributes both its key and its
    /// value, so `tag_labels.len()` may exceed `tag_count`).
    pub fn check(
        &self,
        nnz: usize,
        tag_count: usize,
        tag_labels: &[&str],
        text_len: Option<usize>,
    ) -> Result<(), LimitError> {
        if nnz > self.max_nnz_per_doc as usize {
            return Err(LimitError::TooManyNonzeros {
                actual: nnz,
                limit: self.max_nnz_per_doc,
            });
        }
        if tag_count > self.max_tags_per_doc as usize {
            return Err(LimitError::TooManyTags {
                actual: tag_count,
                limit: self.max_tags_per_doc,
            });
        }
        for label in tag_labels {
            if label.len() > self.max_tag_label_len as usize {
                return Err(LimitError::TagLabelTooLong {
                    actual: label.len(),
                    limit: self.max_tag_label_len,
                });
            }
        }
        if let Some(len) = text_len {
            if len > self.max_text_len as usize {
                return Err(LimitError::TextTooLong {
                    actual: len,
                    limit: self.max_text_len,
                });
            }
        }
        Ok(())
    }
}
