//! Request and result shapes for the engine facade, mirroring the
//! language-neutral caller surface of spec.md section 6.

use recollex_core::{DocId, GatingKnobs, OverrideKnobs, Profile, Seq, Tag};

/// One pre-encoded record for `add_many`: the caller already ran its own
/// encoder and supplies `(indices, data)` directly.
#[derive(Debug, Clone, Default)]
pub struct AddManyRecord {
    /// Caller-assigned doc id. Validation fails if it collides with an
    /// existing one; `None` lets the engine assign the next id.
    pub doc_id: Option<DocId>,
    /// Strictly ascending, `< dims`, nonzero term ids.
    pub indices: Vec<u32>,
    /// Nonnegative weights, parallel to `indices`.
    pub data: Vec<f32>,
    /// Optional verbatim text stored for hydration.
    pub text: Option<String>,
    /// Tags attached at add time.
    pub tags: Vec<Tag>,
    /// Caller-assigned `seq`; `None` lets the engine assign the next one.
    pub seq: Option<Seq>,
}

/// Tag-scoping arguments shared by `search`/`search_terms`/`last`/`remove_by`.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    /// AND-semantics tag scope.
    pub all_of_tags: Vec<String>,
    /// OR-semantics tag scope.
    pub one_of_tags: Vec<String>,
    /// NOT-semantics tag scope.
    pub none_of_tags: Vec<String>,
}

/// Tail arguments shared by every search entry point.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Number of results to return.
    pub k: usize,
    /// Tag scope.
    pub scope: Scope,
    /// Which gating preset to apply.
    pub profile: Profile,
    /// Doc ids to exclude, as strings or integers (non-numeric dropped).
    pub exclude_doc_ids: Vec<String>,
    /// Per-call overrides merged over the profile's preset.
    pub override_knobs: OverrideKnobs,
    /// Post-scoring cutoff: drop rows with `score < min_score`.
    pub min_score: Option<f32>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        SearchOptions {
            k: 10,
            scope: Scope::default(),
            profile: Profile::Rag,
            exclude_doc_ids: Vec::new(),
            override_knobs: OverrideKnobs::default(),
            min_score: None,
        }
    }
}

impl SearchOptions {
    pub(crate) fn knobs(&self) -> GatingKnobs {
        self.profile.knobs().merged_with(&self.override_knobs)
    }
}

/// One hydrated search result row.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    /// Stable document identifier, stringified per the caller surface.
    pub doc_id: String,
    /// Segment holding this document's CSR row.
    pub segment_id: String,
    /// Row offset into that segment.
    pub row_offset: u32,
    /// Sparse dot-product score, or `0.0` under the recency profile.
    pub score: f32,
    /// Insertion-order sequence number.
    pub seq: Seq,
    /// Stored verbatim text, if any.
    pub text: Option<String>,
    /// Tags attached at add time.
    pub tags: Vec<Tag>,
}
