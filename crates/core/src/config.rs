//! Index-open configuration and query-time gating/profile knobs.
//!
//! `OpenOptions` mirrors the teacher's `DatabaseConfig`: cache sizing and
//! timeout knobs with sane production defaults and a `for_testing()`
//! constructor that shrinks everything for fast, low-memory test runs.
//! `GatingKnobs` and `Profile` carry the query-time tuning described in
//! spec.md section 4.9.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Options controlling how an index directory is opened: cache sizing, lock
/// behavior, and default gating knobs for queries that don't override them.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenOptions {
    /// Max number of decoded bitmaps kept in the bitmap LRU.
    pub bitmap_cache_entries: usize,
    /// Max number of open segment readers kept in the segment-reader LRU.
    pub segment_reader_cache_entries: usize,
    /// Max number of decoded CSR matrices kept in the CSR LRU.
    pub csr_cache_entries: usize,
    /// Max total bytes of decoded CSR matrices kept in the CSR LRU.
    pub csr_cache_bytes: usize,
    /// How long to wait for the manifest's cross-process lock before
    /// returning a `LockError` (surfaced to callers as `EngineError::Lock`).
    pub lock_timeout: Duration,
    /// Force the sidecar `.pid` lock fallback even when `fs2` advisory
    /// locking is available. Also settable via the `FORCE_PID_LOCK`
    /// environment variable (`1`/`true` enables it).
    pub force_pid_lock: bool,
    /// Default gating knobs applied to queries that don't supply their own.
    pub default_gating: GatingKnobs,
}

impl Default for OpenOptions {
    fn default() -> Self {
        OpenOptions {
            bitmap_cache_entries: 256,
            segment_reader_cache_entries: 64,
            csr_cache_entries: 128,
            csr_cache_bytes: 512 * 1024 * 1024,
            lock_timeout: Duration::from_secs(30),
            force_pid_lock: force_pid_lock_from_env(),
            default_gating: Profile::Rag.knobs(),
        }
    }
}

impl OpenOptions {
    /// Config tuned for unit/integration tests: tiny caches, short timeouts,
    /// so failures surface fast and tests don't contend on real cache
    /// capacity. Mirrors `DatabaseConfig::for_testing()`.
    pub fn for_testing() -> Self {
        OpenOptions {
            bitmap_cache_entries: 8,
            segment_reader_cache_entries: 4,
            csr_cache_entries: 8,
            csr_cache_bytes: 8 * 1024 * 1024,
            lock_timeout: Duration::from_millis(500),
            force_pid_lock: false,
            default_gating: Profile::Rag.knobs(),
        }
    }
}

fn force_pid_lock_from_env() -> bool {
    match env::var("FORCE_PID_LOCK") {
        Ok(v) => matches!(v.as_str(), "1" | "true" | "TRUE" | "yes"),
        Err(_) => false,
    }
}

/// Query-time knobs controlling the adaptive MUST/SHOULD term-gating filter
/// policy (spec.md section 4.5) and the candidate supplier's truncation cap
/// (section 4.6). `budget` serves both roles (see SPEC_FULL.md section D.1).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GatingKnobs {
    /// Greedy MUST-selection stop threshold and candidate-supplier
    /// truncation cap.
    pub budget: u32,
    /// Minimum number of MUST terms selected regardless of `budget`.
    pub min_must: u32,
    /// Maximum number of SHOULD terms considered after MUST selection.
    pub should_cap: u32,
    /// Percentage (0-100) of the highest-document-frequency terms dropped
    /// from MUST consideration entirely before the greedy pass runs.
    pub df_drop_top_percent: f32,
}

impl GatingKnobs {
    fn rag() -> Self {
        GatingKnobs {
            budget: 150_000,
            min_must: 0,
            should_cap: 200,
            df_drop_top_percent: 0.5,
        }
    }

    fn paraphrase_hp() -> Self {
        GatingKnobs {
            budget: 10_000,
            min_must: 3,
            should_cap: 24,
            df_drop_top_percent: 3.0,
        }
    }

    /// `min_must`/`should_cap`/`df_drop_top_percent` are not applicable to
    /// the recency profile (no term gating runs); `budget` is the row cap
    /// and is always overridden by the caller's requested `k`.
    fn recent() -> Self {
        GatingKnobs {
            budget: 0,
            min_must: 0,
            should_cap: 0,
            df_drop_top_percent: 0.0,
        }
    }

    /// Merge caller-supplied overrides on top of these base knobs. `None`
    /// fields inherit the base value.
    pub fn merged_with(&self, overrides: &OverrideKnobs) -> GatingKnobs {
        GatingKnobs {
            budget: overrides.budget.unwrap_or(self.budget),
            min_must: overrides.min_must.unwrap_or(self.min_must),
            should_cap: overrides.should_cap.unwrap_or(self.should_cap),
            df_drop_top_percent: overrides
                .df_drop_top_percent
                .unwrap_or(self.df_drop_top_percent),
        }
    }
}

/// Partial `GatingKnobs` overrides supplied at query time, merged over a
/// `Profile`'s preset via `GatingKnobs::merged_with`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OverrideKnobs {
    /// Override for `GatingKnobs::budget`.
    pub budget: Option<u32>,
    /// Override for `GatingKnobs::min_must`.
    pub min_must: Option<u32>,
    /// Override for `GatingKnobs::should_cap`.
    pub should_cap: Option<u32>,
    /// Override for `GatingKnobs::df_drop_top_percent`.
    pub df_drop_top_percent: Option<f32>,
}

/// Named gating presets. A query picks one by name and may layer
/// `OverrideKnobs` on top.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    /// Balanced defaults for retrieval-augmented-generation style lookups.
    Rag,
    /// Wider term gating for paraphrase-heavy queries at the cost of more
    /// scoring work.
    ParaphraseHp,
    /// Narrow gating tuned for recency-ordered browsing (`last(k, ...)`).
    Recent,
}

impl Profile {
    /// The preset `GatingKnobs` for this profile.
    pub fn knobs(&self) -> GatingKnobs {
        match self {
            Profile::Rag => GatingKnobs::rag(),
            Profile::ParaphraseHp => GatingKnobs::paraphrase_hp(),
            Profile::Recent => GatingKnobs::recent(),
        }
    }

    /// Parse a profile name (`"rag"`, `"paraphrase_hp"`, `"recent"`). Falls
    /// back to `Rag` for unrecognized names, matching the "unknown profile
    /// behaves like the default" fallback convention used elsewhere in the
    /// engine facade.
    pub fn from_name(name: &str) -> Profile {
        match name {
            "paraphrase_hp" => Profile::ParaphraseHp,
            "recent" => Profile::Recent,
            _ => Profile::Rag,
        }
    }
}
