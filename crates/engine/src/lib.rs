//! The `recollex-engine` crate wires `recollex-core`, `recollex-bitmap`,
//! `recollex-storage`, and `recollex-search` into the single `Engine` facade
//! that a caller opens, writes to, and queries.

mod encoder;
mod error;
mod facade;
mod types;

pub use encoder::Encoder;
pub use error::{EngineError, Result};
pub use facade::Engine;
pub use types::{AddManyRecord, Scope, SearchOptions, SearchResult};

pub use recollex_core::{DocId, GatingKnobs, Limits, OpenOptions, OverrideKnobs, Profile, Seq, Tag};
