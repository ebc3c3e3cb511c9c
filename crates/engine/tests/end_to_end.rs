//! End-to-end scenarios against a real `StorageHandle` (temp directory) and
//! a small deterministic encoder stub, mirroring the fixed corpus.

use recollex_engine::{Engine, Encoder, Limits, OpenOptions, Profile, Scope, SearchOptions, Tag};
use std::collections::HashMap;
use tempfile::tempdir;

/// Maps fixed phrases to fixed sparse vectors.
struct FixtureEncoder {
    table: HashMap<&'static str, (Vec<u32>, Vec<f32>)>,
}

impl FixtureEncoder {
    fn new() -> Self {
        let mut table = HashMap::new();
        table.insert("alpha beta", (vec![10, 20], vec![0.5, 0.7]));
        table.insert("gamma", (vec![30], vec![0.9]));
        table.insert("alpha", (vec![10], vec![1.0]));
        table.insert("beta", (vec![20], vec![1.0]));
        table.insert("zeta", (vec![40], vec![1.0]));
        FixtureEncoder { table }
    }
}

impl Encoder for FixtureEncoder {
    fn dims(&self) -> u32 {
        100
    }

    fn encode(&self, texts: &[&str]) -> Vec<(Vec<u32>, Vec<f32>)> {
        texts
            .iter()
            .map(|t| self.table.get(t).cloned().unwrap_or_default())
            .collect()
    }
}

fn open_engine(path: &std::path::Path) -> Engine<FixtureEncoder> {
    Engine::open(path, OpenOptions::for_testing(), FixtureEncoder::new(), Limits::default()).unwrap()
}

/// Seeds the fixed three-document corpus used by every scenario. `timestamp`
/// is left `None` on every add: it is an optional override for `seq`, not a
/// literal replay of wall-clock values, so auto-assignment is what produces
/// the `seq` values the scenarios describe.
fn seed_corpus(engine: &Engine<FixtureEncoder>) {
    let id1 = engine
        .add("alpha beta", vec![Tag::Flat("t:a".into()), Tag::Flat("t:b".into())], None)
        .unwrap();
    let id2 = engine.add("gamma", vec![Tag::Flat("t:a".into())], None).unwrap();
    let id3 = engine.add("alpha", vec![Tag::Flat("t:b".into())], None).unwrap();
    assert_eq!((id1, id2, id3), (1, 2, 3));
    engine.flush().unwrap();
}

#[test]
fn scenario_1_search_alpha_orders_by_score() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path());
    seed_corpus(&engine);

    let results = engine.search("alpha", &SearchOptions::default()).unwrap();
    let ids_and_scores: Vec<(String, f32)> = results.iter().map(|r| (r.doc_id.clone(), r.score)).collect();
    assert_eq!(ids_and_scores, vec![("3".to_string(), 1.0), ("1".to_string(), 0.5)]);
}

#[test]
fn scenario_2_search_alpha_scoped_to_tag_b() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path());
    seed_corpus(&engine);

    let opts = SearchOptions {
        scope: Scope {
            all_of_tags: vec!["t:b".to_string()],
            ..Scope::default()
        },
        ..SearchOptions::default()
    };
    let results = engine.search("alpha", &opts).unwrap();
    let ids_and_scores: Vec<(String, f32)> = results.iter().map(|r| (r.doc_id.clone(), r.score)).collect();
    assert_eq!(ids_and_scores, vec![("3".to_string(), 1.0), ("1".to_string(), 0.5)]);
}

#[test]
fn scenario_3_search_term_absent_from_corpus_is_empty() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path());
    seed_corpus(&engine);

    let results = engine.search("zeta", &SearchOptions::default()).unwrap();
    assert!(results.is_empty());
}

#[test]
fn scenario_4_tombstoned_doc_excluded_from_results() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path());
    seed_corpus(&engine);

    engine.remove(3).unwrap();

    let results = engine.search("alpha", &SearchOptions::default()).unwrap();
    let ids_and_scores: Vec<(String, f32)> = results.iter().map(|r| (r.doc_id.clone(), r.score)).collect();
    assert_eq!(ids_and_scores, vec![("1".to_string(), 0.5)]);
}

#[test]
fn scenario_5_recency_profile_orders_by_seq_descending() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path());
    seed_corpus(&engine);
    engine.remove(3).unwrap();

    let results = engine.last(10, Scope::default()).unwrap();
    let ids: Vec<String> = results.iter().map(|r| r.doc_id.clone()).collect();
    assert_eq!(ids, vec!["2".to_string(), "1".to_string()]);
    assert!(results.iter().all(|r| r.score == 0.0));

    let seqs: Vec<i64> = results.iter().map(|r| r.seq).collect();
    assert!(seqs.windows(2).all(|w| w[0] > w[1]));
}

#[test]
fn add_validates_query_terms_against_dims() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path());
    seed_corpus(&engine);

    let opts = SearchOptions::default();
    let err = engine.search_terms(&[(1000, 1.0)], &opts).unwrap_err();
    assert!(matches!(err, recollex_engine::EngineError::Validation(_)));
}

#[test]
fn remove_by_scope_tombstones_matching_docs() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path());
    seed_corpus(&engine);

    let scope = Scope {
        all_of_tags: vec!["t:a".to_string()],
        ..Scope::default()
    };
    let count = engine.remove_by(&scope, false).unwrap();
    assert_eq!(count, 2);

    let results = engine.last(10, Scope::default()).unwrap();
    let ids: Vec<String> = results.iter().map(|r| r.doc_id.clone()).collect();
    assert_eq!(ids, vec!["3".to_string()]);
}

#[test]
fn recent_profile_with_query_and_min_score_filters_then_orders_by_seq() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path());
    seed_corpus(&engine);

    let opts = SearchOptions {
        profile: Profile::Recent,
        min_score: Some(0.6),
        k: 10,
        ..SearchOptions::default()
    };
    // "alpha" scores doc 3 at 1.0 and doc 1 at 0.5; min_score=0.6 drops doc 1.
    let results = engine.search("alpha", &opts).unwrap();
    let ids: Vec<String> = results.iter().map(|r| r.doc_id.clone()).collect();
    assert_eq!(ids, vec!["3".to_string()]);
}
