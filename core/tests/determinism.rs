//! THE MOST IMPORTANT TEST IN THE PROJECT.
//!
//! Two engines, same seed, same operations.
//! They must produce identical match rows, weight vectors and leaderboards.
//! Any divergence is a blocker — do not merge until fixed.

use resonance_core::{
    cancel::CancelToken,
    config::MatchConfig,
    engine::ResonanceEngine,
    leaderboard::LeaderboardEntry,
    matcher::EngineType,
    pillar_matcher::PillarTier,
    population::{self, PopulationSpec},
    source::{PersistenceSink, WeightVersion},
    store::MatchStore,
};

struct RunOutput {
    time_rows:    Vec<(String, String, u64)>,
    pillar_rows:  Vec<(String, String, u64)>,
    weights:      WeightVersion,
    time_board:   Vec<LeaderboardEntry>,
    pillar_board: Vec<LeaderboardEntry>,
}

fn run(seed: u64) -> RunOutput {
    let _ = env_logger::builder().is_test(true).try_init();
    let store = MatchStore::in_memory().expect("in-memory store");
    store.migrate().expect("migration");
    population::generate(seed, &PopulationSpec::default())
        .expect("population")
        .load_into(&store)
        .expect("load population");
    let engine = ResonanceEngine::new(store, MatchConfig::default()).expect("engine");

    for id in engine.store.entity_ids().unwrap() {
        engine.find_time_matches(&id, 1).unwrap();
        engine.find_pillar_matches(&id, PillarTier::Year).unwrap();
    }

    let corpus = engine.build_labeled_corpus().unwrap();
    let cancel = CancelToken::new();
    let weights = engine.tune_weights(&corpus, &cancel).unwrap();

    let rows = |engine_type| -> Vec<(String, String, u64)> {
        engine
            .store
            .match_results(engine_type)
            .unwrap()
            .into_iter()
            .map(|r| {
                let (lo, hi) = r.pair();
                (lo, hi, r.raw_score.to_bits())
            })
            .collect()
    };

    RunOutput {
        time_rows:    rows(EngineType::Time),
        pillar_rows:  rows(EngineType::Pillar),
        weights,
        time_board:   engine.rebuild_leaderboard(EngineType::Time, None, &cancel).unwrap(),
        pillar_board: engine.rebuild_leaderboard(EngineType::Pillar, None, &cancel).unwrap(),
    }
}

#[test]
fn same_seed_produces_identical_outputs() {
    const SEED: u64 = 0xDEAD_BEEF_CAFE_1234;

    let a = run(SEED);
    let b = run(SEED);

    assert_eq!(a.time_rows, b.time_rows, "time match rows diverged");
    assert_eq!(a.pillar_rows, b.pillar_rows, "pillar match rows diverged");
    assert_eq!(a.weights.weights, b.weights.weights, "tuned weights diverged");
    assert_eq!(
        a.weights.separation_score.to_bits(),
        b.weights.separation_score.to_bits()
    );
    assert_eq!(a.time_board, b.time_board, "time leaderboard diverged");
    assert_eq!(a.pillar_board, b.pillar_board, "pillar leaderboard diverged");
}

#[test]
fn different_seeds_produce_different_populations() {
    let a = run(42);
    let b = run(99);

    // With different seeds the generated timestamps should diverge.
    // This verifies that seed differences are actually observable.
    assert_ne!(a.time_rows, b.time_rows, "different seeds produced identical match rows");
}
