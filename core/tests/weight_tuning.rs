//! Weight tuner tests — grid shape, selection, tie-break, failure modes.

use resonance_core::{
    cancel::CancelToken,
    composite::{CompositeScorer, SubScores},
    config::{CompositeConfig, MatchConfig, TunerConfig, WeightVector},
    engine::ResonanceEngine,
    error::ResonanceError,
    event::AuditEvent,
    population::{self, PopulationSpec},
    source::PersistenceSink,
    store::MatchStore,
    weight_tuner::{GridPoint, LabeledPair, WeightTuner},
};

fn build_engine() -> ResonanceEngine<MatchStore> {
    let _ = env_logger::builder().is_test(true).try_init();
    let store = MatchStore::in_memory().expect("in-memory store");
    store.migrate().expect("migration");
    ResonanceEngine::new(store, MatchConfig::default()).expect("engine")
}

fn tuner() -> WeightTuner {
    WeightTuner::new(TunerConfig::default(), CompositeScorer::new(&CompositeConfig::default()))
}

fn pair(id: usize, similar: bool, subs: SubScores) -> LabeledPair {
    LabeledPair {
        subject_id:       format!("s{id}"),
        candidate_id:     format!("c{id}"),
        sub_scores:       subs,
        is_known_similar: similar,
    }
}

/// Similar pairs differ from dissimilar ones only in the time sub-score,
/// so separation is 100 × time weight and every vector with time = 60
/// ties at the top.
fn time_driven_corpus() -> Vec<LabeledPair> {
    let flat = |time| SubScores { time, pillar: Some(50.0), parental: Some(50.0) };
    vec![
        pair(0, true, flat(100.0)),
        pair(1, true, flat(100.0)),
        pair(2, false, flat(0.0)),
        pair(3, false, flat(0.0)),
    ]
}

#[test]
fn grid_respects_step_floor_ceiling_and_sum() {
    let grid = tuner().grid();
    assert!(!grid.is_empty());
    for p in &grid {
        assert_eq!(p.time + p.pillar + p.parental, 100);
        for v in [p.time, p.pillar, p.parental] {
            assert!((10..=60).contains(&v), "{p:?} leaves the 10..=60 band");
            assert_eq!(v % 5, 0, "{p:?} is off the 5-point step");
        }
    }
    let mut unique = grid.clone();
    unique.dedup();
    assert_eq!(unique.len(), grid.len());
}

#[test]
fn ties_without_history_take_the_earliest_grid_point() {
    let outcome = tuner()
        .tune(&time_driven_corpus(), None, &CancelToken::new())
        .unwrap();
    assert_eq!(outcome.point, GridPoint { time: 60, pillar: 10, parental: 30 });
    assert!((outcome.separation_score - 60.0).abs() < 1e-9);
    assert_eq!(outcome.similar_pairs, 2);
    assert_eq!(outcome.dissimilar_pairs, 2);
}

#[test]
fn ties_prefer_the_vector_closest_to_the_previous_one() {
    let previous = WeightVector::from_points(50, 30, 20);
    let outcome = tuner()
        .tune(&time_driven_corpus(), Some(&previous), &CancelToken::new())
        .unwrap();
    // (60,20,20), (60,25,15) and (60,30,10) are all 20 points away;
    // the earliest of them wins.
    assert_eq!(outcome.point, GridPoint { time: 60, pillar: 20, parental: 20 });
}

#[test]
fn selected_vector_sums_to_one() {
    let engine = build_engine();
    let pop = population::generate(5, &PopulationSpec::default()).unwrap();
    pop.load_into(&engine.store).unwrap();

    let corpus = engine.build_labeled_corpus().unwrap();
    let version = engine.tune_weights(&corpus, &CancelToken::new()).unwrap();
    let w = version.weights;
    assert!((w.sum() - 1.0).abs() < 1e-9, "weights {w:?} do not sum to 1");
    assert!([w.time, w.pillar, w.parental].iter().all(|x| (0.1..=0.6 + 1e-12).contains(x)));
    assert_eq!(engine.active_weights().unwrap(), w);
    assert!(version.separation_score > 0.0, "similar pairs should outscore dissimilar ones");
}

#[test]
fn repeated_runs_select_identical_vectors() {
    let pop = population::generate(99, &PopulationSpec::default()).unwrap();

    let run = || {
        let engine = build_engine();
        pop.load_into(&engine.store).unwrap();
        let corpus = engine.build_labeled_corpus().unwrap();
        engine.tune_weights(&corpus, &CancelToken::new()).unwrap()
    };
    let a = run();
    let b = run();

    assert_eq!(a.weights.time.to_bits(), b.weights.time.to_bits());
    assert_eq!(a.weights.pillar.to_bits(), b.weights.pillar.to_bits());
    assert_eq!(a.weights.parental.to_bits(), b.weights.parental.to_bits());
    assert_eq!(a.separation_score.to_bits(), b.separation_score.to_bits());
}

#[test]
fn engine_uses_the_active_version_as_tie_anchor() {
    let engine = build_engine();
    let version = engine
        .tune_weights(&time_driven_corpus(), &CancelToken::new())
        .unwrap();
    // Baseline 50/30/20 is the anchor before any version exists.
    assert_eq!(version.weights, WeightVector::from_points(60, 20, 20));
    assert_eq!(version.version_id, 1);

    let again = engine
        .tune_weights(&time_driven_corpus(), &CancelToken::new())
        .unwrap();
    assert_eq!(again.weights, version.weights, "a tie must stay on the current vector");
    assert_eq!(again.version_id, 2);
}

#[test]
fn empty_label_class_keeps_the_previous_version() {
    let engine = build_engine();
    let accepted = engine
        .tune_weights(&time_driven_corpus(), &CancelToken::new())
        .unwrap();

    let only_similar: Vec<LabeledPair> = time_driven_corpus()
        .into_iter()
        .filter(|p| p.is_known_similar)
        .collect();
    match engine.tune_weights(&only_similar, &CancelToken::new()) {
        Err(ResonanceError::InsufficientSamples { similar: 2, dissimilar: 0 }) => {}
        other => panic!("expected InsufficientSamples, got {other:?}"),
    }
    assert!(matches!(
        engine.tune_weights(&[], &CancelToken::new()),
        Err(ResonanceError::InsufficientSamples { similar: 0, dissimilar: 0 })
    ));

    let active = engine.store.active_weight_version().unwrap().unwrap();
    assert_eq!(active.version_id, accepted.version_id);
    assert_eq!(engine.active_weights().unwrap(), accepted.weights);

    let events: Vec<AuditEvent> = engine
        .store
        .audit_log()
        .unwrap()
        .iter()
        .map(|e| e.event().unwrap())
        .collect();
    assert!(matches!(events[0], AuditEvent::WeightsAccepted { version_id: 1, .. }));
    assert!(matches!(events[1], AuditEvent::WeightsRejected { similar: 2, dissimilar: 0, .. }));
    assert_eq!(events.len(), 3);
}

#[test]
fn cancelled_tuning_persists_no_version() {
    let engine = build_engine();
    let cancel = CancelToken::new();
    cancel.cancel();

    let err = engine.tune_weights(&time_driven_corpus(), &cancel).unwrap_err();
    assert!(matches!(err, ResonanceError::Cancelled));
    assert!(engine.store.active_weight_version().unwrap().is_none());
    assert_eq!(
        engine.active_weights().unwrap(),
        MatchConfig::default().composite.baseline_weights
    );

    let log = engine.store.audit_log().unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].event_type, "job_cancelled");
}

#[test]
fn worker_count_does_not_change_the_result() {
    let scorer = CompositeScorer::new(&CompositeConfig::default());
    let pop = population::generate(31, &PopulationSpec::default()).unwrap();
    let engine = build_engine();
    pop.load_into(&engine.store).unwrap();
    let corpus = engine.build_labeled_corpus().unwrap();

    let outcomes: Vec<GridPoint> = [1, 2, 8]
        .into_iter()
        .map(|workers| {
            let config = TunerConfig { workers, ..TunerConfig::default() };
            WeightTuner::new(config, scorer.clone())
                .tune(&corpus, None, &CancelToken::new())
                .unwrap()
                .point
        })
        .collect();
    assert!(outcomes.windows(2).all(|w| w[0] == w[1]), "{outcomes:?}");
}
