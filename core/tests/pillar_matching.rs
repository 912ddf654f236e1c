//! Pillar matcher tests — nested tiers, auxiliary flags, alphabet checks.

use chrono::NaiveDateTime;
use resonance_core::{
    config::{MatchConfig, PillarScoreTable},
    engine::ResonanceEngine,
    error::ResonanceError,
    fingerprint::TimeFingerprint,
    matcher::EngineType,
    pillar::{Pillar, PillarSet, RawPillarSet},
    pillar_matcher::{FlagSource, PillarMatcher, PillarTier},
    source::PersistenceSink,
    store::MatchStore,
};

fn build_engine() -> ResonanceEngine<MatchStore> {
    let _ = env_logger::builder().is_test(true).try_init();
    let store = MatchStore::in_memory().expect("in-memory store");
    store.migrate().expect("migration");
    ResonanceEngine::new(store, MatchConfig::default()).expect("engine")
}

fn raw(year: &str, month: &str, day: &str, hour: &str) -> RawPillarSet {
    RawPillarSet {
        year:  year.into(),
        month: month.into(),
        day:   day.into(),
        hour:  hour.into(),
    }
}

fn insert(engine: &ResonanceEngine<MatchStore>, id: &str, pillars: RawPillarSet) {
    let ts = NaiveDateTime::parse_from_str("1999-09-09T09:09", "%Y-%m-%dT%H:%M").unwrap();
    let fp = TimeFingerprint::from_datetime(ts);
    engine.store.insert_entity(id, Some(ts), &fp, Some(&pillars)).unwrap();
}

/// Subject chart 甲子 丙寅 戊辰 庚午 and one neighbour per tier.
fn seed_tiers(engine: &ResonanceEngine<MatchStore>) {
    insert(engine, "subject", raw("甲子", "丙寅", "戊辰", "庚午"));
    insert(engine, "year", raw("甲子", "丁卯", "己巳", "辛未"));
    insert(engine, "year_month", raw("甲子", "丙寅", "乙丑", "辛未"));
    insert(engine, "year_month_day", raw("甲子", "丙寅", "戊辰", "辛未"));
    insert(engine, "full", raw("jia-zi", "Bing-Yin", "wu-chen", "GENG-WU"));
    insert(engine, "day_only", raw("乙丑", "丁卯", "戊辰", "庚午"));
}

#[test]
fn nested_tiers_score_0_20_40_70_100() {
    let engine = build_engine();
    seed_tiers(&engine);

    let results = engine.find_pillar_matches("subject", PillarTier::Unmatched).unwrap();
    let scores: Vec<(&str, f64)> = results
        .iter()
        .map(|r| (r.candidate_id.as_str(), r.raw_score))
        .collect();
    assert_eq!(
        scores,
        vec![
            ("full", 100.0),
            ("year_month_day", 70.0),
            ("year_month", 40.0),
            ("year", 20.0),
            ("day_only", 0.0),
        ]
    );
    assert!(results.iter().all(|r| r.engine_type == EngineType::Pillar));
}

#[test]
fn mode_is_the_minimum_tier() {
    let engine = build_engine();
    seed_tiers(&engine);

    let year_up = engine.find_pillar_matches("subject", PillarTier::Year).unwrap();
    assert_eq!(year_up.len(), 4, "day-only match must not qualify at year tier");

    let full = engine.find_pillar_matches("subject", PillarTier::Full).unwrap();
    assert_eq!(full.len(), 1);
    assert_eq!(full[0].candidate_id, "full");
    assert_eq!(
        full[0].matched_levels,
        vec!["year_pillar", "month_pillar", "day_pillar", "hour_pillar", "elements", "branches"]
    );

    let stored = engine.store.match_results(EngineType::Pillar).unwrap();
    assert_eq!(stored.len(), 4, "every returned result is upserted once per pair");
}

#[test]
fn auxiliary_flags_are_implied_only_at_full_identity() {
    let matcher = PillarMatcher::new(PillarScoreTable::default());
    let subject = PillarSet::parse(&raw("甲子", "丙寅", "戊辰", "庚午")).unwrap();

    let same = matcher.compare(&subject, &subject);
    assert_eq!(same.tier, PillarTier::Full);
    assert_eq!(same.shared_elements.source, FlagSource::ImpliedByIdentity);
    assert_eq!(same.shared_branches.source, FlagSource::ImpliedByIdentity);
    assert!(same.shared_elements.satisfied && same.shared_branches.satisfied);

    // Same stems and branches, reordered: flags hold but no tier above 0.
    let shuffled = PillarSet::parse(&raw("庚午", "甲子", "丙寅", "戊辰")).unwrap();
    let cmp = matcher.compare(&subject, &shuffled);
    assert_eq!(cmp.tier, PillarTier::Unmatched);
    assert_eq!(cmp.raw_score, 0.0, "auxiliary flags must never raise the score");
    assert_eq!(cmp.shared_elements.source, FlagSource::Computed);
    assert!(cmp.shared_elements.satisfied);
    assert!(cmp.shared_branches.satisfied);

    let other = PillarSet::parse(&raw("甲子", "丁卯", "己巳", "辛未")).unwrap();
    let cmp = matcher.compare(&subject, &other);
    assert_eq!(cmp.tier, PillarTier::Year);
    assert_eq!(cmp.shared_branches.source, FlagSource::Computed);
    assert!(!cmp.shared_branches.satisfied);
}

#[test]
fn values_outside_the_alphabet_are_rejected() {
    for bad in ["甲丑", "jia-chou", "子甲", "甲", "foo-bar", "", "甲子子"] {
        match Pillar::parse(bad) {
            Err(ResonanceError::InvalidPillar { value }) => assert_eq!(value, bad),
            other => panic!("expected InvalidPillar for {bad:?}, got {other:?}"),
        }
    }
    assert_eq!(Pillar::parse("jia-zi").unwrap(), Pillar::parse("甲子").unwrap());
}

#[test]
fn alphabet_has_sixty_values() {
    let all: Vec<Pillar> = (0..60).map(|i| Pillar::from_cycle_index(i).unwrap()).collect();
    for (i, p) in all.iter().enumerate() {
        assert_eq!(p.cycle_index(), i);
        assert_eq!(Pillar::parse(&p.to_string()).unwrap(), *p);
    }
    assert!(Pillar::from_cycle_index(60).is_err());
}

#[test]
fn invalid_stored_pillar_propagates() {
    let engine = build_engine();
    seed_tiers(&engine);
    insert(&engine, "corrupt", raw("甲子", "甲丑", "戊辰", "庚午"));

    let err = engine.find_pillar_matches("subject", PillarTier::Year).unwrap_err();
    assert!(matches!(err, ResonanceError::InvalidPillar { ref value } if value == "甲丑"));

    let err = engine.find_pillar_matches("corrupt", PillarTier::Year).unwrap_err();
    assert!(matches!(err, ResonanceError::InvalidPillar { .. }));
}

#[test]
fn subject_without_pillars_is_not_found() {
    let engine = build_engine();
    let ts = NaiveDateTime::parse_from_str("1999-09-09T09:09", "%Y-%m-%dT%H:%M").unwrap();
    engine
        .store
        .insert_entity("bare", Some(ts), &TimeFingerprint::from_datetime(ts), None)
        .unwrap();

    let err = engine.find_pillar_matches("bare", PillarTier::Year).unwrap_err();
    assert!(matches!(err, ResonanceError::EntityNotFound { ref entity_id } if entity_id == "bare"));
}

#[test]
fn derived_pillars_are_well_formed() {
    let ts = NaiveDateTime::parse_from_str("2000-01-07T12:00", "%Y-%m-%dT%H:%M").unwrap();
    let set = PillarSet::from_datetime(ts).unwrap();
    assert_eq!(set.day.to_string(), "甲子");
    // Before Feb 4 the year pillar still belongs to 1999 (己卯).
    assert_eq!(set.year.to_string(), "己卯");
    assert_eq!(PillarSet::parse(&set.to_raw()).unwrap(), set);
}
