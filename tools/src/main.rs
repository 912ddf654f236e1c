//! match-runner: headless batch runner for the resonance core.
//!
//! Usage:
//!   match-runner --seed 12345 --entities 60 --db run.db
//!   match-runner --seed 12345 --depth 3 --exclude e-0000 --data-dir ./data
//!   match-runner --seed 12345 --json
//!
//! Seeds a synthetic population, runs both matchers for every entity,
//! tunes the composite weights, rebuilds both leaderboards and prints a
//! summary.

use anyhow::Result;
use resonance_core::{
    cancel::CancelToken,
    config::MatchConfig,
    engine::ResonanceEngine,
    error::ResonanceError,
    leaderboard::LeaderboardEntry,
    matcher::EngineType,
    pillar_matcher::PillarTier,
    population::{self, PopulationSpec},
    source::WeightVersion,
    store::MatchStore,
};
use serde::Serialize;
use std::{env, path::Path};

const TOP_N: usize = 10;

#[derive(Serialize)]
struct RunSummary<'a> {
    seed:         u64,
    entities:     usize,
    time_pairs:   usize,
    pillar_pairs: usize,
    labeled:      usize,
    tuned:        Option<&'a WeightVersion>,
    time_board:   &'a [LeaderboardEntry],
    pillar_board: &'a [LeaderboardEntry],
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let entities = parse_arg(&args, "--entities", 60usize);
    let depth = parse_arg(&args, "--depth", 1usize);
    let db = flag_value(&args, "--db").unwrap_or(":memory:");
    let data_dir = flag_value(&args, "--data-dir").unwrap_or("./data");
    let exclude = flag_value(&args, "--exclude");
    let json = args.iter().any(|a| a == "--json");

    if !json {
        print_header(seed, entities, depth, db, data_dir, exclude);
    }

    let config = if Path::new(data_dir).is_dir() {
        MatchConfig::load(data_dir)?
    } else {
        log::warn!("data dir {data_dir} not found, using built-in defaults");
        MatchConfig::default()
    };

    let store = if db == ":memory:" { MatchStore::in_memory()? } else { MatchStore::open(db)? };
    store.migrate()?;

    let spec = PopulationSpec { entities, ..PopulationSpec::default() };
    let population = population::generate(seed, &spec)?;
    population.load_into(&store)?;

    let engine = ResonanceEngine::new(store, config)?;
    let ids = engine.store.entity_ids()?;

    let mut time_pairs = 0usize;
    let mut pillar_pairs = 0usize;
    for id in &ids {
        time_pairs += engine.find_time_matches(id, depth)?.len();
        pillar_pairs += engine.find_pillar_matches(id, PillarTier::Year)?.len();
    }

    let cancel = CancelToken::new();
    let corpus = engine.build_labeled_corpus()?;
    let tuned = match engine.tune_weights(&corpus, &cancel) {
        Ok(version) => Some(version),
        Err(ResonanceError::InsufficientSamples { .. }) => None,
        Err(e) => return Err(e.into()),
    };

    let time_board = engine.rebuild_leaderboard(EngineType::Time, exclude, &cancel)?;
    let pillar_board = engine.rebuild_leaderboard(EngineType::Pillar, exclude, &cancel)?;

    if json {
        let summary = RunSummary {
            seed,
            entities: ids.len(),
            time_pairs,
            pillar_pairs,
            labeled: corpus.len(),
            tuned: tuned.as_ref(),
            time_board: &time_board,
            pillar_board: &pillar_board,
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("=== RUN SUMMARY ===");
    println!("  entities:       {}", ids.len());
    println!("  time results:   {time_pairs}");
    println!("  pillar results: {pillar_pairs}");
    println!("  labeled pairs:  {}", corpus.len());
    match tuned {
        Some(v) => println!(
            "  weights:        v{} time={:.2} pillar={:.2} parental={:.2} separation={:.3}",
            v.version_id, v.weights.time, v.weights.pillar, v.weights.parental, v.separation_score
        ),
        None => {
            let w = engine.active_weights()?;
            println!(
                "  weights:        baseline time={:.2} pillar={:.2} parental={:.2} (not enough labels)",
                w.time, w.pillar, w.parental
            );
        }
    }
    println!();

    print_board(EngineType::Time, &time_board);
    print_board(EngineType::Pillar, &pillar_board);

    Ok(())
}

fn print_header(
    seed: u64,
    entities: usize,
    depth: usize,
    db: &str,
    data_dir: &str,
    exclude: Option<&str>,
) {
    println!("resonance match-runner");
    println!("  seed:      {seed}");
    println!("  entities:  {entities}");
    println!("  depth:     {depth}");
    println!("  db:        {db}");
    println!("  data_dir:  {data_dir}");
    println!("  exclude:   {}", exclude.unwrap_or("-"));
    println!();
}

fn print_board(engine: EngineType, entries: &[LeaderboardEntry]) {
    println!("=== {} LEADERBOARD (top {TOP_N}) ===", engine.as_str().to_uppercase());
    if entries.is_empty() {
        println!("  no matches found");
    }
    for e in entries.iter().take(TOP_N) {
        println!(
            "  #{:<3} {:<8} display={:>6.2} pairs={:<4} verified={}",
            e.rank, e.entity_id, e.display_score, e.match_count, e.verified_count
        );
    }
    println!();
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2).find(|w| w[0] == flag).map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
