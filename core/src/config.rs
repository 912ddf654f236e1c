//! Tunable constants for matching, scoring, tuning and ranking.
//!
//! Every numeric policy the algorithms use lives here so it can be
//! recalibrated against labeled data without touching matcher logic.
//! `MatchConfig::default()` carries the calibrated defaults;
//! `MatchConfig::load(data_dir)` reads the same sections from JSON.

use crate::{
    error::{ResonanceError, ResonanceResult},
    fingerprint::TimeLevel,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

// ── Time layer penalties ─────────────────────────────────────────────────────

/// Penalty subtracted from 100 for each level below the deepest matched
/// one. Year has no entry: a year mismatch means the pair is not scored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PenaltyTable {
    pub month:         f64,
    pub day:           f64,
    pub named_period:  f64,
    pub hour:          f64,
    pub quarter_index: f64,
    pub minute:        f64,
}

impl PenaltyTable {
    pub fn penalty(&self, level: TimeLevel) -> f64 {
        match level {
            TimeLevel::Year         => 0.0,
            TimeLevel::Month        => self.month,
            TimeLevel::Day          => self.day,
            TimeLevel::NamedPeriod  => self.named_period,
            TimeLevel::Hour         => self.hour,
            TimeLevel::QuarterIndex => self.quarter_index,
            TimeLevel::Minute       => self.minute,
        }
    }
}

impl Default for PenaltyTable {
    fn default() -> Self {
        Self {
            month:         15.0,
            day:           20.0,
            named_period:  15.0,
            hour:          20.0,
            quarter_index: 15.0,
            minute:        20.0,
        }
    }
}

// ── Pillar tiers ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PillarScoreTable {
    pub year:           f64,
    pub year_month:     f64,
    pub year_month_day: f64,
    pub full:           f64,
}

impl Default for PillarScoreTable {
    fn default() -> Self {
        Self {
            year:           20.0,
            year_month:     40.0,
            year_month_day: 70.0,
            full:           100.0,
        }
    }
}

// ── Composite ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightVector {
    pub time:     f64,
    pub pillar:   f64,
    pub parental: f64,
}

impl WeightVector {
    pub fn sum(&self) -> f64 {
        self.time + self.pillar + self.parental
    }

    /// Build from whole percentage points. The sum is exact in that domain.
    pub fn from_points(time: u32, pillar: u32, parental: u32) -> Self {
        Self {
            time:     time as f64 / 100.0,
            pillar:   pillar as f64 / 100.0,
            parental: parental as f64 / 100.0,
        }
    }

    /// Components rounded to whole percentage points.
    pub fn to_points(&self) -> (u32, u32, u32) {
        let pts = |w: f64| (w * 100.0).round().max(0.0) as u32;
        (pts(self.time), pts(self.pillar), pts(self.parental))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeConfig {
    /// Stand-in for an absent structural sub-score.
    pub neutral_subscore: f64,
    /// In effect until the first tuned version is accepted.
    pub baseline_weights: WeightVector,
}

impl Default for CompositeConfig {
    fn default() -> Self {
        Self {
            neutral_subscore: 50.0,
            baseline_weights: WeightVector::from_points(50, 30, 20),
        }
    }
}

// ── Weight tuner ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TunerConfig {
    /// Grid step in percentage points.
    pub step_pct:  u32,
    /// Per-dimension floor in percentage points.
    pub floor_pct: u32,
    /// Per-dimension ceiling in percentage points.
    pub ceil_pct:  u32,
    /// Size of the evaluation thread pool.
    pub workers:   usize,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            step_pct:  5,
            floor_pct: 10,
            ceil_pct:  60,
            workers:   4,
        }
    }
}

// ── Leaderboard ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardConfig {
    /// Entities with fewer pairs than this get the under-sampling penalty.
    pub min_sample_size:     usize,
    pub under_sample_factor: f64,
    /// Ceiling for any non-perfect time-engine rank score.
    pub near_perfect_cap:    f64,
    /// Number of entity partitions processed in parallel.
    pub partitions:          usize,
}

impl Default for LeaderboardConfig {
    fn default() -> Self {
        Self {
            min_sample_size:     5,
            under_sample_factor: 0.85,
            near_perfect_cap:    0.97,
            partitions:          8,
        }
    }
}

// ── Root ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchConfig {
    pub time_penalties: PenaltyTable,
    pub pillar_scores:  PillarScoreTable,
    pub composite:      CompositeConfig,
    pub tuner:          TunerConfig,
    pub leaderboard:    LeaderboardConfig,
}

impl MatchConfig {
    /// Load from the data/ directory.
    /// In tests, use MatchConfig::default().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let config = Self {
            time_penalties: read_json(data_dir, "matching/time_penalties.json")?,
            pillar_scores:  read_json(data_dir, "matching/pillar_scores.json")?,
            composite:      read_json(data_dir, "composite/baseline.json")?,
            tuner:          read_json(data_dir, "tuning/weight_grid.json")?,
            leaderboard:    read_json(data_dir, "leaderboard/policy.json")?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ResonanceResult<()> {
        let invalid = |reason: String| Err(ResonanceError::InvalidConfig { reason });

        for level in &TimeLevel::ORDER[1..] {
            let p = self.time_penalties.penalty(*level);
            if !p.is_finite() || p < 0.0 {
                return invalid(format!("penalty for {level} must be a non-negative number, got {p}"));
            }
        }

        let tiers = [
            self.pillar_scores.year,
            self.pillar_scores.year_month,
            self.pillar_scores.year_month_day,
            self.pillar_scores.full,
        ];
        if tiers.iter().any(|s| !(0.0..=100.0).contains(s)) || tiers.windows(2).any(|w| w[0] >= w[1]) {
            return invalid(format!("pillar tier scores must rise strictly within 0..=100, got {tiers:?}"));
        }

        let c = &self.composite;
        if !(0.0..=100.0).contains(&c.neutral_subscore) {
            return invalid(format!("neutral sub-score {} outside 0..=100", c.neutral_subscore));
        }
        let w = &c.baseline_weights;
        if [w.time, w.pillar, w.parental].iter().any(|x| !(0.0..=1.0).contains(x))
            || (w.sum() - 1.0).abs() > 1e-9
        {
            return invalid(format!("baseline weights must lie in 0..=1 and sum to 1, got {w:?}"));
        }

        let t = &self.tuner;
        if t.step_pct == 0 || 100 % t.step_pct != 0 {
            return invalid(format!("tuner step {} must divide 100", t.step_pct));
        }
        if t.floor_pct > t.ceil_pct || t.ceil_pct > 100 {
            return invalid(format!("tuner bounds {}..={} are inverted or exceed 100", t.floor_pct, t.ceil_pct));
        }
        if t.workers == 0 {
            return invalid("tuner needs at least one worker".into());
        }
        if 3 * t.floor_pct > 100 || 3 * t.ceil_pct < 100 {
            return invalid(format!(
                "tuner bounds {}..={} admit no vector summing to 100",
                t.floor_pct, t.ceil_pct
            ));
        }

        let l = &self.leaderboard;
        for (name, v) in [("under_sample_factor", l.under_sample_factor), ("near_perfect_cap", l.near_perfect_cap)] {
            if !(v > 0.0 && v <= 1.0) {
                return invalid(format!("{name} must lie in (0, 1], got {v}"));
            }
        }
        if l.partitions == 0 {
            return invalid("leaderboard needs at least one partition".into());
        }

        Ok(())
    }
}

fn read_json<T: DeserializeOwned>(data_dir: &str, relative: &str) -> anyhow::Result<T> {
    let path = format!("{data_dir}/{relative}");
    let content = std::fs::read_to_string(&path)
        .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
    serde_json::from_str(&content).map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))
}
