//! The resonance engine — wires matchers, scorer, tuner and aggregator to
//! the collaborator traits.
//!
//! OPERATIONS:
//!   - find_time_matches(subject, depth)     per query, upserts results
//!   - find_pillar_matches(subject, mode)    per query, upserts results
//!   - composite_score_for_pair(a, b)        pure read
//!   - tune_weights(corpus)                  batch, cancellable
//!   - rebuild_leaderboard(engine, exclude)  batch, cancellable
//!
//! RULES:
//!   - Malformed input is never repaired here; errors propagate.
//!   - An empty candidate pool is Ok(vec![]), not an error.
//!   - A rejected or cancelled batch job writes no results, only its audit event.
//!   - Every batch job gets a fresh uuid job id.

use crate::{
    cancel::CancelToken,
    composite::{CompositeScorer, SubScores},
    config::{MatchConfig, WeightVector},
    error::{ResonanceError, ResonanceResult},
    event::AuditEvent,
    fingerprint::TimeFingerprint,
    leaderboard::{LeaderboardAggregator, LeaderboardEntry},
    matcher::{EngineType, MatchResult, Matcher, PairScore},
    pillar::PillarSet,
    pillar_matcher::{PillarMatcher, PillarTier},
    source::{FingerprintFilter, LabelSource, PersistenceSink, RecordSource, WeightVersion},
    time_matcher::TimeLayerMatcher,
    types::JobId,
    weight_tuner::{LabeledPair, WeightTuner},
};
use chrono::Utc;
use uuid::Uuid;

pub struct ResonanceEngine<S> {
    pub store:  S,
    config:     MatchConfig,
    time:       TimeLayerMatcher,
    pillar:     PillarMatcher,
    scorer:     CompositeScorer,
    tuner:      WeightTuner,
    aggregator: LeaderboardAggregator,
}

impl<S> ResonanceEngine<S>
where
    S: RecordSource + LabelSource + PersistenceSink,
{
    /// Build an engine over `store`. The config is validated first.
    pub fn new(store: S, config: MatchConfig) -> ResonanceResult<Self> {
        config.validate()?;
        let scorer = CompositeScorer::new(&config.composite);
        Ok(Self {
            time:       TimeLayerMatcher::new(config.time_penalties.clone()),
            pillar:     PillarMatcher::new(config.pillar_scores.clone()),
            tuner:      WeightTuner::new(config.tuner.clone(), scorer.clone()),
            aggregator: LeaderboardAggregator::new(config.leaderboard.clone()),
            scorer,
            config,
            store,
        })
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    // ── Time matching ────────────────────────────────────────────────────────

    pub fn find_time_matches(
        &self,
        subject_id: &str,
        depth: usize,
    ) -> ResonanceResult<Vec<MatchResult>> {
        TimeLayerMatcher::check_depth(depth)?;
        let subject = self.fingerprint(subject_id)?;

        let filter = FingerprintFilter { reference: subject, depth };
        let population = self.store.fingerprints_matching(&filter)?;
        let ranked = self.time.rank_candidates(
            subject_id,
            &subject,
            depth,
            population.iter().map(|(id, fp)| (id.as_str(), fp)),
        )?;

        let computed_at = Utc::now();
        let results: Vec<MatchResult> = ranked
            .into_iter()
            .map(|c| MatchResult::new(subject_id, &c.entity_id, EngineType::Time, c.score, computed_at))
            .collect();
        for result in &results {
            self.store.upsert_match_result(result)?;
        }

        log::debug!(
            "engine=time subject={subject_id} depth={depth} pool={} matches={}",
            population.len(),
            results.len()
        );
        Ok(results)
    }

    // ── Pillar matching ──────────────────────────────────────────────────────

    /// `mode` is the minimum tier a candidate must reach.
    pub fn find_pillar_matches(
        &self,
        subject_id: &str,
        mode: PillarTier,
    ) -> ResonanceResult<Vec<MatchResult>> {
        let subject = self
            .pillars(subject_id)?
            .ok_or_else(|| ResonanceError::EntityNotFound { entity_id: subject_id.to_string() })?;

        let population = self
            .store
            .all_pillars()?
            .into_iter()
            .map(|(id, raw)| -> ResonanceResult<(String, PillarSet)> {
                Ok((id, PillarSet::parse(&raw)?))
            })
            .collect::<ResonanceResult<Vec<_>>>()?;

        let ranked = self.pillar.rank_candidates(
            subject_id,
            &subject,
            mode,
            population.iter().map(|(id, set)| (id.as_str(), set)),
        );

        let computed_at = Utc::now();
        let mut results = Vec::with_capacity(ranked.len());
        for candidate in ranked {
            let score = PairScore {
                raw_score:      candidate.comparison.raw_score,
                matched_levels: candidate.comparison.matched_levels(),
            };
            let result =
                MatchResult::new(subject_id, &candidate.entity_id, EngineType::Pillar, score, computed_at);
            self.store.upsert_match_result(&result)?;
            results.push(result);
        }

        log::debug!(
            "engine=pillar subject={subject_id} mode={mode:?} pool={} matches={}",
            population.len(),
            results.len()
        );
        Ok(results)
    }

    // ── Composite ────────────────────────────────────────────────────────────

    /// The vector in effect: the latest accepted version, or the baseline.
    pub fn active_weights(&self) -> ResonanceResult<WeightVector> {
        Ok(self
            .store
            .active_weight_version()?
            .map(|v| v.weights)
            .unwrap_or(self.config.composite.baseline_weights))
    }

    pub fn composite_score_for_pair(&self, a: &str, b: &str) -> ResonanceResult<f64> {
        let subs = self.sub_scores(a, b)?;
        Ok(self.scorer.score(&self.active_weights()?, &subs))
    }

    /// Fresh sub-scores for one pair. A year mismatch gives a time
    /// sub-score of 0; missing pillars or parental data stay `None`.
    pub fn sub_scores(&self, a: &str, b: &str) -> ResonanceResult<SubScores> {
        let fa = self.fingerprint(a)?;
        let fb = self.fingerprint(b)?;
        let time = self.time.score(&fa, &fb).map(|s| s.raw_score).unwrap_or(0.0);

        let pillar = match (self.pillars(a)?, self.pillars(b)?) {
            (Some(pa), Some(pb)) => Some(self.pillar.compare(&pa, &pb).raw_score),
            _ => None,
        };

        Ok(SubScores {
            time,
            pillar,
            parental: self.store.parental_similarity(a, b)?,
        })
    }

    // ── Weight tuning ────────────────────────────────────────────────────────

    /// Score every labeled pair the label source knows about.
    pub fn build_labeled_corpus(&self) -> ResonanceResult<Vec<LabeledPair>> {
        self.store
            .labeled_pairs()?
            .into_iter()
            .map(|label| -> ResonanceResult<LabeledPair> {
                Ok(LabeledPair {
                    sub_scores:       self.sub_scores(&label.subject_id, &label.candidate_id)?,
                    subject_id:       label.subject_id,
                    candidate_id:     label.candidate_id,
                    is_known_similar: label.is_known_similar,
                })
            })
            .collect()
    }

    /// Search the weight grid and persist the winner as a new version.
    ///
    /// On `InsufficientSamples` or cancellation nothing is persisted
    /// besides the audit event, and the previous version stays active.
    pub fn tune_weights(
        &self,
        corpus: &[LabeledPair],
        cancel: &CancelToken,
    ) -> ResonanceResult<WeightVersion> {
        let job_id = new_job_id();
        let previous = self.active_weights()?;

        let outcome = match self.tuner.tune(corpus, Some(&previous), cancel) {
            Ok(outcome) => outcome,
            Err(ResonanceError::InsufficientSamples { similar, dissimilar }) => {
                log::warn!(
                    "tuner job={job_id}: insufficient samples similar={similar} dissimilar={dissimilar}, keeping current weights"
                );
                self.store.append_audit(
                    &job_id,
                    &AuditEvent::WeightsRejected {
                        reason: "insufficient_samples".into(),
                        similar,
                        dissimilar,
                    },
                )?;
                return Err(ResonanceError::InsufficientSamples { similar, dissimilar });
            }
            Err(ResonanceError::Cancelled) => {
                log::warn!("tuner job={job_id}: cancelled");
                self.store
                    .append_audit(&job_id, &AuditEvent::JobCancelled { job: "tune_weights".into() })?;
                return Err(ResonanceError::Cancelled);
            }
            Err(e) => return Err(e),
        };

        let created_at = Utc::now();
        let version_id =
            self.store.insert_weight_version(&outcome.weights, outcome.separation_score, created_at)?;
        self.store.append_audit(
            &job_id,
            &AuditEvent::WeightsAccepted {
                version_id,
                weights: outcome.weights,
                separation_score: outcome.separation_score,
                evaluated: outcome.evaluated,
            },
        )?;

        log::info!(
            "tuner job={job_id}: accepted version={version_id} weights={}/{}/{} separation={:.4}",
            outcome.point.time,
            outcome.point.pillar,
            outcome.point.parental,
            outcome.separation_score
        );

        Ok(WeightVersion {
            version_id,
            weights: outcome.weights,
            separation_score: outcome.separation_score,
            created_at,
        })
    }

    // ── Leaderboard ──────────────────────────────────────────────────────────

    /// Recompute the whole leaderboard for `engine` from stored match rows
    /// and replace the persisted copy.
    pub fn rebuild_leaderboard(
        &self,
        engine: EngineType,
        exclude: Option<&str>,
        cancel: &CancelToken,
    ) -> ResonanceResult<Vec<LeaderboardEntry>> {
        let job_id = new_job_id();
        let rows = self.store.match_results(engine)?;
        let verified = self.store.verified_counts(engine)?;

        let entries = match self.aggregator.aggregate(engine, &rows, exclude, &verified, cancel) {
            Ok(entries) => entries,
            Err(ResonanceError::Cancelled) => {
                log::warn!("leaderboard job={job_id} engine={engine}: cancelled");
                self.store.append_audit(
                    &job_id,
                    &AuditEvent::JobCancelled { job: format!("rebuild_leaderboard:{engine}") },
                )?;
                return Err(ResonanceError::Cancelled);
            }
            Err(e) => return Err(e),
        };

        self.store.replace_leaderboard(engine, &entries)?;
        self.store.append_audit(
            &job_id,
            &AuditEvent::LeaderboardRebuilt {
                engine_type: engine,
                entries:     entries.len(),
                excluded:    exclude.map(str::to_string),
            },
        )?;

        log::info!(
            "leaderboard job={job_id} engine={engine}: rows={} entries={} excluded={}",
            rows.len(),
            entries.len(),
            exclude.unwrap_or("-")
        );
        Ok(entries)
    }

    pub fn leaderboard(&self, engine: EngineType) -> ResonanceResult<Vec<LeaderboardEntry>> {
        self.store.leaderboard(engine)
    }

    // ── Helpers ──────────────────────────────────────────────────────────────

    /// Validated fingerprint. Absence is reported as malformed input.
    fn fingerprint(&self, entity_id: &str) -> ResonanceResult<TimeFingerprint> {
        let fp = self.store.get_fingerprint(entity_id)?.ok_or_else(|| {
            ResonanceError::MalformedFingerprint {
                entity_id: entity_id.to_string(),
                reason:    "no fingerprint on record".into(),
            }
        })?;
        self.time.check(entity_id, &fp)?;
        Ok(fp)
    }

    fn pillars(&self, entity_id: &str) -> ResonanceResult<Option<PillarSet>> {
        self.store
            .get_pillars(entity_id)?
            .map(|raw| PillarSet::parse(&raw))
            .transpose()
    }
}

fn new_job_id() -> JobId {
    Uuid::new_v4().to_string()
}
