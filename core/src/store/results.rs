//! Store methods for match results, leaderboards and weight versions.

use crate::{
    config::WeightVector,
    error::{ResonanceError, ResonanceResult},
    event::AuditEvent,
    leaderboard::LeaderboardEntry,
    matcher::{EngineType, MatchResult},
    source::{PersistenceSink, WeightVersion},
    types::VersionId,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use super::{parse_timestamp, MatchStore};

fn parse_engine(raw: &str) -> ResonanceResult<EngineType> {
    raw.parse()
}

impl PersistenceSink for MatchStore {
    fn upsert_match_result(&self, result: &MatchResult) -> ResonanceResult<()> {
        let (lo, hi) = result.pair();
        self.conn.execute(
            "INSERT INTO match_result (
                pair_lo, pair_hi, engine_type, subject_id, candidate_id,
                raw_score, matched_levels, computed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT (pair_lo, pair_hi, engine_type) DO UPDATE SET
                subject_id     = excluded.subject_id,
                candidate_id   = excluded.candidate_id,
                raw_score      = excluded.raw_score,
                matched_levels = excluded.matched_levels,
                computed_at    = excluded.computed_at",
            params![
                lo,
                hi,
                result.engine_type.as_str(),
                result.subject_id,
                result.candidate_id,
                result.raw_score,
                serde_json::to_string(&result.matched_levels)?,
                result.computed_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn match_results(&self, engine: EngineType) -> ResonanceResult<Vec<MatchResult>> {
        let mut stmt = self.conn.prepare(
            "SELECT subject_id, candidate_id, engine_type, raw_score, matched_levels, computed_at
             FROM match_result WHERE engine_type = ?1
             ORDER BY pair_lo ASC, pair_hi ASC",
        )?;
        let raw = stmt
            .query_map(params![engine.as_str()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        raw.into_iter()
            .map(|(subject_id, candidate_id, engine, raw_score, levels, at)| -> ResonanceResult<MatchResult> {
                Ok(MatchResult {
                    subject_id,
                    candidate_id,
                    engine_type:    parse_engine(&engine)?,
                    raw_score,
                    matched_levels: serde_json::from_str(&levels)?,
                    computed_at:    parse_timestamp(&at)?,
                })
            })
            .collect()
    }

    fn replace_leaderboard(
        &self,
        engine: EngineType,
        entries: &[LeaderboardEntry],
    ) -> ResonanceResult<()> {
        if let Some(stray) = entries.iter().find(|e| e.engine_type != engine) {
            return Err(ResonanceError::Other(anyhow::anyhow!(
                "leaderboard entry for {} belongs to engine {}, not {engine}",
                stray.entity_id,
                stray.engine_type
            )));
        }

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM leaderboard_entry WHERE engine_type = ?1",
            params![engine.as_str()],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO leaderboard_entry (
                    engine_type, entity_id, match_count, verified_count,
                    rank_score, display_score, rank
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for e in entries {
                stmt.execute(params![
                    engine.as_str(),
                    e.entity_id,
                    e.match_count as i64,
                    e.verified_count,
                    e.rank_score,
                    e.display_score,
                    e.rank as i64,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn leaderboard(&self, engine: EngineType) -> ResonanceResult<Vec<LeaderboardEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT entity_id, match_count, verified_count, rank_score, display_score, rank
             FROM leaderboard_entry WHERE engine_type = ?1
             ORDER BY rank ASC",
        )?;
        let entries = stmt
            .query_map(params![engine.as_str()], |row| {
                Ok(LeaderboardEntry {
                    entity_id:      row.get(0)?,
                    engine_type:    engine,
                    match_count:    row.get::<_, i64>(1)? as usize,
                    verified_count: row.get(2)?,
                    rank_score:     row.get(3)?,
                    display_score:  row.get(4)?,
                    rank:           row.get::<_, i64>(5)? as usize,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    fn insert_weight_version(
        &self,
        weights: &WeightVector,
        separation_score: f64,
        created_at: DateTime<Utc>,
    ) -> ResonanceResult<VersionId> {
        self.conn.execute(
            "INSERT INTO weight_version
                (time_weight, pillar_weight, parental_weight, separation_score, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                weights.time,
                weights.pillar,
                weights.parental,
                separation_score,
                created_at.to_rfc3339(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn active_weight_version(&self) -> ResonanceResult<Option<WeightVersion>> {
        let row = self
            .conn
            .query_row(
                "SELECT version_id, time_weight, pillar_weight, parental_weight,
                        separation_score, created_at
                 FROM weight_version ORDER BY version_id DESC LIMIT 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        WeightVector {
                            time:     row.get(1)?,
                            pillar:   row.get(2)?,
                            parental: row.get(3)?,
                        },
                        row.get::<_, f64>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(version_id, weights, separation_score, at)| -> ResonanceResult<WeightVersion> {
            Ok(WeightVersion {
                version_id,
                weights,
                separation_score,
                created_at: parse_timestamp(&at)?,
            })
        })
        .transpose()
    }

    fn append_audit(&self, job_id: &str, event: &AuditEvent) -> ResonanceResult<()> {
        self.conn.execute(
            "INSERT INTO audit_log (job_id, event_type, payload, recorded_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                job_id,
                event.event_type(),
                serde_json::to_string(event)?,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}
