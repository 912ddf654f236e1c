//! Store methods for entity records, labels and verification signals.

use crate::{
    error::{ResonanceError, ResonanceResult},
    fingerprint::{TimeFingerprint, TimeLevel},
    matcher::EngineType,
    pillar::{Branch, PillarSet, RawPillarSet},
    source::{FingerprintFilter, LabelSource, PairLabel, RecordSource},
    types::{pair_key, EntityId},
};
use chrono::NaiveDateTime;
use rusqlite::{params, params_from_iter, types::Value, OptionalExtension};
use std::collections::HashMap;

use super::MatchStore;

const FINGERPRINT_COLUMNS: &str =
    "entity_id, year, month, day, named_period, hour, quarter_index, minute";

/// Fingerprint columns exactly as stored, before the period is parsed.
type FingerprintRow = (String, i32, u32, u32, String, u32, u32, u32);

impl MatchStore {
    /// Insert or replace one entity record. The fingerprint is stored as
    /// given; validation happens when it is matched.
    pub fn insert_entity(
        &self,
        entity_id:   &str,
        recorded_at: Option<NaiveDateTime>,
        fp:          &TimeFingerprint,
        pillars:     Option<&RawPillarSet>,
    ) -> ResonanceResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO entity_record (
                entity_id, recorded_at, year, month, day, named_period,
                hour, quarter_index, minute,
                year_pillar, month_pillar, day_pillar, hour_pillar
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                entity_id,
                recorded_at.map(|t| t.to_string()),
                fp.year,
                fp.month,
                fp.day,
                fp.named_period.romanized(),
                fp.hour,
                fp.quarter_index,
                fp.minute,
                pillars.map(|p| p.year.as_str()),
                pillars.map(|p| p.month.as_str()),
                pillars.map(|p| p.day.as_str()),
                pillars.map(|p| p.hour.as_str()),
            ],
        )?;
        Ok(())
    }

    /// Derive fingerprint and pillars from a timestamp and store both.
    /// Re-recording an entity recomputes everything from the new timestamp.
    pub fn record_timestamp(&self, entity_id: &str, at: NaiveDateTime) -> ResonanceResult<()> {
        let fp = TimeFingerprint::from_datetime(at);
        let pillars = PillarSet::from_datetime(at)?.to_raw();
        self.insert_entity(entity_id, Some(at), &fp, Some(&pillars))
    }

    pub fn set_parental_similarity(&self, a: &str, b: &str, score: f64) -> ResonanceResult<()> {
        let (lo, hi) = pair_key(a, b);
        self.conn.execute(
            "INSERT OR REPLACE INTO parental_similarity (pair_lo, pair_hi, score)
             VALUES (?1, ?2, ?3)",
            params![lo, hi, score],
        )?;
        Ok(())
    }

    pub fn insert_pair_label(&self, label: &PairLabel) -> ResonanceResult<()> {
        let (lo, hi) = pair_key(&label.subject_id, &label.candidate_id);
        self.conn.execute(
            "INSERT OR REPLACE INTO pair_label
                (pair_lo, pair_hi, subject_id, candidate_id, is_known_similar)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![lo, hi, label.subject_id, label.candidate_id, label.is_known_similar],
        )?;
        Ok(())
    }

    pub fn set_verified_count(
        &self,
        entity_id: &str,
        engine:    EngineType,
        count:     u32,
    ) -> ResonanceResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO verification (entity_id, engine_type, verified_count)
             VALUES (?1, ?2, ?3)",
            params![entity_id, engine.as_str(), count],
        )?;
        Ok(())
    }

    pub fn entity_ids(&self) -> ResonanceResult<Vec<EntityId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT entity_id FROM entity_record ORDER BY entity_id ASC")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    pub fn entity_count(&self) -> ResonanceResult<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM entity_record", [], |row| row.get(0))
            .map_err(Into::into)
    }
}

fn level_column(level: TimeLevel) -> &'static str {
    match level {
        TimeLevel::Year         => "year",
        TimeLevel::Month        => "month",
        TimeLevel::Day          => "day",
        TimeLevel::NamedPeriod  => "named_period",
        TimeLevel::Hour         => "hour",
        TimeLevel::QuarterIndex => "quarter_index",
        TimeLevel::Minute       => "minute",
    }
}

fn level_value(fp: &TimeFingerprint, level: TimeLevel) -> Value {
    match level {
        TimeLevel::Year         => Value::Integer(fp.year as i64),
        TimeLevel::Month        => Value::Integer(fp.month as i64),
        TimeLevel::Day          => Value::Integer(fp.day as i64),
        TimeLevel::NamedPeriod  => Value::Text(fp.named_period.romanized().to_string()),
        TimeLevel::Hour         => Value::Integer(fp.hour as i64),
        TimeLevel::QuarterIndex => Value::Integer(fp.quarter_index as i64),
        TimeLevel::Minute       => Value::Integer(fp.minute as i64),
    }
}

fn read_fingerprint_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<FingerprintRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn into_fingerprint(row: FingerprintRow) -> ResonanceResult<(EntityId, TimeFingerprint)> {
    let (entity_id, year, month, day, period, hour, quarter_index, minute) = row;
    let named_period = Branch::from_romanized(&period).ok_or_else(|| {
        ResonanceError::MalformedFingerprint {
            entity_id: entity_id.clone(),
            reason:    format!("unknown named period '{period}'"),
        }
    })?;
    let fp = TimeFingerprint { year, month, day, named_period, hour, quarter_index, minute };
    Ok((entity_id, fp))
}

impl RecordSource for MatchStore {
    fn get_fingerprint(&self, entity_id: &str) -> ResonanceResult<Option<TimeFingerprint>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {FINGERPRINT_COLUMNS} FROM entity_record WHERE entity_id = ?1"),
                params![entity_id],
                read_fingerprint_row,
            )
            .optional()?;
        row.map(into_fingerprint).transpose().map(|r| r.map(|(_, fp)| fp))
    }

    fn fingerprints_matching(
        &self,
        filter: &FingerprintFilter,
    ) -> ResonanceResult<Vec<(EntityId, TimeFingerprint)>> {
        let levels = filter.levels();
        let predicates: Vec<String> = levels
            .iter()
            .enumerate()
            .map(|(i, level)| format!("{} = ?{}", level_column(*level), i + 1))
            .collect();
        let where_clause = if predicates.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", predicates.join(" AND "))
        };
        let values: Vec<Value> = levels.iter().map(|l| level_value(&filter.reference, *l)).collect();

        let mut stmt = self.conn.prepare(&format!(
            "SELECT {FINGERPRINT_COLUMNS} FROM entity_record {where_clause} ORDER BY entity_id ASC"
        ))?;
        let rows = stmt
            .query_map(params_from_iter(values), read_fingerprint_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(into_fingerprint).collect()
    }

    fn get_pillars(&self, entity_id: &str) -> ResonanceResult<Option<RawPillarSet>> {
        let row = self
            .conn
            .query_row(
                "SELECT year_pillar, month_pillar, day_pillar, hour_pillar
                 FROM entity_record WHERE entity_id = ?1",
                params![entity_id],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                    ))
                },
            )
            .optional()?;
        Ok(row.and_then(|(y, m, d, h)| {
            Some(RawPillarSet { year: y?, month: m?, day: d?, hour: h? })
        }))
    }

    fn all_pillars(&self) -> ResonanceResult<Vec<(EntityId, RawPillarSet)>> {
        let mut stmt = self.conn.prepare(
            "SELECT entity_id, year_pillar, month_pillar, day_pillar, hour_pillar
             FROM entity_record
             WHERE year_pillar IS NOT NULL AND month_pillar IS NOT NULL
               AND day_pillar IS NOT NULL AND hour_pillar IS NOT NULL
             ORDER BY entity_id ASC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    RawPillarSet {
                        year:  row.get(1)?,
                        month: row.get(2)?,
                        day:   row.get(3)?,
                        hour:  row.get(4)?,
                    },
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn parental_similarity(&self, a: &str, b: &str) -> ResonanceResult<Option<f64>> {
        let (lo, hi) = pair_key(a, b);
        self.conn
            .query_row(
                "SELECT score FROM parental_similarity WHERE pair_lo = ?1 AND pair_hi = ?2",
                params![lo, hi],
                |row| row.get(0),
            )
            .optional()
            .map_err(Into::into)
    }
}

impl LabelSource for MatchStore {
    fn labeled_pairs(&self) -> ResonanceResult<Vec<PairLabel>> {
        let mut stmt = self.conn.prepare(
            "SELECT subject_id, candidate_id, is_known_similar
             FROM pair_label ORDER BY pair_lo ASC, pair_hi ASC",
        )?;
        let labels = stmt
            .query_map([], |row| {
                Ok(PairLabel {
                    subject_id:       row.get(0)?,
                    candidate_id:     row.get(1)?,
                    is_known_similar: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(labels)
    }

    fn verified_counts(&self, engine: EngineType) -> ResonanceResult<HashMap<EntityId, u32>> {
        let mut stmt = self.conn.prepare(
            "SELECT entity_id, verified_count FROM verification WHERE engine_type = ?1",
        )?;
        let counts = stmt
            .query_map(params![engine.as_str()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?))
            })?
            .collect::<Result<HashMap<_, _>, _>>()?;
        Ok(counts)
    }
}
