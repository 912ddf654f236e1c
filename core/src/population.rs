//! Synthetic population generator.
//!
//! Produces clusters of entities born close together. Each cluster has a
//! centre timestamp; every member keeps the centre's leading timestamp
//! components (year, month, day, hour, minute) down to a random depth and
//! re-rolls the rest. The second member of each cluster is always an exact
//! twin of the centre.
//!
//! Labels: centre vs. members sharing at least the day are known-similar;
//! centres of neighbouring clusters are known-dissimilar.
//!
//! RULE: same seed + same spec = same population, byte for byte.

use crate::{
    error::{ResonanceError, ResonanceResult},
    matcher::EngineType,
    rng::{RngBank, StreamRng, StreamSlot},
    source::PairLabel,
    store::MatchStore,
    types::EntityId,
};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Timestamp components a member may share with its cluster centre.
const COMPONENTS: u32 = 5;

/// Members sharing at least this many components are labeled similar.
const SIMILAR_SHARED: u32 = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationSpec {
    pub entities:          usize,
    pub cluster_size:      usize,
    pub base_year:         i32,
    pub year_span:         u32,
    /// Probability that a labeled pair also carries a parental score.
    pub parental_coverage: f64,
}

impl Default for PopulationSpec {
    fn default() -> Self {
        Self {
            entities:          60,
            cluster_size:      5,
            base_year:         1975,
            year_span:         40,
            parental_coverage: 0.8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedEntity {
    pub entity_id: EntityId,
    pub cluster:   usize,
    pub born_at:   NaiveDateTime,
    /// Leading timestamp components shared with the cluster centre (1..=5).
    pub shared:    u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParentalScore {
    pub a:     EntityId,
    pub b:     EntityId,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationCount {
    pub entity_id: EntityId,
    pub engine:    EngineType,
    pub count:     u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Population {
    pub entities:     Vec<GeneratedEntity>,
    pub labels:       Vec<PairLabel>,
    pub parental:     Vec<ParentalScore>,
    pub verification: Vec<VerificationCount>,
}

#[derive(Clone, Copy)]
struct Stamp {
    year:   i32,
    month:  u32,
    day:    u32,
    hour:   u32,
    minute: u32,
}

impl Stamp {
    fn roll(rng: &mut StreamRng, spec: &PopulationSpec) -> Self {
        Self {
            year:   spec.base_year + rng.below(u64::from(spec.year_span.max(1))) as i32,
            month:  rng.between(1, 12),
            // Day 28 keeps every month valid.
            day:    rng.between(1, 28),
            hour:   rng.between(0, 23),
            minute: rng.between(0, 59),
        }
    }

    /// Keep the first `shared` components of `self`, take the rest from `other`.
    fn blend(&self, other: &Stamp, shared: u32) -> Self {
        Self {
            year:   self.year,
            month:  if shared >= 2 { self.month } else { other.month },
            day:    if shared >= 3 { self.day } else { other.day },
            hour:   if shared >= 4 { self.hour } else { other.hour },
            minute: if shared >= 5 { self.minute } else { other.minute },
        }
    }

    fn to_datetime(self) -> ResonanceResult<NaiveDateTime> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)
            .and_then(|d| d.and_hms_opt(self.hour, self.minute, 0))
            .ok_or_else(|| {
                ResonanceError::Other(anyhow::anyhow!(
                    "generated invalid timestamp {}-{}-{} {}:{}",
                    self.year, self.month, self.day, self.hour, self.minute
                ))
            })
    }
}

pub fn generate(seed: u64, spec: &PopulationSpec) -> ResonanceResult<Population> {
    if spec.cluster_size == 0 {
        return Err(ResonanceError::InvalidConfig {
            reason: "population cluster_size must be at least 1".into(),
        });
    }

    let bank = RngBank::new(seed);
    let mut centres_rng = bank.stream(StreamSlot::ClusterCentres);
    let mut jitter_rng = bank.stream(StreamSlot::MemberJitter);

    let mut entities = Vec::with_capacity(spec.entities);
    let mut centre = Stamp::roll(&mut centres_rng, spec);
    for i in 0..spec.entities {
        let cluster = i / spec.cluster_size;
        let position = i % spec.cluster_size;
        if position == 0 && i > 0 {
            centre = Stamp::roll(&mut centres_rng, spec);
        }
        let shared = match position {
            0 | 1 => COMPONENTS,
            _ => jitter_rng.between(1, COMPONENTS),
        };
        let noise = Stamp::roll(&mut jitter_rng, spec);
        entities.push(GeneratedEntity {
            entity_id: format!("e-{i:04}"),
            cluster,
            born_at:   centre.blend(&noise, shared).to_datetime()?,
            shared,
        });
    }

    let labels = build_labels(&entities, spec.cluster_size);

    let mut parental_rng = bank.stream(StreamSlot::Parental);
    let parental: Vec<ParentalScore> = labels
        .iter()
        .filter_map(|label| {
            if !parental_rng.chance(spec.parental_coverage) {
                return None;
            }
            let score = if label.is_known_similar {
                parental_rng.between(60, 95)
            } else {
                parental_rng.between(5, 50)
            };
            Some(ParentalScore {
                a:     label.subject_id.clone(),
                b:     label.candidate_id.clone(),
                score: f64::from(score),
            })
        })
        .collect();

    let mut verify_rng = bank.stream(StreamSlot::Verification);
    let mut verification = Vec::with_capacity(entities.len() * EngineType::ALL.len());
    for entity in &entities {
        for engine in EngineType::ALL {
            verification.push(VerificationCount {
                entity_id: entity.entity_id.clone(),
                engine,
                count: verify_rng.below(4) as u32,
            });
        }
    }

    log::debug!(
        "population: seed={seed} entities={} labels={} parental={}",
        entities.len(), labels.len(), parental.len()
    );

    Ok(Population { entities, labels, parental, verification })
}

fn build_labels(entities: &[GeneratedEntity], cluster_size: usize) -> Vec<PairLabel> {
    let centres: Vec<&GeneratedEntity> = entities.iter().step_by(cluster_size).collect();
    let mut labels = Vec::new();

    for centre in &centres {
        for member in entities
            .iter()
            .filter(|e| e.cluster == centre.cluster && e.entity_id != centre.entity_id)
            .filter(|e| e.shared >= SIMILAR_SHARED)
        {
            labels.push(PairLabel {
                subject_id:       centre.entity_id.clone(),
                candidate_id:     member.entity_id.clone(),
                is_known_similar: true,
            });
        }
    }

    for pair in centres.windows(2) {
        labels.push(PairLabel {
            subject_id:       pair[0].entity_id.clone(),
            candidate_id:     pair[1].entity_id.clone(),
            is_known_similar: false,
        });
    }
    labels
}

impl Population {
    /// Write every record, label, parental score and verification count.
    pub fn load_into(&self, store: &MatchStore) -> ResonanceResult<()> {
        for entity in &self.entities {
            store.record_timestamp(&entity.entity_id, entity.born_at)?;
        }
        for label in &self.labels {
            store.insert_pair_label(label)?;
        }
        for p in &self.parental {
            store.set_parental_similarity(&p.a, &p.b, p.score)?;
        }
        for v in &self.verification {
            store.set_verified_count(&v.entity_id, v.engine, v.count)?;
        }
        log::info!("population: loaded {} entities", self.entities.len());
        Ok(())
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entities.iter().map(|e| e.entity_id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_member_is_exact_twin_of_centre() {
        let pop = generate(11, &PopulationSpec::default()).unwrap();
        for cluster in pop.entities.chunks(5) {
            assert_eq!(cluster[0].born_at, cluster[1].born_at);
        }
    }

    #[test]
    fn both_label_classes_are_present() {
        let pop = generate(11, &PopulationSpec::default()).unwrap();
        assert!(pop.labels.iter().any(|l| l.is_known_similar));
        assert!(pop.labels.iter().any(|l| !l.is_known_similar));
    }

    #[test]
    fn zero_cluster_size_is_rejected() {
        let spec = PopulationSpec { cluster_size: 0, ..PopulationSpec::default() };
        assert!(matches!(generate(1, &spec), Err(ResonanceError::InvalidConfig { .. })));
    }
}
