//! Audit events for batch jobs.
//!
//! RULE: every tuning attempt and leaderboard rebuild that completes,
//! is rejected or is cancelled leaves exactly one audit event. Variants
//! are appended, never removed or reordered.

use crate::{
    config::WeightVector,
    matcher::EngineType,
    types::{JobId, VersionId},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    WeightsAccepted {
        version_id:       VersionId,
        weights:          WeightVector,
        separation_score: f64,
        evaluated:        usize,
    },
    WeightsRejected {
        reason:     String,
        similar:    usize,
        dissimilar: usize,
    },
    LeaderboardRebuilt {
        engine_type: EngineType,
        entries:     usize,
        excluded:    Option<String>,
    },
    JobCancelled {
        job: String,
    },
}

impl AuditEvent {
    /// Stable name for the event_type column.
    pub fn event_type(&self) -> &'static str {
        match self {
            AuditEvent::WeightsAccepted { .. }    => "weights_accepted",
            AuditEvent::WeightsRejected { .. }    => "weights_rejected",
            AuditEvent::LeaderboardRebuilt { .. } => "leaderboard_rebuilt",
            AuditEvent::JobCancelled { .. }       => "job_cancelled",
        }
    }
}

/// A persisted audit event.
#[derive(Debug, Clone)]
pub struct AuditLogEntry {
    pub id:          Option<i64>,
    pub job_id:      JobId,
    pub event_type:  String,
    pub payload:     String, // JSON-serialized AuditEvent
    pub recorded_at: String,
}

impl AuditLogEntry {
    pub fn event(&self) -> serde_json::Result<AuditEvent> {
        serde_json::from_str(&self.payload)
    }
}
