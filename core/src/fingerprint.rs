//! Time fingerprints — the seven cascading categorical levels derived from
//! a record timestamp.
//!
//! Level order is fixed: year → month → day → named period → hour →
//! quarter-hour → minute. Each level is strictly more granular than the
//! previous one. Named period is a pure function of hour and quarter index
//! a pure function of minute; `validate()` enforces both.

use crate::{
    error::{ResonanceError, ResonanceResult},
    pillar::Branch,
};
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeLevel {
    Year,
    Month,
    Day,
    NamedPeriod,
    Hour,
    QuarterIndex,
    Minute,
}

impl TimeLevel {
    /// Cascade order, shallowest first.
    pub const ORDER: [TimeLevel; 7] = [
        TimeLevel::Year,
        TimeLevel::Month,
        TimeLevel::Day,
        TimeLevel::NamedPeriod,
        TimeLevel::Hour,
        TimeLevel::QuarterIndex,
        TimeLevel::Minute,
    ];

    pub const DEPTH: usize = 7;

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Year         => "year",
            Self::Month        => "month",
            Self::Day          => "day",
            Self::NamedPeriod  => "named_period",
            Self::Hour         => "hour",
            Self::QuarterIndex => "quarter_index",
            Self::Minute       => "minute",
        }
    }

    /// 1-based depth of this level in the cascade.
    pub fn depth(self) -> usize {
        self as usize + 1
    }
}

impl fmt::Display for TimeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeFingerprint {
    pub year:          i32,
    pub month:         u32,
    pub day:           u32,
    pub named_period:  Branch,
    pub hour:          u32,
    pub quarter_index: u32,
    pub minute:        u32,
}

impl TimeFingerprint {
    /// Derive every level from a timestamp. The result always validates.
    pub fn from_datetime(at: NaiveDateTime) -> Self {
        Self {
            year:          at.year(),
            month:         at.month(),
            day:           at.day(),
            named_period:  Branch::from_hour(at.hour()),
            hour:          at.hour(),
            quarter_index: at.minute() / 15,
            minute:        at.minute(),
        }
    }

    /// Check ranges and both derived-level invariants. Never coerces.
    pub fn validate(&self, entity_id: &str) -> ResonanceResult<()> {
        let malformed = |reason: String| ResonanceError::MalformedFingerprint {
            entity_id: entity_id.to_string(),
            reason,
        };

        if !(1..=12).contains(&self.month) {
            return Err(malformed(format!("month {} outside 1..=12", self.month)));
        }
        if !(1..=31).contains(&self.day) {
            return Err(malformed(format!("day {} outside 1..=31", self.day)));
        }
        if self.hour > 23 {
            return Err(malformed(format!("hour {} outside 0..=23", self.hour)));
        }
        if self.minute > 59 {
            return Err(malformed(format!("minute {} outside 0..=59", self.minute)));
        }
        let expected_period = Branch::from_hour(self.hour);
        if self.named_period != expected_period {
            return Err(malformed(format!(
                "named period {:?} does not match hour {} (expected {:?})",
                self.named_period, self.hour, expected_period
            )));
        }
        if self.quarter_index != self.minute / 15 {
            return Err(malformed(format!(
                "quarter index {} does not match minute {}",
                self.quarter_index, self.minute
            )));
        }
        Ok(())
    }

    /// Whether both fingerprints agree on one level.
    pub fn level_eq(&self, other: &Self, level: TimeLevel) -> bool {
        match level {
            TimeLevel::Year         => self.year == other.year,
            TimeLevel::Month        => self.month == other.month,
            TimeLevel::Day          => self.day == other.day,
            TimeLevel::NamedPeriod  => self.named_period == other.named_period,
            TimeLevel::Hour         => self.hour == other.hour,
            TimeLevel::QuarterIndex => self.quarter_index == other.quarter_index,
            TimeLevel::Minute       => self.minute == other.minute,
        }
    }

    /// Number of leading levels on which both agree. The cascade stops at
    /// the first inequality; equal levels after it are not credited.
    pub fn matched_depth(&self, other: &Self) -> usize {
        TimeLevel::ORDER
            .iter()
            .take_while(|level| self.level_eq(other, **level))
            .count()
    }

    /// Wall-clock instant at minute resolution, when the calendar fields
    /// form a real date.
    pub fn instant(&self) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)?
            .and_hms_opt(self.hour, self.minute, 0)
    }

    /// Absolute distance in minutes between two fingerprints. Fingerprints
    /// that do not form a real date sort last.
    pub fn minute_distance(&self, other: &Self) -> i64 {
        match (self.instant(), other.instant()) {
            (Some(a), Some(b)) => (a - b).num_minutes().abs(),
            _ => i64::MAX,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> TimeFingerprint {
        TimeFingerprint::from_datetime(
            NaiveDate::from_ymd_opt(y, mo, d).unwrap().and_hms_opt(h, mi, 0).unwrap(),
        )
    }

    #[test]
    fn derived_levels_follow_hour_and_minute() {
        for hour in 0..24 {
            for minute in 0..60 {
                let fp = at(2001, 5, 15, hour, minute);
                assert_eq!(fp.named_period, Branch::from_hour(hour));
                assert_eq!(fp.quarter_index, minute / 15);
                fp.validate("e").unwrap();
            }
        }
    }

    #[test]
    fn validate_rejects_broken_invariants() {
        let mut fp = at(2001, 5, 15, 10, 32);
        fp.quarter_index = 1;
        assert!(matches!(
            fp.validate("e-1"),
            Err(ResonanceError::MalformedFingerprint { .. })
        ));

        let mut fp = at(2001, 5, 15, 10, 32);
        fp.named_period = Branch::Wu;
        assert!(matches!(
            fp.validate("e-1"),
            Err(ResonanceError::MalformedFingerprint { .. })
        ));

        let mut fp = at(2001, 5, 15, 10, 32);
        fp.month = 13;
        assert!(fp.validate("e-1").is_err());
    }

    #[test]
    fn matched_depth_stops_at_first_mismatch() {
        let a = at(2001, 5, 15, 10, 32);
        assert_eq!(a.matched_depth(&a), 7);
        assert_eq!(a.matched_depth(&at(2001, 5, 15, 10, 33)), 6);
        assert_eq!(a.matched_depth(&at(2001, 5, 15, 10, 46)), 5);
        // Same named period and minute, different hour: depth stops at 4.
        assert_eq!(a.matched_depth(&at(2001, 5, 15, 9, 32)), 4);
        assert_eq!(a.matched_depth(&at(2002, 5, 15, 10, 32)), 0);
    }

    #[test]
    fn minute_distance_is_symmetric() {
        let a = at(2001, 5, 15, 10, 32);
        let b = at(2001, 5, 15, 11, 2);
        assert_eq!(a.minute_distance(&b), 30);
        assert_eq!(b.minute_distance(&a), 30);
    }
}
