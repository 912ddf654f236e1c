//! Sexagenary pillar alphabet and per-entity pillar sets.
//!
//! A pillar is one of the 60 valid (stem, branch) pairs of the sexagenary
//! cycle. Only pairs whose stem and branch share parity exist; the other
//! 60 combinations of the 10×12 grid are rejected as `InvalidPillar`.
//!
//! RULE: a `Pillar` value is always a member of the alphabet. The only
//! ways to build one are `from_parts`, `from_cycle_index` and `parse`,
//! and each of them validates.

use crate::error::{ResonanceError, ResonanceResult};
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;

// ── Stems ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stem {
    Jia,
    Yi,
    Bing,
    Ding,
    Wu,
    Ji,
    Geng,
    Xin,
    Ren,
    Gui,
}

impl Stem {
    pub const ALL: [Stem; 10] = [
        Stem::Jia, Stem::Yi, Stem::Bing, Stem::Ding, Stem::Wu,
        Stem::Ji, Stem::Geng, Stem::Xin, Stem::Ren, Stem::Gui,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(i: usize) -> Self {
        Self::ALL[i % 10]
    }

    pub fn glyph(self) -> char {
        ['甲', '乙', '丙', '丁', '戊', '己', '庚', '辛', '壬', '癸'][self.index()]
    }

    pub fn romanized(self) -> &'static str {
        ["jia", "yi", "bing", "ding", "wu", "ji", "geng", "xin", "ren", "gui"][self.index()]
    }

    /// Stems pair off into the five elements in cycle order.
    pub fn element(self) -> Element {
        Element::ALL[self.index() / 2]
    }

    fn from_glyph(c: char) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.glyph() == c)
    }

    fn from_romanized(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|stem| stem.romanized() == s)
    }
}

// ── Branches ─────────────────────────────────────────────────────────────────

/// Earthly branch. Doubles as the named period of the day: each branch
/// covers a two-hour bucket, starting with `Zi` at 23:00.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Branch {
    Zi,
    Chou,
    Yin,
    Mao,
    Chen,
    Si,
    Wu,
    Wei,
    Shen,
    You,
    Xu,
    Hai,
}

impl Branch {
    pub const ALL: [Branch; 12] = [
        Branch::Zi, Branch::Chou, Branch::Yin, Branch::Mao, Branch::Chen, Branch::Si,
        Branch::Wu, Branch::Wei, Branch::Shen, Branch::You, Branch::Xu, Branch::Hai,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(i: usize) -> Self {
        Self::ALL[i % 12]
    }

    /// The fixed 24→12 hour mapping. Hour 23 wraps into `Zi` together
    /// with hour 0.
    pub fn from_hour(hour: u32) -> Self {
        Self::from_index(((hour as usize) + 1) / 2)
    }

    pub fn glyph(self) -> char {
        ['子', '丑', '寅', '卯', '辰', '巳', '午', '未', '申', '酉', '戌', '亥'][self.index()]
    }

    pub fn romanized(self) -> &'static str {
        [
            "zi", "chou", "yin", "mao", "chen", "si",
            "wu", "wei", "shen", "you", "xu", "hai",
        ][self.index()]
    }

    fn from_glyph(c: char) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.glyph() == c)
    }

    pub fn from_romanized(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.romanized() == s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Element {
    Wood,
    Fire,
    Earth,
    Metal,
    Water,
}

impl Element {
    pub const ALL: [Element; 5] = [
        Element::Wood, Element::Fire, Element::Earth, Element::Metal, Element::Water,
    ];
}

// ── Pillar ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Pillar {
    stem:   Stem,
    branch: Branch,
}

impl Pillar {
    /// Build a pillar from its parts. Parity-mismatched pairs are not
    /// part of the cycle.
    pub fn from_parts(stem: Stem, branch: Branch) -> ResonanceResult<Self> {
        if stem.index() % 2 != branch.index() % 2 {
            return Err(ResonanceError::InvalidPillar {
                value: format!("{}{}", stem.glyph(), branch.glyph()),
            });
        }
        Ok(Self { stem, branch })
    }

    /// Position 0..60 in the sexagenary cycle (0 = 甲子).
    pub fn from_cycle_index(index: usize) -> ResonanceResult<Self> {
        if index >= 60 {
            return Err(ResonanceError::InvalidPillar { value: index.to_string() });
        }
        Ok(Self {
            stem:   Stem::from_index(index),
            branch: Branch::from_index(index),
        })
    }

    pub fn cycle_index(&self) -> usize {
        // Solve i ≡ stem (mod 10), i ≡ branch (mod 12) over 0..60.
        (0..60)
            .find(|i| i % 10 == self.stem.index() && i % 12 == self.branch.index())
            .unwrap_or(0)
    }

    pub fn stem(&self) -> Stem {
        self.stem
    }

    pub fn branch(&self) -> Branch {
        self.branch
    }

    /// Parse either the two-glyph form (`甲子`) or the romanized form
    /// (`jia-zi`, case-insensitive).
    pub fn parse(raw: &str) -> ResonanceResult<Self> {
        let invalid = || ResonanceError::InvalidPillar { value: raw.to_string() };
        let trimmed = raw.trim();

        let mut chars = trimmed.chars();
        if let (Some(a), Some(b), None) = (chars.next(), chars.next(), chars.next()) {
            if let (Some(stem), Some(branch)) = (Stem::from_glyph(a), Branch::from_glyph(b)) {
                return Self::from_parts(stem, branch).map_err(|_| invalid());
            }
        }

        let lower = trimmed.to_ascii_lowercase();
        let (s, b) = lower.split_once('-').ok_or_else(invalid)?;
        let stem = Stem::from_romanized(s).ok_or_else(invalid)?;
        let branch = Branch::from_romanized(b).ok_or_else(invalid)?;
        Self::from_parts(stem, branch).map_err(|_| invalid())
    }
}

impl fmt::Display for Pillar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.stem.glyph(), self.branch.glyph())
    }
}

// ── Pillar sets ──────────────────────────────────────────────────────────────

/// Pillar labels exactly as the record store holds them, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPillarSet {
    pub year:  String,
    pub month: String,
    pub day:   String,
    pub hour:  String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PillarSet {
    pub year:  Pillar,
    pub month: Pillar,
    pub day:   Pillar,
    pub hour:  Pillar,
}

impl PillarSet {
    pub fn parse(raw: &RawPillarSet) -> ResonanceResult<Self> {
        Ok(Self {
            year:  Pillar::parse(&raw.year)?,
            month: Pillar::parse(&raw.month)?,
            day:   Pillar::parse(&raw.day)?,
            hour:  Pillar::parse(&raw.hour)?,
        })
    }

    pub fn to_raw(&self) -> RawPillarSet {
        RawPillarSet {
            year:  self.year.to_string(),
            month: self.month.to_string(),
            day:   self.day.to_string(),
            hour:  self.hour.to_string(),
        }
    }

    /// Ordered (year, month, day, hour).
    pub fn as_array(&self) -> [Pillar; 4] {
        [self.year, self.month, self.day, self.hour]
    }

    /// Sorted stem elements of all four pillars.
    pub fn element_profile(&self) -> [Element; 4] {
        let mut out = self.as_array().map(|p| p.stem().element());
        out.sort();
        out
    }

    /// Sorted branches of all four pillars.
    pub fn branch_profile(&self) -> [Branch; 4] {
        let mut out = self.as_array().map(|p| p.branch());
        out.sort();
        out
    }

    /// Derive the four pillars from a civil timestamp.
    ///
    /// Civil-calendar approximation: the pillar year turns on 4 February,
    /// month branches turn on fixed solar-term dates, and the day cycle is
    /// anchored at 2000-01-07 (甲子). Hour 23 takes the following day's
    /// stem for the hour pillar; the day pillar itself turns at midnight.
    pub fn from_datetime(at: NaiveDateTime) -> ResonanceResult<Self> {
        let date = at.date();
        let (month, day) = (date.month(), date.day());

        let pillar_year = if (month, day) < (2, 4) { date.year() - 1 } else { date.year() };
        let year = Pillar::from_cycle_index((pillar_year - 4).rem_euclid(60) as usize)?;

        let month_offset = solar_month_offset(month, day);
        let first_month_stem = (year.stem().index() % 5) * 2 + 2;
        let month = Pillar::from_parts(
            Stem::from_index(first_month_stem + month_offset),
            Branch::from_index(2 + month_offset),
        )?;

        let day_pillar = day_pillar_for(date)?;

        let hour_branch = Branch::from_hour(at.hour());
        let stem_day = if at.hour() == 23 {
            date.succ_opt().map(day_pillar_for).transpose()?.unwrap_or(day_pillar)
        } else {
            day_pillar
        };
        let hour_stem = (stem_day.stem().index() % 5) * 2 + hour_branch.index();
        let hour = Pillar::from_parts(Stem::from_index(hour_stem), hour_branch)?;

        Ok(Self { year, month, day: day_pillar, hour })
    }
}

/// Solar-term start (month, day) for each pillar month, beginning with 寅.
const SOLAR_MONTH_STARTS: [(u32, u32); 12] = [
    (2, 4), (3, 6), (4, 5), (5, 6), (6, 6), (7, 7),
    (8, 8), (9, 8), (10, 8), (11, 7), (12, 7), (1, 6),
];

/// Months elapsed since the 寅 month for a civil (month, day).
fn solar_month_offset(month: u32, day: u32) -> usize {
    // Dates before 4 February sort after December in the pillar year.
    let key = |m: u32, d: u32| if m < 2 || (m == 2 && d < 4) { (m + 12, d) } else { (m, d) };
    let at = key(month, day);
    SOLAR_MONTH_STARTS
        .iter()
        .rposition(|&(m, d)| key(m, d) <= at)
        .unwrap_or(0)
}

fn day_pillar_for(date: NaiveDate) -> ResonanceResult<Pillar> {
    // 2000-01-07 is 甲子.
    let anchor = NaiveDate::from_ymd_opt(2000, 1, 7)
        .ok_or_else(|| anyhow::anyhow!("invalid day-cycle anchor"))?;
    let days = (date - anchor).num_days();
    Pillar::from_cycle_index(days.rem_euclid(60) as usize)
}
