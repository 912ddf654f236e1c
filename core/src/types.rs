//! Shared primitive types used across the entire matching core.

/// A stable, unique identifier for any entity in the population.
pub type EntityId = String;

/// Monotonically increasing identifier of an accepted weight vector.
pub type VersionId = i64;

/// Identifier of a batch job (tuning run, leaderboard rebuild).
pub type JobId = String;

/// Canonical storage key for an unordered entity pair: (lower, higher).
pub fn pair_key(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}
