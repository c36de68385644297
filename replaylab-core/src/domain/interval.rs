//! Interval: a strictly positive bar duration with epoch-relative truncation.
//!
//! Every series and every scheduler slot is keyed by an `Interval`. Truncation
//! floors an instant to the nearest multiple of the interval since the Unix
//! epoch, which is what makes bar start times and scheduler ticks line up.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Nanoseconds in a 365-day year. Used to annualize per-step statistics.
pub const YEAR_NANOS: f64 = 3.1536e16;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntervalError {
    #[error("interval must be strictly positive, got {0}ns")]
    NotPositive(i64),

    #[error("invalid interval '{0}' (expected e.g. 30s, 1m, 15m, 1h, 1d, 1w)")]
    Parse(String),
}

/// Bar / tick interval, stored as whole nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Interval(i64);

impl Interval {
    pub const MINUTE: Interval = Interval(60 * NANOS_PER_SECOND);
    pub const HOUR: Interval = Interval(60 * 60 * NANOS_PER_SECOND);
    pub const DAY: Interval = Interval(24 * 60 * 60 * NANOS_PER_SECOND);

    /// Smallest schedulable resolution and the granularity used by point-price fallbacks.
    pub const BASE: Interval = Interval::MINUTE;

    pub fn from_nanos(nanos: i64) -> Result<Self, IntervalError> {
        if nanos <= 0 {
            return Err(IntervalError::NotPositive(nanos));
        }
        Ok(Self(nanos))
    }

    pub fn from_duration(duration: Duration) -> Result<Self, IntervalError> {
        let nanos = duration
            .num_nanoseconds()
            .ok_or_else(|| IntervalError::Parse(format!("{duration} overflows")))?;
        Self::from_nanos(nanos)
    }

    pub fn seconds(n: i64) -> Self {
        assert!(n >= 1, "interval must be >= 1s");
        Self(n * NANOS_PER_SECOND)
    }

    pub fn minutes(n: i64) -> Self {
        assert!(n >= 1, "interval must be >= 1m");
        Self(n * Self::MINUTE.0)
    }

    pub fn hours(n: i64) -> Self {
        assert!(n >= 1, "interval must be >= 1h");
        Self(n * Self::HOUR.0)
    }

    pub fn days(n: i64) -> Self {
        assert!(n >= 1, "interval must be >= 1d");
        Self(n * Self::DAY.0)
    }

    pub fn as_nanos(self) -> i64 {
        self.0
    }

    pub fn as_duration(self) -> Duration {
        Duration::nanoseconds(self.0)
    }

    /// Whole minutes, as used by exchange OHLC endpoints and historical file names.
    pub fn as_minutes(self) -> i64 {
        self.0 / Self::MINUTE.0
    }

    /// Number of intervals in a 365-day year.
    pub fn periods_per_year(self) -> f64 {
        YEAR_NANOS / self.0 as f64
    }

    /// Floor `t` to the nearest multiple of this interval since the Unix epoch.
    pub fn truncate(self, t: DateTime<Utc>) -> DateTime<Utc> {
        let nanos = t.timestamp() as i128 * NANOS_PER_SECOND as i128
            + t.timestamp_subsec_nanos() as i128;
        // rem_euclid keeps pre-epoch instants flooring downwards; the remainder
        // is always smaller than the interval, so it fits back into i64.
        let rem = nanos.rem_euclid(self.0 as i128) as i64;
        t - Duration::nanoseconds(rem)
    }

    /// Whether `t` sits exactly on a boundary of this interval.
    pub fn is_aligned(self, t: DateTime<Utc>) -> bool {
        self.truncate(t) == t
    }

    /// `n` intervals as a duration.
    pub fn times(self, n: usize) -> Duration {
        Duration::nanoseconds(self.0.saturating_mul(n as i64))
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const UNITS: [(i64, &str); 5] = [
            (7 * 24 * 60 * 60 * NANOS_PER_SECOND, "w"),
            (24 * 60 * 60 * NANOS_PER_SECOND, "d"),
            (60 * 60 * NANOS_PER_SECOND, "h"),
            (60 * NANOS_PER_SECOND, "m"),
            (NANOS_PER_SECOND, "s"),
        ];
        for (unit, suffix) in UNITS {
            if self.0 % unit == 0 {
                return write!(f, "{}{suffix}", self.0 / unit);
            }
        }
        write!(f, "{}ns", self.0)
    }
}

impl FromStr for Interval {
    type Err = IntervalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let split = s
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| IntervalError::Parse(s.to_string()))?;
        let (count, unit) = s.split_at(split);
        let count: i64 = count
            .parse()
            .map_err(|_| IntervalError::Parse(s.to_string()))?;
        let unit_nanos = match unit {
            "ns" => 1,
            "s" => NANOS_PER_SECOND,
            "m" | "min" => 60 * NANOS_PER_SECOND,
            "h" => 60 * 60 * NANOS_PER_SECOND,
            "d" => 24 * 60 * 60 * NANOS_PER_SECOND,
            "w" => 7 * 24 * 60 * 60 * NANOS_PER_SECOND,
            _ => return Err(IntervalError::Parse(s.to_string())),
        };
        let nanos = count
            .checked_mul(unit_nanos)
            .ok_or_else(|| IntervalError::Parse(s.to_string()))?;
        Self::from_nanos(nanos)
    }
}

impl TryFrom<String> for Interval {
    type Error = IntervalError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Interval> for String {
    fn from(value: Interval) -> Self {
        value.to_string()
    }
}
