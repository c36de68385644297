//! BacktestTracker: running statistics over portfolio valuations.
//!
//! `update` is O(1): it maintains the mean return, Welford's sum of squared
//! deviations, the running peak and the running maximum drawdown. Volatility,
//! Sharpe and max drawdown are then read in O(1); Sortino, Omega and the Ulcer
//! Index need the full sample and take one pass over the retained series.
//!
//! All ratios are annualized with `periods_per_year = YEAR / step`, where the
//! step is the replay step the tracker was created for. Degenerate samples
//! (too few observations, zero variance, zero downside) read as 0.

use serde::{Deserialize, Serialize};

use crate::domain::{Interval, YEAR_NANOS};

/// Running moments and extremes of the valuation series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunningStats {
    /// Valuations observed.
    pub count: usize,
    pub first_value: f64,
    pub last_value: f64,
    pub mean_return: f64,
    /// Sum of squared deviations of returns from their mean (Welford).
    pub m2: f64,
    pub peak_value: f64,
    /// Most negative `value / peak - 1` seen so far; 0 when never below a peak.
    pub max_drawdown: f64,
}

/// Snapshot of every metric, suitable for export.
///
/// JSON carries non-finite ratios as `null`, which reads back as NaN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub step: Interval,
    pub min_return: f64,
    pub observations: usize,
    pub start_value: f64,
    pub end_value: f64,
    #[serde(with = "non_finite_as_null")]
    pub total_return: f64,
    /// Overflows to infinity for short steps with large gains.
    #[serde(with = "non_finite_as_null")]
    pub annualized_return: f64,
    #[serde(with = "non_finite_as_null")]
    pub volatility: f64,
    #[serde(with = "non_finite_as_null")]
    pub sharpe: f64,
    #[serde(with = "non_finite_as_null")]
    pub sortino: f64,
    /// Infinite without losses.
    #[serde(with = "non_finite_as_null")]
    pub omega: f64,
    pub max_drawdown: f64,
    #[serde(with = "non_finite_as_null")]
    pub ulcer_index: f64,
    #[serde(with = "non_finite_as_null")]
    pub martin: f64,
}

mod non_finite_as_null {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else {
            serializer.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
    }
}

#[derive(Debug, Clone)]
pub struct BacktestTracker {
    step: Interval,
    stats: RunningStats,
    values: Vec<f64>,
    returns: Vec<f64>,
}

impl BacktestTracker {
    pub fn new(step: Interval) -> Self {
        Self {
            step,
            stats: RunningStats::default(),
            values: Vec::new(),
            returns: Vec::new(),
        }
    }

    /// Record the next portfolio valuation.
    pub fn update(&mut self, value: f64) {
        self.values.push(value);
        let s = &mut self.stats;

        if s.count == 0 {
            s.count = 1;
            s.first_value = value;
            s.last_value = value;
            s.peak_value = value;
            return;
        }

        let r = value / s.last_value - 1.0;
        self.returns.push(r);
        s.count += 1;
        s.last_value = value;

        let n = self.returns.len() as f64;
        let mean = (s.mean_return * (n - 1.0) + r) / n;
        s.m2 += (r - s.mean_return) * (r - mean);
        s.mean_return = mean;

        if value > s.peak_value {
            s.peak_value = value;
        } else {
            let drawdown = value / s.peak_value - 1.0;
            s.max_drawdown = s.max_drawdown.min(drawdown);
        }
    }

    pub fn step(&self) -> Interval {
        self.step
    }

    pub fn stats(&self) -> &RunningStats {
        &self.stats
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn returns(&self) -> &[f64] {
        &self.returns
    }

    pub fn len(&self) -> usize {
        self.stats.count
    }

    pub fn is_empty(&self) -> bool {
        self.stats.count == 0
    }

    pub fn periods_per_year(&self) -> f64 {
        self.step.periods_per_year()
    }

    /// Annual minimum acceptable return converted to a per-step rate.
    pub fn periodic_min(&self, min_return: f64) -> f64 {
        (1.0 + min_return).powf(1.0 / self.periods_per_year()) - 1.0
    }

    // ── Return ──

    pub fn total_return(&self) -> f64 {
        if self.stats.count < 2 {
            return 0.0;
        }
        self.stats.last_value / self.stats.first_value - 1.0
    }

    /// Geometric return scaled to a 365-day year.
    pub fn annualized_return(&self) -> f64 {
        let periods = self.stats.count.saturating_sub(1);
        if periods == 0 {
            return 0.0;
        }
        let elapsed = periods as f64 * self.step.as_nanos() as f64;
        (self.stats.last_value / self.stats.first_value).powf(YEAR_NANOS / elapsed) - 1.0
    }

    // ── Risk ──

    /// Sample standard deviation of per-step returns.
    pub fn return_stdev(&self) -> f64 {
        let n = self.returns.len();
        if n < 2 {
            return 0.0;
        }
        (self.stats.m2 / (n - 1) as f64).max(0.0).sqrt()
    }

    pub fn volatility(&self) -> f64 {
        self.return_stdev() * self.periods_per_year().sqrt()
    }

    pub fn max_drawdown(&self) -> f64 {
        self.stats.max_drawdown
    }

    /// Root-mean-square of the drawdown from the running peak.
    pub fn ulcer_index(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let mut peak = f64::NEG_INFINITY;
        let sum_sq: f64 = self
            .values
            .iter()
            .map(|&v| {
                peak = peak.max(v);
                let dd = (peak - v) / peak;
                dd * dd
            })
            .sum();
        (sum_sq / self.values.len() as f64).sqrt()
    }

    // ── Ratios ──

    pub fn sharpe(&self, min_return: f64) -> f64 {
        let sd = self.return_stdev();
        if sd == 0.0 {
            return 0.0;
        }
        (self.stats.mean_return - self.periodic_min(min_return)) / sd * self.periods_per_year().sqrt()
    }

    pub fn sortino(&self, min_return: f64) -> f64 {
        if self.returns.is_empty() {
            return 0.0;
        }
        let pmin = self.periodic_min(min_return);
        let downside_sq: f64 = self
            .returns
            .iter()
            .map(|r| (r - pmin).min(0.0).powi(2))
            .sum();
        let downside = (downside_sq / self.returns.len() as f64).sqrt();
        if downside == 0.0 {
            return 0.0;
        }
        (self.stats.mean_return - pmin) / downside * self.periods_per_year().sqrt()
    }

    /// Probability-weighted gains over losses about the per-step threshold.
    ///
    /// No losses gives +inf; an empty sample gives NaN.
    pub fn omega(&self, min_return: f64) -> f64 {
        let pmin = self.periodic_min(min_return);
        let (gains, losses) = self.returns.iter().fold((0.0, 0.0), |(g, l), &r| {
            if r > pmin {
                (g + (r - pmin), l)
            } else if r < pmin {
                (g, l + (pmin - r))
            } else {
                (g, l)
            }
        });
        gains / losses
    }

    pub fn martin(&self, min_return: f64) -> f64 {
        let ulcer = self.ulcer_index();
        if ulcer == 0.0 {
            return 0.0;
        }
        (self.annualized_return() - min_return) / ulcer
    }

    pub fn report(&self, min_return: f64) -> PerformanceReport {
        PerformanceReport {
            step: self.step,
            min_return,
            observations: self.stats.count,
            start_value: self.stats.first_value,
            end_value: self.stats.last_value,
            total_return: self.total_return(),
            annualized_return: self.annualized_return(),
            volatility: self.volatility(),
            sharpe: self.sharpe(min_return),
            sortino: self.sortino(min_return),
            omega: self.omega(min_return),
            max_drawdown: self.max_drawdown(),
            ulcer_index: self.ulcer_index(),
            martin: self.martin(min_return),
        }
    }

    /// BLAKE3 over the little-endian bytes of the value and return series.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&(self.values.len() as u64).to_le_bytes());
        for v in &self.values {
            hasher.update(&v.to_le_bytes());
        }
        for r in &self.returns {
            hasher.update(&r.to_le_bytes());
        }
        hasher.finalize().to_hex().to_string()
    }
}
