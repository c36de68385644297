//! Cross-sectional factor ranking.
//!
//! Each factor column is min-max normalised to [0, 1] across all rows, then
//! rows are ordered by the sum of their normalised factors, best first. Higher
//! raw factor values are always better.

use replaylab_core::analytics::PerformanceReport;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Factor names produced by [`RankerRow::from_report`], in column order.
pub const REPORT_FACTORS: [&str; 4] = ["sharpe", "sortino", "martin", "max_drawdown"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankerRow {
    pub key: String,
    pub factors: Vec<f64>,
}

impl RankerRow {
    pub fn new(key: impl Into<String>, factors: Vec<f64>) -> Self {
        Self {
            key: key.into(),
            factors,
        }
    }

    /// Risk-adjusted factors of a replay. Drawdown is negative, so a shallower
    /// drawdown already ranks higher. Non-finite readings count as 0.
    pub fn from_report(key: impl Into<String>, report: &PerformanceReport) -> Self {
        let factors = [report.sharpe, report.sortino, report.martin, report.max_drawdown]
            .into_iter()
            .map(|f| if f.is_finite() { f } else { 0.0 })
            .collect();
        Self::new(key, factors)
    }

    pub fn score(&self) -> f64 {
        self.factors.iter().sum()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ranker {
    rows: Vec<RankerRow>,
}

impl Ranker {
    pub fn new(rows: Vec<RankerRow>) -> Self {
        Self { rows }
    }

    pub fn push(&mut self, row: RankerRow) {
        self.rows.push(row);
    }

    pub fn rows(&self) -> &[RankerRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Normalise every factor column in place and sort by total score, descending.
    ///
    /// A column with no spread normalises to 0. Equal scores keep key order.
    pub fn rank(&mut self) {
        let width = self.rows.iter().map(|r| r.factors.len()).max().unwrap_or(0);

        for col in 0..width {
            let column = self.rows.iter().filter_map(|r| r.factors.get(col).copied());
            let (min, max) = column.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            });
            let spread = max - min;

            for row in &mut self.rows {
                if let Some(v) = row.factors.get_mut(col) {
                    *v = if spread > 0.0 { (*v - min) / spread } else { 0.0 };
                }
            }
        }

        self.rows.sort_by(|a, b| {
            b.score()
                .partial_cmp(&a.score())
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.key.cmp(&b.key))
        });
    }

    /// The first `floor(q * n)` rows.
    pub fn top(&self, q: f64) -> &[RankerRow] {
        &self.rows[..self.quantile_len(q)]
    }

    /// The last `floor(q * n)` rows.
    pub fn bottom(&self, q: f64) -> &[RankerRow] {
        &self.rows[self.rows.len() - self.quantile_len(q)..]
    }

    fn quantile_len(&self, q: f64) -> usize {
        let n = self.rows.len();
        ((q.clamp(0.0, 1.0) * n as f64) as usize).min(n)
    }
}
