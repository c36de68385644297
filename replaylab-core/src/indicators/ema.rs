//! Exponential Moving Average (EMA).
//!
//! EMA[t] = alpha * x[t] + (1 - alpha) * EMA[t-1], alpha = 2 / (period + 1).
//! Seeded with the SMA of the first `period` observations.

use super::Indicator;
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct Ema {
    period: usize,
    alpha: f64,
    seen: usize,
    seed_sum: f64,
    current: f64,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "EMA period must be >= 1");
        Self {
            period,
            alpha: 2.0 / (period as f64 + 1.0),
            seen: 0,
            seed_sum: 0.0,
            current: f64::NAN,
        }
    }

    pub fn period(&self) -> usize {
        self.period
    }
}

impl Indicator for Ema {
    fn update(&mut self, bar: &Bar) {
        self.apply(bar.close);
    }

    fn apply(&mut self, x: f64) {
        self.seen += 1;
        if self.seen < self.period {
            self.seed_sum += x;
        } else if self.seen == self.period {
            self.seed_sum += x;
            self.current = self.seed_sum / self.period as f64;
        } else {
            self.current = self.alpha * x + (1.0 - self.alpha) * self.current;
        }
    }

    fn value(&self) -> f64 {
        self.current
    }
}
