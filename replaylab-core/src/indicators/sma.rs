//! Simple Moving Average (SMA) over the last `period` observations.

use std::collections::VecDeque;

use super::Indicator;
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct Sma {
    period: usize,
    window: VecDeque<f64>,
    sum: f64,
}

impl Sma {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "SMA period must be >= 1");
        Self {
            period,
            window: VecDeque::with_capacity(period),
            sum: 0.0,
        }
    }

    pub fn period(&self) -> usize {
        self.period
    }
}

impl Indicator for Sma {
    fn update(&mut self, bar: &Bar) {
        self.apply(bar.close);
    }

    fn apply(&mut self, x: f64) {
        if self.window.len() == self.period {
            if let Some(old) = self.window.pop_front() {
                self.sum -= old;
            }
        }
        self.window.push_back(x);
        self.sum += x;
    }

    fn value(&self) -> f64 {
        if self.window.len() < self.period {
            return f64::NAN;
        }
        self.sum / self.period as f64
    }
}
