//! Deterministic synthetic bars for tests, demos and offline replays.
//!
//! Every bar is a pure function of `(seed, symbol, interval, bar index)`, so
//! overlapping fetches over different ranges always agree. History exists only
//! inside `[origin, until)`; bars that would still be forming at `until` are
//! not returned.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::TAU;

use super::provider::{BarFetcher, DataError};
use crate::domain::{Bar, Interval};

#[derive(Debug, Clone)]
pub struct SyntheticFetcher {
    origin: DateTime<Utc>,
    until: DateTime<Utc>,
    seed: u64,
    base_price: f64,
    /// Bars per full oscillation of the underlying price wave.
    cycle_bars: f64,
    amplitude: f64,
    noise: f64,
}

impl SyntheticFetcher {
    pub fn new(origin: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        assert!(origin <= until, "synthetic origin must not be after until");
        Self {
            origin,
            until,
            seed: 42,
            base_price: 100.0,
            cycle_bars: 240.0,
            amplitude: 0.2,
            noise: 0.01,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_shape(mut self, base_price: f64, cycle_bars: f64, amplitude: f64, noise: f64) -> Self {
        assert!(base_price > 0.0, "base price must be positive");
        assert!(cycle_bars > 0.0, "cycle length must be positive");
        assert!((0.0..1.0).contains(&amplitude), "amplitude must be in [0, 1)");
        assert!((0.0..1.0).contains(&noise), "noise must be in [0, 1)");
        self.base_price = base_price;
        self.cycle_bars = cycle_bars;
        self.amplitude = amplitude;
        self.noise = noise;
        self
    }

    fn rng_for(&self, symbol: &str, interval: Interval, index: i64) -> StdRng {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.seed.to_le_bytes());
        hasher.update(symbol.as_bytes());
        hasher.update(&interval.as_nanos().to_le_bytes());
        hasher.update(&index.to_le_bytes());
        StdRng::from_seed(*hasher.finalize().as_bytes())
    }

    fn close_at(&self, symbol: &str, interval: Interval, index: i64) -> f64 {
        let phase = TAU * index as f64 / self.cycle_bars;
        let eps: f64 = if self.noise > 0.0 {
            self.rng_for(symbol, interval, index).gen_range(-self.noise..self.noise)
        } else {
            0.0
        };
        self.base_price * (1.0 + self.amplitude * phase.sin()) * (1.0 + eps)
    }

    /// The bar starting at `start_time` (which must be aligned to `interval`).
    pub fn bar_at(&self, symbol: &str, interval: Interval, start_time: DateTime<Utc>) -> Bar {
        let index = bar_index(interval, start_time);
        let open = self.close_at(symbol, interval, index - 1);
        let close = self.close_at(symbol, interval, index);

        let mut rng = self.rng_for(symbol, interval, index.wrapping_add(i64::MIN));
        let wick = self.noise.max(0.001);
        let high = open.max(close) * (1.0 + rng.gen_range(0.0..wick));
        let low = open.min(close) * (1.0 - rng.gen_range(0.0..wick));
        let volume = rng.gen_range(10.0..1_000.0);

        Bar {
            start_time,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

fn bar_index(interval: Interval, start_time: DateTime<Utc>) -> i64 {
    let nanos = start_time.timestamp() as i128 * 1_000_000_000
        + start_time.timestamp_subsec_nanos() as i128;
    (nanos.div_euclid(interval.as_nanos() as i128)) as i64
}

impl BarFetcher for SyntheticFetcher {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn fetch_bars_since(
        &self,
        symbol: &str,
        interval: Interval,
        since: DateTime<Utc>,
    ) -> Result<Vec<Bar>, DataError> {
        let step = interval.as_duration();
        let mut t = interval.truncate(since.max(self.origin));
        if t < self.origin {
            t += step;
        }

        let mut bars = Vec::new();
        while t + step <= self.until {
            bars.push(self.bar_at(symbol, interval, t));
            t += step;
        }
        Ok(bars)
    }
}
