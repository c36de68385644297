//! Streaming technical indicators.
//!
//! Every indicator consumes one observation at a time and exposes its current
//! reading in O(1). Before an indicator has seen enough input to produce a
//! value, `value()` returns NaN and `is_ready()` is false.
//!
//! Indicators compose through `Chain`, which feeds one indicator's output into
//! another (e.g. an EMA of the ATR).

pub mod atr;
pub mod chain;
pub mod ema;
pub mod sma;

pub use atr::Atr;
pub use chain::Chain;
pub use ema::Ema;
pub use sma::Sma;

use crate::domain::Bar;

/// Incremental indicator contract.
pub trait Indicator: Send {
    /// Feed a whole bar. Price-based indicators read the close.
    fn update(&mut self, bar: &Bar);

    /// Feed a raw scalar observation.
    fn apply(&mut self, x: f64);

    /// Current reading, NaN until warmed up.
    fn value(&self) -> f64;

    fn is_ready(&self) -> bool {
        !self.value().is_nan()
    }

    /// Feed a slice of bars in order and return the final reading.
    fn update_all(&mut self, bars: &[Bar]) -> f64 {
        for bar in bars {
            self.update(bar);
        }
        self.value()
    }
}

impl<I: Indicator + ?Sized> Indicator for Box<I> {
    fn update(&mut self, bar: &Bar) {
        (**self).update(bar)
    }

    fn apply(&mut self, x: f64) {
        (**self).apply(x)
    }

    fn value(&self) -> f64 {
        (**self).value()
    }
}

/// Create synthetic hourly bars from close prices for testing.
///
/// open = prev_close (or close for the first bar), high = max(open,close) + 1.0,
/// low = min(open,close) - 1.0, volume = 1000.
#[cfg(test)]
pub fn make_bars(closes: &[f64]) -> Vec<Bar> {
    use chrono::TimeZone;
    let base = chrono::Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Bar {
                start_time: base + chrono::Duration::hours(i as i64),
                open,
                high: open.max(close) + 1.0,
                low: open.min(close) - 1.0,
                close,
                volume: 1000.0,
            }
        })
        .collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
