//! Average True Range (ATR), Wilder smoothing.
//!
//! True Range: max(high-low, |high-prev_close|, |low-prev_close|).
//! The first bar only establishes the previous close; the seed is the mean of
//! the next `period` true ranges, then ATR[t] = (ATR[t-1] * (period-1) + TR[t]) / period.

use super::Indicator;
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct Atr {
    period: usize,
    prev_close: Option<f64>,
    seen: usize,
    seed_sum: f64,
    current: f64,
}

impl Atr {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "ATR period must be >= 1");
        Self {
            period,
            prev_close: None,
            seen: 0,
            seed_sum: 0.0,
            current: f64::NAN,
        }
    }
}

impl Indicator for Atr {
    fn update(&mut self, bar: &Bar) {
        if let Some(pc) = self.prev_close {
            self.apply(bar.true_range(Some(pc)));
        }
        self.prev_close = Some(bar.close);
    }

    /// Feed a precomputed true range.
    fn apply(&mut self, tr: f64) {
        self.seen += 1;
        let p = self.period as f64;
        if self.seen < self.period {
            self.seed_sum += tr;
        } else if self.seen == self.period {
            self.current = (self.seed_sum + tr) / p;
        } else {
            self.current = (self.current * (p - 1.0) + tr) / p;
        }
    }

    fn value(&self) -> f64 {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, DEFAULT_EPSILON};
    use chrono::TimeZone;

    fn make_ohlc_bars(data: &[(f64, f64, f64, f64)]) -> Vec<Bar> {
        let base = chrono::Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        data.iter()
            .enumerate()
            .map(|(i, &(open, high, low, close))| Bar {
                start_time: base + chrono::Duration::days(i as i64),
                open,
                high,
                low,
                close,
                volume: 1000.0,
            })
            .collect()
    }

    #[test]
    fn atr_period_2() {
        let bars = make_ohlc_bars(&[
            (100.0, 105.0, 95.0, 102.0),  // seeds prev close
            (102.0, 108.0, 100.0, 106.0), // TR = 8
            (106.0, 107.0, 98.0, 99.0),   // TR = 9
            (99.0, 115.0, 99.0, 112.0),   // TR = 16
        ]);
        let mut atr = Atr::new(2);

        atr.update(&bars[0]);
        atr.update(&bars[1]);
        assert!(!atr.is_ready());

        atr.update(&bars[2]);
        assert_approx(atr.value(), 8.5, DEFAULT_EPSILON);

        atr.update(&bars[3]);
        assert_approx(atr.value(), (8.5 + 16.0) / 2.0, DEFAULT_EPSILON);
    }

    #[test]
    fn atr_gap_uses_prev_close() {
        let bars = make_ohlc_bars(&[
            (98.0, 102.0, 97.0, 100.0),
            (110.0, 115.0, 108.0, 112.0), // TR = 15
        ]);
        let mut atr = Atr::new(1);
        assert_approx(atr.update_all(&bars), 15.0, DEFAULT_EPSILON);
    }
}
