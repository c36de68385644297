//! Property tests for cache and tracker invariants.
//!
//! Uses proptest to verify:
//! 1. Merge correctness: sorted union, strictly increasing, cached entry wins ties
//! 2. Cache hits: any `since` inside a fetched range is answered without a refetch
//! 3. Drawdown: the O(1) running value equals the brute-force minimum
//! 4. Welford moments agree with a two-pass computation
//! 5. Degenerate samples read 0 for every minimum acceptable return

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use replaylab_core::analytics::BacktestTracker;
use replaylab_core::data::{merge_bars, BarFetcher, DataError, TimeSeriesStore};
use replaylab_core::domain::{Bar, Interval};

// ── Strategies (proptest) ────────────────────────────────────────────

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// Strictly increasing hourly bars from a set of hour offsets.
fn arb_series(price: f64) -> impl Strategy<Value = Vec<Bar>> {
    prop::collection::btree_set(0i64..200, 0..60).prop_map(move |hours| {
        hours
            .into_iter()
            .map(|h| Bar::flat(base() + Duration::hours(h), price + h as f64))
            .collect()
    })
}

fn arb_values() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(1.0..1_000.0_f64, 1..120)
}

/// Serves every hourly bar in `[since, base + horizon)`.
struct CountingFetcher {
    horizon_hours: i64,
    calls: Arc<AtomicUsize>,
}

impl BarFetcher for CountingFetcher {
    fn name(&self) -> &str {
        "counting"
    }

    fn fetch_bars_since(
        &self,
        _symbol: &str,
        interval: Interval,
        since: DateTime<Utc>,
    ) -> Result<Vec<Bar>, DataError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let end = base() + Duration::hours(self.horizon_hours);
        let mut t = interval.truncate(since);
        let mut bars = Vec::new();
        while t < end {
            bars.push(Bar::flat(t, 1.0));
            t += interval.as_duration();
        }
        Ok(bars)
    }
}

// ── 1. Merge ─────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn merge_is_sorted_union_preferring_cached(
        cached in arb_series(100.0),
        incoming in arb_series(5_000.0),
    ) {
        let merged = merge_bars(&cached, &incoming);

        let expected: BTreeSet<_> = cached
            .iter()
            .chain(&incoming)
            .map(|b| b.start_time)
            .collect();
        let times: Vec<_> = merged.iter().map(|b| b.start_time).collect();
        prop_assert_eq!(times, expected.into_iter().collect::<Vec<_>>());

        let cached_by_time: BTreeMap<_, _> = cached.iter().map(|b| (b.start_time, b.close)).collect();
        for bar in &merged {
            if let Some(&close) = cached_by_time.get(&bar.start_time) {
                prop_assert_eq!(bar.close, close);
            }
        }
    }

    #[test]
    fn store_set_keeps_series_strictly_increasing(
        batches in prop::collection::vec(arb_series(1.0), 1..6),
    ) {
        let mut store = TimeSeriesStore::new(CountingFetcher {
            horizon_hours: 0,
            calls: Arc::new(AtomicUsize::new(0)),
        });
        let mut all = BTreeSet::new();
        for batch in batches {
            all.extend(batch.iter().map(|b| b.start_time));
            store.set("X/Y", Interval::HOUR, batch).unwrap();
        }

        let series = store.series("X/Y", Interval::HOUR);
        prop_assert!(series.windows(2).all(|w| w[0].start_time < w[1].start_time));
        prop_assert_eq!(series.len(), all.len());
    }
}

// ── 2. Cache hits ────────────────────────────────────────────────────

proptest! {
    #[test]
    fn since_inside_fetched_range_is_a_hit(minutes in 0i64..(48 * 60)) {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut store = TimeSeriesStore::new(CountingFetcher {
            horizon_hours: 48,
            calls: Arc::clone(&calls),
        });
        store.get_since("X/Y", Interval::HOUR, base()).unwrap();

        let since = base() + Duration::minutes(minutes);
        let bars = store.get_since("X/Y", Interval::HOUR, since).unwrap();
        let floor = Interval::HOUR.truncate(since);

        prop_assert_eq!(calls.load(Ordering::SeqCst), 1);
        prop_assert_eq!(bars[0].start_time, floor);
        prop_assert_eq!(bars.len() as i64, 48 - (floor - base()).num_hours());
    }
}

// ── 3. Drawdown and moments ──────────────────────────────────────────

proptest! {
    #[test]
    fn running_drawdown_matches_brute_force(values in arb_values()) {
        let mut tracker = BacktestTracker::new(Interval::HOUR);
        for &v in &values {
            tracker.update(v);
        }

        let mut peak = f64::NEG_INFINITY;
        let mut brute = 0.0_f64;
        for &v in &values {
            peak = peak.max(v);
            brute = brute.min(v / peak - 1.0);
        }

        prop_assert!((tracker.max_drawdown() - brute).abs() < 1e-12);
        prop_assert!(tracker.max_drawdown() <= 0.0);
    }

    #[test]
    fn welford_matches_two_pass(values in arb_values()) {
        let mut tracker = BacktestTracker::new(Interval::DAY);
        for &v in &values {
            tracker.update(v);
        }

        let r = tracker.returns();
        prop_assume!(r.len() >= 2);
        let mean = r.iter().sum::<f64>() / r.len() as f64;
        let var = r.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (r.len() - 1) as f64;

        prop_assert!((tracker.stats().mean_return - mean).abs() < 1e-9 * (1.0 + mean.abs()));
        prop_assert!((tracker.return_stdev() - var.sqrt()).abs() < 1e-9 * (1.0 + var.sqrt()));
    }
}

// ── 4. Degenerate samples ────────────────────────────────────────────

proptest! {
    #[test]
    fn short_samples_read_zero_for_any_threshold(
        x in -0.99..10.0_f64,
        first in prop::option::of(1.0..1_000.0_f64),
    ) {
        let mut tracker = BacktestTracker::new(Interval::DAY);
        if let Some(v) = first {
            tracker.update(v);
        }

        prop_assert_eq!(tracker.sharpe(x), 0.0);
        prop_assert_eq!(tracker.sortino(x), 0.0);
        prop_assert_eq!(tracker.martin(x), 0.0);
    }

    #[test]
    fn flat_series_has_zero_sharpe_for_any_threshold(
        x in -0.99..10.0_f64,
        value in 1.0..1_000.0_f64,
        len in 2usize..50,
    ) {
        let mut tracker = BacktestTracker::new(Interval::HOUR);
        for _ in 0..len {
            tracker.update(value);
        }

        prop_assert_eq!(tracker.volatility(), 0.0);
        prop_assert_eq!(tracker.sharpe(x), 0.0);
    }
}
