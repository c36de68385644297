//! Scheduler replay: backtest valuations, determinism and fail-fast.

use chrono::{DateTime, TimeZone, Utc};
use replaylab_core::data::{SyntheticFetcher, TimeSeriesStore};
use replaylab_core::domain::Interval;
use replaylab_core::engine::{Blackboard, BoxError, Scheduler, SchedulerError};

fn assert_slices_approx(actual: &[f64], expected: &[f64]) {
    assert_eq!(actual.len(), expected.len());
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!((a - e).abs() < 1e-6, "[{i}] {a} != {e}");
    }
}

#[test]
fn backtest_feeds_every_step_into_tracker() {
    let mut scheduler: Scheduler<()> = Scheduler::new();

    let mut i = 0u64;
    let mut x = 1.1111111111111111_f64;
    let mut first: Option<DateTime<Utc>> = None;
    let mut last: Option<DateTime<Utc>> = None;

    // -10% once, then +10% four times, then repeat
    let evaluator = |now: DateTime<Utc>, _: &mut ()| -> Result<f64, BoxError> {
        first.get_or_insert(now);
        last = Some(now);
        x *= if i % 5 == 0 { 0.9 } else { 1.1 };
        i += 1;
        Ok(x)
    };

    // 12:23 and 08:49 EST
    let start = Utc.with_ymd_and_hms(2024, 6, 30, 17, 23, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2025, 6, 30, 13, 49, 0).unwrap();
    let tracker = scheduler
        .run_backtest(start, end, Interval::HOUR, &mut (), evaluator)
        .unwrap();

    assert_eq!(first, Some(Utc.with_ymd_and_hms(2024, 6, 30, 17, 0, 0).unwrap()));
    assert_eq!(last, Some(Utc.with_ymd_and_hms(2025, 6, 30, 12, 0, 0).unwrap()));
    assert_eq!(tracker.len(), 365 * 24 - 4);

    assert_slices_approx(
        &tracker.values()[..6],
        &[1.0, 1.1, 1.21, 1.331, 1.4641, 1.31769],
    );
    assert_slices_approx(&tracker.returns()[..5], &[0.1, 0.1, 0.1, 0.1, -0.1]);
}

struct Ctx {
    store: TimeSeriesStore,
    board: Blackboard,
}

fn synthetic_ctx() -> Ctx {
    let origin = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let until = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
    Ctx {
        store: TimeSeriesStore::new(SyntheticFetcher::new(origin, until).with_seed(11)),
        board: Blackboard::new(),
    }
}

fn momentum_scheduler() -> Scheduler<Ctx> {
    let mut scheduler = Scheduler::new();
    scheduler.add(Interval::HOUR, |t, ctx: &mut Ctx| {
        let bars = ctx.store.get_n_before("BTC/USD", Interval::HOUR, 4, t)?;
        let (first, last) = (bars[0].close, bars[bars.len() - 1].close);
        ctx.board.set("exposure", if last > first { 1.0 } else { 0.0 });
        Ok(())
    });
    scheduler
}

fn run_once() -> String {
    let mut ctx = synthetic_ctx();
    let mut scheduler = momentum_scheduler();
    let mut equity = 1_000.0;
    let mut prev_price: Option<f64> = None;

    let tracker = scheduler
        .run_backtest(
            Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 12, 0, 0, 0).unwrap(),
            Interval::HOUR,
            &mut ctx,
            |t, ctx: &mut Ctx| {
                let price = ctx.store.get_price_at("BTC/USD", t)?;
                if let Some(prev) = prev_price {
                    equity *= 1.0 + ctx.board.get_or("exposure", 0.0) * (price / prev - 1.0);
                }
                prev_price = Some(price);
                Ok(equity)
            },
        )
        .unwrap();

    assert_eq!(tracker.len(), 240);
    tracker.fingerprint()
}

#[test]
fn identical_backtests_have_identical_fingerprints() {
    assert_eq!(run_once(), run_once());
}

#[test]
fn failing_stage_returns_partial_tracker() {
    let mut scheduler: Scheduler<u32> = Scheduler::new();
    scheduler.add(Interval::HOUR, |_, calls: &mut u32| {
        *calls += 1;
        if *calls == 4 {
            return Err("exchange unavailable".into());
        }
        Ok(())
    });

    let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    let end = start + chrono::Duration::days(1);
    let mut calls = 0;
    let partial = scheduler
        .run_backtest(start, end, Interval::HOUR, &mut calls, |_, _| Ok(1.0))
        .unwrap_err();

    assert_eq!(partial.tracker.len(), 3);
    match &partial.error {
        SchedulerError::Stage { interval, at, .. } => {
            assert_eq!(*interval, Interval::HOUR);
            assert_eq!(*at, start + chrono::Duration::hours(3));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(partial.to_string().contains("after 3 valuations"));
}

#[test]
fn failing_evaluator_keeps_earlier_values() {
    let mut scheduler: Scheduler<()> = Scheduler::new();
    let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    let mut n = 0;

    let partial = scheduler
        .run_backtest(start, start + chrono::Duration::hours(10), Interval::HOUR, &mut (), |_, _| {
            n += 1;
            if n > 2 {
                Err("no price".into())
            } else {
                Ok(100.0 + n as f64)
            }
        })
        .unwrap_err();

    assert_eq!(partial.tracker.values(), &[101.0, 102.0]);
    assert!(matches!(partial.error, SchedulerError::Evaluator { .. }));
}

#[test]
fn slower_intervals_fire_on_their_boundaries_during_replay() {
    let mut scheduler: Scheduler<Vec<(Interval, DateTime<Utc>)>> = Scheduler::new();
    for interval in [Interval::HOUR, Interval::minutes(15), Interval::hours(4)] {
        scheduler.add(interval, move |t, log: &mut Vec<(Interval, DateTime<Utc>)>| {
            log.push((interval, t));
            Ok(())
        });
    }

    let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    let mut log = Vec::new();
    let ticks = scheduler
        .run_between(start, start + chrono::Duration::hours(8), Interval::minutes(15), &mut log)
        .unwrap();

    assert_eq!(ticks, 32);
    let count = |i: Interval| log.iter().filter(|(iv, _)| *iv == i).count();
    assert_eq!(count(Interval::minutes(15)), 32);
    assert_eq!(count(Interval::HOUR), 8);
    assert_eq!(count(Interval::hours(4)), 2);
    // at a shared boundary the shorter interval runs first
    assert_eq!(log[0], (Interval::minutes(15), start));
    assert_eq!(log[1], (Interval::HOUR, start));
    assert_eq!(log[2], (Interval::hours(4), start));
}
