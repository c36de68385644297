//! Live evaluation loop driven by a wall (or simulated) clock.
//!
//! Sleeps to each one-minute boundary, runs the due stages, values the
//! portfolio and feeds the tracker. Fails fast: the first stage or evaluator
//! error ends the loop.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::scheduler::{BoxError, Scheduler, SchedulerError};
use crate::analytics::BacktestTracker;

pub trait Clock {
    fn now(&self) -> DateTime<Utc>;

    /// Block until `t` (returns immediately if `t` is in the past).
    fn sleep_until(&mut self, t: DateTime<Utc>);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep_until(&mut self, t: DateTime<Utc>) {
        if let Ok(wait) = (t - Utc::now()).to_std() {
            std::thread::sleep(wait);
        }
    }
}

/// Clock that jumps forward instantly; for tests and dry runs.
#[derive(Debug, Clone, Copy)]
pub struct ManualClock {
    now: DateTime<Utc>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now }
    }

    pub fn advance(&mut self, by: chrono::Duration) {
        self.now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now
    }

    fn sleep_until(&mut self, t: DateTime<Utc>) {
        self.now = self.now.max(t);
    }
}

/// Run `max_ticks` live ticks (forever if `None`). Returns the ticks completed.
pub fn run_live<C, E, K>(
    scheduler: &mut Scheduler<C>,
    ctx: &mut C,
    tracker: &mut BacktestTracker,
    mut evaluator: E,
    clock: &mut K,
    max_ticks: Option<usize>,
) -> Result<usize, SchedulerError>
where
    E: FnMut(DateTime<Utc>, &mut C) -> Result<f64, BoxError>,
    K: Clock,
{
    let mut ticks = 0;

    while max_ticks.map_or(true, |max| ticks < max) {
        let tick = Scheduler::<C>::next_tick(clock.now());
        debug!(%tick, "waiting for tick");
        clock.sleep_until(tick);

        scheduler.run(tick, ctx)?;
        let value = evaluator(tick, ctx).map_err(|source| SchedulerError::Evaluator { at: tick, source })?;
        tracker.update(value);
        ticks += 1;

        info!(%tick, value, "live tick");
    }

    Ok(ticks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Interval;
    use chrono::TimeZone;

    #[test]
    fn manual_clock_drives_minute_ticks() {
        let start = Utc.with_ymd_and_hms(2024, 6, 30, 12, 0, 30).unwrap();
        let mut clock = ManualClock::new(start);
        let mut scheduler: Scheduler<Vec<DateTime<Utc>>> = Scheduler::new();
        scheduler.add(Interval::minutes(2), |t, seen: &mut Vec<DateTime<Utc>>| {
            seen.push(t);
            Ok(())
        });

        let mut seen = Vec::new();
        let mut tracker = BacktestTracker::new(Interval::MINUTE);
        let ticks = run_live(
            &mut scheduler,
            &mut seen,
            &mut tracker,
            |_, seen: &mut Vec<DateTime<Utc>>| Ok(100.0 + seen.len() as f64),
            &mut clock,
            Some(4),
        )
        .unwrap();

        assert_eq!(ticks, 4);
        assert_eq!(clock.now(), start + chrono::Duration::seconds(210));
        // ticks at 12:01, 12:02, 12:03, 12:04; the 2m stage fires at :02 and :04
        assert_eq!(seen.len(), 2);
        assert_eq!(tracker.values(), &[100.0, 101.0, 101.0, 102.0]);
    }

    #[test]
    fn evaluator_error_stops_loop() {
        let mut clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let mut scheduler: Scheduler<()> = Scheduler::new();
        let mut tracker = BacktestTracker::new(Interval::MINUTE);

        let err = run_live(
            &mut scheduler,
            &mut (),
            &mut tracker,
            |_, _: &mut ()| Err("no price".into()),
            &mut clock,
            Some(3),
        )
        .unwrap_err();

        assert!(matches!(err, SchedulerError::Evaluator { .. }));
        assert!(tracker.is_empty());
    }
}
