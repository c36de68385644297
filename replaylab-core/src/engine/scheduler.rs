//! Scheduler: fires registered stages at aligned interval boundaries.
//!
//! Live mode calls `run(now)` once per minute. Replay mode walks simulated
//! time from `start` to `end` in fixed steps with no wall-clock delay; the
//! backtest variant additionally values the portfolio after every step and
//! feeds a `BacktestTracker`. The first failing stage (or evaluator) aborts the
//! run.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::analytics::BacktestTracker;
use crate::domain::Interval;

/// Error type returned by stages and evaluators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A unit of work run at every boundary of its interval.
pub type Stage<C> = Box<dyn FnMut(DateTime<Utc>, &mut C) -> Result<(), BoxError> + Send>;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("stage on {interval} failed at {at}: {source}")]
    Stage {
        interval: Interval,
        at: DateTime<Utc>,
        #[source]
        source: BoxError,
    },

    #[error("evaluator failed at {at}: {source}")]
    Evaluator {
        at: DateTime<Utc>,
        #[source]
        source: BoxError,
    },
}

impl SchedulerError {
    /// Simulated time at which the run aborted.
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            SchedulerError::Stage { at, .. } | SchedulerError::Evaluator { at, .. } => *at,
        }
    }
}

/// An aborted backtest: the tracker holds every valuation recorded before the failure.
#[derive(Debug, Error)]
#[error("backtest aborted after {observed} valuations: {error}", observed = .tracker.len())]
pub struct PartialBacktest {
    pub tracker: BacktestTracker,
    #[source]
    pub error: SchedulerError,
}

pub struct Scheduler<C> {
    stages: BTreeMap<Interval, Vec<Stage<C>>>,
}

impl<C> Default for Scheduler<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Scheduler<C> {
    pub fn new() -> Self {
        Self {
            stages: BTreeMap::new(),
        }
    }

    /// Register `stage` to run at every boundary of `interval`.
    ///
    /// Stages sharing an interval run in registration order.
    pub fn add<F>(&mut self, interval: Interval, stage: F) -> &mut Self
    where
        F: FnMut(DateTime<Utc>, &mut C) -> Result<(), BoxError> + Send + 'static,
    {
        self.stages.entry(interval).or_default().push(Box::new(stage));
        self
    }

    /// Registered intervals, ascending.
    pub fn intervals(&self) -> impl Iterator<Item = Interval> + '_ {
        self.stages.keys().copied()
    }

    pub fn stage_count(&self) -> usize {
        self.stages.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Intervals that fire at `now` (after truncation to one minute), ascending.
    pub fn due_intervals(&self, now: DateTime<Utc>) -> Vec<Interval> {
        let t = Interval::BASE.truncate(now);
        self.intervals().filter(|i| i.truncate(t) == t).collect()
    }

    /// The first one-minute boundary strictly after `now`.
    pub fn next_tick(now: DateTime<Utc>) -> DateTime<Utc> {
        Interval::BASE.truncate(now) + Interval::BASE.as_duration()
    }

    /// Run one tick: every due interval's stages, with the resolved tick time.
    pub fn run(&mut self, now: DateTime<Utc>, ctx: &mut C) -> Result<(), SchedulerError> {
        let t = Interval::BASE.truncate(now);

        for (&interval, stages) in self.stages.iter_mut() {
            if interval.truncate(t) != t {
                continue;
            }
            for stage in stages.iter_mut() {
                if let Err(source) = stage(t, ctx) {
                    warn!(%interval, at = %t, error = %source, "stage failed");
                    return Err(SchedulerError::Stage {
                        interval,
                        at: t,
                        source,
                    });
                }
            }
        }
        Ok(())
    }

    /// Replay ticks `start.truncate(step), +step, ...` strictly before
    /// `end.truncate(step)`. Returns the number of ticks run.
    pub fn run_between(
        &mut self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Interval,
        ctx: &mut C,
    ) -> Result<usize, SchedulerError> {
        let mut ticks = 0;
        for t in replay_times(start, end, step) {
            self.run(t, ctx)?;
            ticks += 1;
        }
        debug!(ticks, %step, "replay finished");
        Ok(ticks)
    }

    /// `run_between`, valuing the context after every tick.
    ///
    /// On failure the tracker populated so far is returned with the error.
    pub fn run_backtest<E>(
        &mut self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Interval,
        ctx: &mut C,
        mut evaluator: E,
    ) -> Result<BacktestTracker, PartialBacktest>
    where
        E: FnMut(DateTime<Utc>, &mut C) -> Result<f64, BoxError>,
    {
        let mut tracker = BacktestTracker::new(step);

        for t in replay_times(start, end, step) {
            if let Err(error) = self.run(t, ctx) {
                return Err(PartialBacktest { tracker, error });
            }
            match evaluator(t, ctx) {
                Ok(value) => tracker.update(value),
                Err(source) => {
                    warn!(at = %t, error = %source, "evaluator failed");
                    return Err(PartialBacktest {
                        tracker,
                        error: SchedulerError::Evaluator { at: t, source },
                    });
                }
            }
        }

        info!(
            %step,
            observations = tracker.len(),
            total_return = tracker.total_return(),
            max_drawdown = tracker.max_drawdown(),
            "backtest finished"
        );
        Ok(tracker)
    }
}

/// Replay clock: aligned, strictly increasing, never past the last whole step.
pub fn replay_times(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    step: Interval,
) -> impl Iterator<Item = DateTime<Utc>> {
    let first = step.truncate(start);
    let stop = step.truncate(end);
    let delta = step.as_duration();
    std::iter::successors(Some(first), move |&t| Some(t + delta)).take_while(move |&t| t < stop)
}
