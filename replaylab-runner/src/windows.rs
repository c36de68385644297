//! Parallel replays over consecutive, independent time windows.
//!
//! Each window gets its own fetcher, store and tracker, so windows share no
//! state and run on the rayon pool. Results come back in window order and can
//! be stitched into a single equity curve.

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use replaylab_core::analytics::BacktestTracker;
use replaylab_core::data::{BarFetcher, DataError};
use replaylab_core::domain::Interval;
use replaylab_core::engine::scheduler::replay_times;
use tracing::info;

use crate::config::ReplayConfig;
use crate::runner::{run_replay, ReplayOutcome, RunError};

/// `[start, end)` of one window, both aligned to the replay step.
pub type Window = (DateTime<Utc>, DateTime<Utc>);

/// Split the replay ticks of `[start, end)` into at most `n` contiguous windows
/// of whole steps. Earlier windows take the remainder, one extra step each.
pub fn split_windows(start: DateTime<Utc>, end: DateTime<Utc>, step: Interval, n: usize) -> Vec<Window> {
    let ticks = replay_times(start, end, step).count();
    if ticks == 0 || n == 0 {
        return Vec::new();
    }
    let n = n.min(ticks);
    let base = ticks / n;
    let extra = ticks % n;

    let mut windows = Vec::with_capacity(n);
    let mut from = step.truncate(start);
    for i in 0..n {
        let len = base + usize::from(i < extra);
        let to = from + step.times(len);
        windows.push((from, to));
        from = to;
    }
    windows
}

/// Replay `config` over every window in parallel; output order matches `windows`.
pub fn run_windows<F>(
    config: &ReplayConfig,
    windows: &[Window],
    make_fetcher: F,
) -> Vec<Result<ReplayOutcome, RunError>>
where
    F: Fn(&ReplayConfig) -> Result<Box<dyn BarFetcher>, DataError> + Sync,
{
    info!(windows = windows.len(), "running window sweep");
    windows
        .par_iter()
        .map(|&(start, end)| {
            let window_config = config.with_window(start, end);
            let fetcher = make_fetcher(&window_config)?;
            run_replay(&window_config, fetcher)
        })
        .collect()
}

/// Per-step returns of consecutive windows joined end to end.
///
/// Every window restarts from fresh capital, so the step across a window
/// boundary is recorded as a zero return.
pub fn stitch_returns(outcomes: &[ReplayOutcome]) -> Vec<f64> {
    let mut stitched = Vec::new();
    for (i, outcome) in outcomes.iter().enumerate() {
        if i > 0 && !outcome.values.is_empty() {
            stitched.push(0.0);
        }
        stitched.extend_from_slice(&outcome.returns);
    }
    stitched
}

/// A tracker fed with the compounded stitched curve, starting at `initial_value`.
pub fn stitched_tracker(outcomes: &[ReplayOutcome], step: Interval, initial_value: f64) -> BacktestTracker {
    let mut tracker = BacktestTracker::new(step);
    if outcomes.iter().all(|o| o.values.is_empty()) {
        return tracker;
    }

    let mut value = initial_value;
    tracker.update(value);
    for r in stitch_returns(outcomes) {
        value *= 1.0 + r;
        tracker.update(value);
    }
    tracker
}
