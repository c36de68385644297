//! ReplayLab Core: market-bar cache, interval scheduler and performance tracker.
//!
//! This crate contains the heart of the replay engine:
//! - Domain types (bars, intervals, series keys, pairs)
//! - Time-series store with fetch-on-miss and overlap-aware merging
//! - Bar fetchers (historical CSV, Kraken public OHLC, synthetic)
//! - Interval-driven scheduler with live and deterministic backtest modes
//! - Incremental performance tracker (drawdown, volatility, risk ratios)
//! - Streaming indicators composed through `Chain`

pub mod analytics;
pub mod data;
pub mod domain;
pub mod engine;
pub mod indicators;

pub use analytics::{BacktestTracker, PerformanceReport, RunningStats};
pub use data::{BarFetcher, DataError, StoreError, TimeSeriesStore};
pub use domain::{Bar, Interval, Pair, SeriesKey};
pub use engine::{Blackboard, BoxError, PartialBacktest, Scheduler, SchedulerError};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: the store, tracker and scheduler can be moved to a
    /// worker thread (one replay per rayon task).
    #[allow(dead_code)]
    fn assert_send() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<domain::Bar>();
        require_sync::<domain::Bar>();
        require_send::<domain::Interval>();
        require_sync::<domain::Interval>();
        require_send::<domain::SeriesKey>();
        require_sync::<domain::SeriesKey>();

        require_send::<TimeSeriesStore>();
        require_send::<BacktestTracker>();
        require_sync::<BacktestTracker>();
        require_send::<RunningStats>();
        require_send::<PerformanceReport>();
        require_send::<Blackboard>();
        require_send::<Scheduler<Blackboard>>();
        require_send::<SchedulerError>();
        require_send::<PartialBacktest>();

        require_send::<data::HistoricalCsvFetcher>();
        require_send::<data::KrakenFetcher>();
        require_send::<data::SyntheticFetcher>();
        require_sync::<data::CircuitBreaker>();

        require_send::<indicators::Sma>();
        require_send::<indicators::Chain<indicators::Atr, indicators::Ema>>();
    }

    /// Stages see the store only through the context they are handed.
    #[test]
    fn stage_signature_takes_context_by_mut_ref() {
        fn _check(stage: &mut engine::Stage<Blackboard>, board: &mut Blackboard) -> Result<(), BoxError> {
            stage(chrono::Utc::now(), board)
        }
    }
}
