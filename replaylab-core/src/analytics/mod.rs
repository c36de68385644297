//! Incremental performance analytics over a replayed valuation series.

pub mod tracker;

pub use tracker::{BacktestTracker, PerformanceReport, RunningStats};
