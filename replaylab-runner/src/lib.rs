//! ReplayLab Runner: replay orchestration on top of `replaylab-core`.
//!
//! This crate provides:
//! - TOML replay configuration with a content-addressed run id
//! - Fetcher construction for synthetic, historical CSV and Kraken data
//! - A paper-trading ledger and strategies built as scheduler stages
//! - The single-replay runner and rayon-parallel window sweeps
//! - Cross-sectional ranking of replay results
//! - JSON / CSV / Markdown artifact export

pub mod config;
pub mod data_source;
pub mod export;
pub mod ledger;
pub mod ranker;
pub mod runner;
pub mod strategy;
pub mod windows;

pub use config::{ConfigError, DataConfig, MaKind, ReplayConfig, RunId, StrategyConfig};
pub use data_source::build_fetcher;
pub use ledger::{Fill, Ledger, LedgerError, Side};
pub use ranker::{Ranker, RankerRow};
pub use runner::{build_context, evaluator, run_replay, ReplayOutcome, RunError, SCHEMA_VERSION};
pub use strategy::{build_scheduler, ReplayContext};
pub use windows::{run_windows, split_windows, stitch_returns, stitched_tracker, Window};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn outcome_is_send_sync() {
        assert_send::<ReplayOutcome>();
        assert_sync::<ReplayOutcome>();
    }

    #[test]
    fn config_types_are_send_sync() {
        assert_send::<ReplayConfig>();
        assert_sync::<ReplayConfig>();
        assert_send::<RunError>();
    }

    #[test]
    fn replay_context_moves_to_workers() {
        assert_send::<ReplayContext>();
        assert_send::<replaylab_core::Scheduler<ReplayContext>>();
        assert_send::<Ledger>();
        assert_sync::<Ranker>();
    }
}
