//! Replay runner: wires config, store, strategy stages and tracker together.
//!
//! `run_replay()` is the single entry point used by the CLI, the window sweep
//! and the ranker. A run that aborts midway is still returned, with its
//! partial valuations and the failure message in `error`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use replaylab_core::analytics::{BacktestTracker, PerformanceReport};
use replaylab_core::data::{BarFetcher, CacheStats, DataError};
use replaylab_core::domain::{Interval, Pair};
use replaylab_core::engine::BoxError;
use replaylab_core::TimeSeriesStore;

use crate::config::{ConfigError, ReplayConfig, RunId};
use crate::ledger::{Fill, Ledger};
use crate::strategy::{build_scheduler, mark_price, ReplayContext};

/// Errors that prevent a replay from starting.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Data(#[from] DataError),
}

/// Current schema version for persisted artifacts.
pub const SCHEMA_VERSION: u32 = 1;

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Complete result of one replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayOutcome {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub run_id: RunId,
    pub strategy: String,
    pub pair: String,
    pub source: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub step: Interval,
    /// Time of the first valuation (`start` truncated to `step`).
    pub first_tick: DateTime<Utc>,
    pub initial_capital: f64,
    pub report: PerformanceReport,
    pub values: Vec<f64>,
    pub returns: Vec<f64>,
    pub fingerprint: String,
    pub fills: Vec<Fill>,
    pub final_balances: BTreeMap<String, f64>,
    pub cache: CacheStats,
    /// Set when the replay aborted; the series above stop at the failure.
    #[serde(default)]
    pub error: Option<String>,
}

impl ReplayOutcome {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    /// Valuation timestamps, one per entry of `values`.
    pub fn tick_times(&self) -> impl Iterator<Item = DateTime<Utc>> + '_ {
        (0..self.values.len()).map(move |i| self.first_tick + self.step.times(i))
    }
}

/// Fresh context holding the initial capital in the valuation currency.
pub fn build_context(config: &ReplayConfig, fetcher: Box<dyn BarFetcher>) -> ReplayContext {
    let mut ledger = Ledger::new(config.backtest.fee_rate);
    ledger.deposit(&config.backtest.quote, config.backtest.initial_capital);
    ReplayContext::new(TimeSeriesStore::from_boxed(fetcher), ledger)
}

/// Values the ledger in `quote`, pricing every other asset at its last `step` close.
pub fn evaluator(
    quote: String,
    step: Interval,
) -> impl FnMut(DateTime<Utc>, &mut ReplayContext) -> Result<f64, BoxError> {
    move |t: DateTime<Utc>, ctx: &mut ReplayContext| {
        let ReplayContext { store, ledger, .. } = ctx;
        let value = ledger.value_in(&quote, |asset| {
            let symbol = Pair::new(asset, quote.as_str()).symbol();
            match mark_price(store, &symbol, step, t) {
                Ok(Some(price)) => Ok(price),
                Ok(None) => Err(format!("no closed {step} bar for {symbol} before {t}")),
                Err(e) => Err(e.to_string()),
            }
        })?;
        Ok(value)
    }
}

/// Run a full replay of `config` against `fetcher`.
pub fn run_replay(config: &ReplayConfig, fetcher: Box<dyn BarFetcher>) -> Result<ReplayOutcome, RunError> {
    config.validate()?;

    let bt = &config.backtest;
    let source = fetcher.name().to_string();
    let mut scheduler = build_scheduler(config);
    let mut ctx = build_context(config, fetcher);

    info!(
        strategy = config.strategy.name(),
        pair = %config.strategy.pair(),
        %source,
        start = %bt.start,
        end = %bt.end,
        step = %bt.step,
        "starting replay"
    );

    let (tracker, error) = match scheduler.run_backtest(
        bt.start,
        bt.end,
        bt.step,
        &mut ctx,
        evaluator(bt.quote.clone(), bt.step),
    ) {
        Ok(tracker) => (tracker, None),
        Err(partial) => {
            warn!(error = %partial, "replay aborted");
            let message = partial.error.to_string();
            (partial.tracker, Some(message))
        }
    };

    Ok(outcome(config, source, &tracker, &ctx, error))
}

fn outcome(
    config: &ReplayConfig,
    source: String,
    tracker: &BacktestTracker,
    ctx: &ReplayContext,
    error: Option<String>,
) -> ReplayOutcome {
    let bt = &config.backtest;
    ReplayOutcome {
        schema_version: SCHEMA_VERSION,
        run_id: config.run_id(),
        strategy: config.strategy.name().to_string(),
        pair: config.strategy.pair().to_string(),
        source,
        start: bt.start,
        end: bt.end,
        step: bt.step,
        first_tick: bt.step.truncate(bt.start),
        initial_capital: bt.initial_capital,
        report: tracker.report(bt.min_return),
        values: tracker.values().to_vec(),
        returns: tracker.returns().to_vec(),
        fingerprint: tracker.fingerprint(),
        fills: ctx.ledger.fills().to_vec(),
        final_balances: ctx.ledger.balances().clone(),
        cache: ctx.store.stats(),
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replaylab_core::data::SyntheticFetcher;

    fn config() -> ReplayConfig {
        ReplayConfig::from_toml(
            r#"
[backtest]
start = "2024-03-01T00:00:00Z"
end = "2024-03-03T00:00:00Z"
step = "1h"
initial_capital = 1000.0

[data]
source = "synthetic"

[strategy]
type = "buy_and_hold"
pair = "BTC/USD"
"#,
        )
        .unwrap()
    }

    #[test]
    fn tick_times_follow_step() {
        let cfg = config();
        let fetcher = crate::data_source::build_fetcher(&cfg).unwrap();
        let outcome = run_replay(&cfg, fetcher).unwrap();

        let times: Vec<_> = outcome.tick_times().collect();
        assert_eq!(times.len(), 48);
        assert_eq!(times[0], cfg.backtest.start);
        assert_eq!(times[47] - times[46], chrono::Duration::hours(1));

        let replayed: Vec<_> = replaylab_core::engine::scheduler::replay_times(
            cfg.backtest.start,
            cfg.backtest.end,
            cfg.backtest.step,
        )
        .collect();
        assert_eq!(times, replayed);
    }

    #[test]
    fn flat_cash_is_not_priced() {
        let cfg = config();
        let mut ctx = build_context(
            &cfg,
            Box::new(SyntheticFetcher::new(cfg.backtest.end, cfg.backtest.end)),
        );
        let mut eval = evaluator("USD".into(), Interval::HOUR);
        assert_eq!(eval(cfg.backtest.start, &mut ctx).unwrap(), 1000.0);

        // Holding base with no history to price it is an evaluator error.
        ctx.ledger.deposit("BTC", 1.0);
        assert!(eval(cfg.backtest.start, &mut ctx).is_err());
    }
}
