//! Fetcher construction from the `[data]` config section.

use chrono::Duration;
use replaylab_core::data::{
    BarFetcher, CircuitBreaker, DataError, HistoricalCsvFetcher, KrakenFetcher, SyntheticFetcher,
};
use std::sync::Arc;

use crate::config::{DataConfig, ReplayConfig};

/// History available before the backtest start when no synthetic origin is given.
pub const SYNTHETIC_LOOKBACK_DAYS: i64 = 30;

pub fn build_fetcher(config: &ReplayConfig) -> Result<Box<dyn BarFetcher>, DataError> {
    let fetcher: Box<dyn BarFetcher> = match &config.data {
        DataConfig::Synthetic { seed, origin } => {
            let origin =
                origin.unwrap_or(config.backtest.start - Duration::days(SYNTHETIC_LOOKBACK_DAYS));
            Box::new(SyntheticFetcher::new(origin, config.backtest.end).with_seed(*seed))
        }
        DataConfig::HistoricalCsv {
            data_root,
            name_pattern,
        } => {
            let fetcher = HistoricalCsvFetcher::new(data_root);
            Box::new(match name_pattern {
                Some(pattern) => fetcher.with_name_pattern(pattern.as_str()),
                None => fetcher,
            })
        }
        DataConfig::Kraken => Box::new(KrakenFetcher::new(Arc::new(CircuitBreaker::for_exchange()))?),
    };
    Ok(fetcher)
}
