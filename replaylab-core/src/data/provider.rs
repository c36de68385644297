//! Fetch capability and structured error types.
//!
//! The `BarFetcher` trait abstracts over data sources (Kraken's public OHLC
//! endpoint, historical CSV files, synthetic bars) so the store can swap
//! implementations and tests can mock them.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{Bar, Interval};

/// Structured error types for data operations.
///
/// These are designed to be displayable in CLI contexts.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("hard stop: data provider has blocked requests (circuit breaker tripped)")]
    CircuitBreakerTripped,

    #[error("historical file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed record in {path} at line {line}: {reason}")]
    Parse {
        path: String,
        line: u64,
        reason: String,
    },

    #[error("data error: {0}")]
    Other(String),
}

/// Trait for bar sources.
///
/// Implementations return bars sorted ascending by `start_time`, covering
/// `[since, now)`. They may legitimately return fewer bars than requested when
/// the upstream source lacks history; the store treats the answer as
/// authoritative and does not retry.
pub trait BarFetcher: Send {
    /// Human-readable name of this fetcher.
    fn name(&self) -> &str;

    fn fetch_bars_since(
        &self,
        symbol: &str,
        interval: Interval,
        since: DateTime<Utc>,
    ) -> Result<Vec<Bar>, DataError>;
}

impl<F: BarFetcher + ?Sized> BarFetcher for Box<F> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn fetch_bars_since(
        &self,
        symbol: &str,
        interval: Interval,
        since: DateTime<Utc>,
    ) -> Result<Vec<Bar>, DataError> {
        (**self).fetch_bars_since(symbol, interval, since)
    }
}
