//! Market data: fetch capability, bar sources and the time-series cache.

pub mod circuit_breaker;
pub mod historical;
pub mod kraken;
pub mod provider;
pub mod store;
pub mod synthetic;

pub use circuit_breaker::{BreakerState, CircuitBreaker};
pub use historical::HistoricalCsvFetcher;
pub use kraken::KrakenFetcher;
pub use provider::{BarFetcher, DataError};
pub use store::{merge_bars, CacheStats, StoreError, TimeSeriesStore};
pub use synthetic::SyntheticFetcher;
