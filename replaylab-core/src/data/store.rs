//! In-memory time-series cache with fetch-on-miss.
//!
//! Layout: `symbol -> interval -> Vec<Bar>`, each vector strictly increasing by
//! `start_time` and aligned to its interval.
//!
//! Features:
//! - Range queries answered by binary search over the cached series
//! - Fetch-on-miss through an injected `BarFetcher`
//! - Two-pointer merge of overlapping fetches (cached entry wins on collision)
//! - Point-price lookups answered from any cached granularity, smallest first
//! - All-or-nothing updates: a failed fetch or rejected batch leaves the cache untouched

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tracing::{debug, info};

use super::provider::{BarFetcher, DataError};
use crate::domain::{Bar, Interval};

/// Errors from store queries.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("fetch failed for {symbol}@{interval}: {source}")]
    Fetch {
        symbol: String,
        interval: Interval,
        #[source]
        source: DataError,
    },

    #[error(
        "insufficient data for {symbol}@{interval}: requested {requested} bars before {before}, {available} available"
    )]
    InsufficientData {
        symbol: String,
        interval: Interval,
        requested: usize,
        available: usize,
        before: DateTime<Utc>,
    },

    #[error("cache invariant violated for {symbol}@{interval}: {reason}")]
    CacheInvariant {
        symbol: String,
        interval: Interval,
        reason: String,
    },
}

/// Counters describing how the cache has been used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub fetches: u64,
    pub bars_fetched: u64,
}

/// Per-(symbol, interval) bar cache backed by a fetcher.
///
/// Single-owner: no internal locking. Use one store per evaluation loop.
pub struct TimeSeriesStore {
    fetcher: Box<dyn BarFetcher>,
    cache: HashMap<String, BTreeMap<Interval, Vec<Bar>>>,
    stats: CacheStats,
}

impl TimeSeriesStore {
    pub fn new(fetcher: impl BarFetcher + 'static) -> Self {
        Self::from_boxed(Box::new(fetcher))
    }

    pub fn from_boxed(fetcher: Box<dyn BarFetcher>) -> Self {
        Self {
            fetcher,
            cache: HashMap::new(),
            stats: CacheStats::default(),
        }
    }

    pub fn fetcher_name(&self) -> &str {
        self.fetcher.name()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Bars with `start_time >= since.truncate(interval)`, fetching on a miss.
    ///
    /// A hit requires the cached series to start before `since + interval` and
    /// to hold at least one bar at or after `since`.
    pub fn get_since(
        &mut self,
        symbol: &str,
        interval: Interval,
        since: DateTime<Utc>,
    ) -> Result<&[Bar], StoreError> {
        let since = interval.truncate(since);

        if let Some(idx) = self.cached_start(symbol, interval, since) {
            self.stats.hits += 1;
            debug!(symbol, %interval, %since, "cache hit");
            return Ok(&self.series(symbol, interval)[idx..]);
        }

        self.stats.misses += 1;
        debug!(symbol, %interval, %since, "cache miss");
        self.fetch_and_merge(symbol, interval, since)?;

        let bars = self.series(symbol, interval);
        let idx = bars.partition_point(|b| b.start_time < since);
        Ok(&bars[idx..])
    }

    /// The `n` bars immediately before `t.truncate(interval)`.
    ///
    /// Served from `get_since(t - n * interval)`. A short cached answer triggers
    /// one refresh fetch; if the source still cannot supply `n` bars the call
    /// fails with `InsufficientData`.
    pub fn get_n_before(
        &mut self,
        symbol: &str,
        interval: Interval,
        n: usize,
        t: DateTime<Utc>,
    ) -> Result<&[Bar], StoreError> {
        if n == 0 {
            return Ok(&[]);
        }

        let before = interval.truncate(t);
        let since = before - interval.times(n);

        let fetches = self.stats.fetches;
        let mut available = count_before(self.get_since(symbol, interval, since)?, before);

        if available < n && self.stats.fetches == fetches {
            // The cached series was stale; the source may have newer bars.
            self.fetch_and_merge(symbol, interval, since)?;
            available = count_before(self.suffix(symbol, interval, since), before);
        }

        if available < n {
            return Err(StoreError::InsufficientData {
                symbol: symbol.to_string(),
                interval,
                requested: n,
                available,
                before,
            });
        }

        Ok(&self.suffix(symbol, interval, since)[..n])
    }

    /// Close of the most recently closed bar before `t`.
    ///
    /// Any cached granularity may answer (smallest interval first); otherwise
    /// the last one-minute bar is fetched and cached.
    pub fn get_price_at(&mut self, symbol: &str, t: DateTime<Utc>) -> Result<f64, StoreError> {
        if let Some(price) = self.cached_price_at(symbol, t) {
            return Ok(price);
        }

        let bars = self.get_n_before(symbol, Interval::BASE, 1, t)?;
        bars.last()
            .map(|b| b.close)
            .ok_or_else(|| StoreError::InsufficientData {
                symbol: symbol.to_string(),
                interval: Interval::BASE,
                requested: 1,
                available: 0,
                before: Interval::BASE.truncate(t),
            })
    }

    /// Cache-only point-price lookup; never fetches.
    pub fn cached_price_at(&self, symbol: &str, t: DateTime<Utc>) -> Option<f64> {
        let by_interval = self.cache.get(symbol)?;
        by_interval.iter().find_map(|(interval, bars)| {
            let prior = interval.truncate(t) - interval.as_duration();
            bars.binary_search_by_key(&prior, |b| b.start_time)
                .ok()
                .map(|i| bars[i].close)
        })
    }

    /// Merge a sorted, duplicate-free batch into the cached series.
    ///
    /// Returns the number of bars that were not already cached. An unsorted or
    /// misaligned batch is rejected without touching the cache.
    pub fn set(&mut self, symbol: &str, interval: Interval, bars: Vec<Bar>) -> Result<usize, StoreError> {
        validate_batch(&bars, interval).map_err(|reason| StoreError::CacheInvariant {
            symbol: symbol.to_string(),
            interval,
            reason,
        })?;

        if bars.is_empty() {
            return Ok(0);
        }

        let series = self
            .cache
            .entry(symbol.to_string())
            .or_default()
            .entry(interval)
            .or_default();

        let before = series.len();
        if series.is_empty() {
            *series = bars;
        } else {
            let merged = merge_bars(series, &bars);
            *series = merged;
        }

        debug_assert!(
            series.windows(2).all(|w| w[0].start_time < w[1].start_time),
            "merged series for {symbol}@{interval} is not strictly increasing"
        );

        Ok(series.len() - before)
    }

    /// Cached bars for a series (empty if nothing is cached).
    pub fn series(&self, symbol: &str, interval: Interval) -> &[Bar] {
        self.cache
            .get(symbol)
            .and_then(|by_interval| by_interval.get(&interval))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Cached intervals for a symbol, ascending.
    pub fn intervals(&self, symbol: &str) -> Vec<Interval> {
        self.cache
            .get(symbol)
            .map(|by_interval| by_interval.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Cached symbols, sorted.
    pub fn symbols(&self) -> Vec<&str> {
        let mut symbols: Vec<&str> = self.cache.keys().map(String::as_str).collect();
        symbols.sort_unstable();
        symbols
    }

    /// Drop every cached series and reset the counters.
    pub fn clear(&mut self) {
        self.cache.clear();
        self.stats = CacheStats::default();
    }

    fn cached_start(&self, symbol: &str, interval: Interval, since: DateTime<Utc>) -> Option<usize> {
        let bars = self.cache.get(symbol)?.get(&interval)?;
        let first = bars.first()?;
        if first.start_time >= since + interval.as_duration() {
            return None;
        }
        let idx = bars.partition_point(|b| b.start_time < since);
        (idx < bars.len()).then_some(idx)
    }

    fn suffix(&self, symbol: &str, interval: Interval, since: DateTime<Utc>) -> &[Bar] {
        let bars = self.series(symbol, interval);
        let idx = bars.partition_point(|b| b.start_time < since);
        &bars[idx..]
    }

    fn fetch_and_merge(
        &mut self,
        symbol: &str,
        interval: Interval,
        since: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let bars = self
            .fetcher
            .fetch_bars_since(symbol, interval, since)
            .map_err(|source| StoreError::Fetch {
                symbol: symbol.to_string(),
                interval,
                source,
            })?;

        self.stats.fetches += 1;
        self.stats.bars_fetched += bars.len() as u64;
        info!(
            fetcher = self.fetcher.name(),
            symbol,
            %interval,
            %since,
            bars = bars.len(),
            "fetched bars"
        );

        self.set(symbol, interval, bars)
    }
}

/// Merge two strictly increasing bar sequences into their sorted union.
///
/// On equal `start_time` the entry from `cached` is kept.
pub fn merge_bars(cached: &[Bar], incoming: &[Bar]) -> Vec<Bar> {
    let mut merged = Vec::with_capacity(cached.len() + incoming.len());
    let (mut i, mut j) = (0, 0);

    while i < cached.len() && j < incoming.len() {
        let (a, b) = (&cached[i], &incoming[j]);
        if a.start_time < b.start_time {
            merged.push(*a);
            i += 1;
        } else if b.start_time < a.start_time {
            merged.push(*b);
            j += 1;
        } else {
            merged.push(*a);
            i += 1;
            j += 1;
        }
    }

    merged.extend_from_slice(&cached[i..]);
    merged.extend_from_slice(&incoming[j..]);
    merged
}

fn validate_batch(bars: &[Bar], interval: Interval) -> Result<(), String> {
    if let Some(bar) = bars.iter().find(|b| !interval.is_aligned(b.start_time)) {
        return Err(format!("bar at {} is not aligned to {interval}", bar.start_time));
    }
    if let Some(w) = bars.windows(2).find(|w| w[0].start_time >= w[1].start_time) {
        return Err(format!(
            "bars out of order: {} followed by {}",
            w[0].start_time, w[1].start_time
        ));
    }
    Ok(())
}

fn count_before(bars: &[Bar], before: DateTime<Utc>) -> usize {
    bars.partition_point(|b| b.start_time < before)
}
