//! Kraken public OHLC source.
//!
//! Calls `GET /0/public/OHLC?pair=..&interval=<minutes>&since=<unix-1>`. Rows are
//! `[time, open, high, low, close, vwap, volume, count]` with prices as strings.
//! The final row is the bar still forming and is discarded. Transient failures
//! are retried with exponential backoff behind a circuit breaker.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::circuit_breaker::CircuitBreaker;
use super::provider::{BarFetcher, DataError};
use crate::domain::{Bar, Interval};

pub const KRAKEN_API: &str = "https://api.kraken.com";

#[derive(Debug, Deserialize)]
struct OhlcResponse {
    #[serde(default)]
    error: Vec<String>,
    #[serde(default)]
    result: HashMap<String, Value>,
}

pub struct KrakenFetcher {
    client: reqwest::blocking::Client,
    base_url: String,
    circuit_breaker: Arc<CircuitBreaker>,
    max_retries: u32,
    base_delay: Duration,
}

impl KrakenFetcher {
    pub fn new(circuit_breaker: Arc<CircuitBreaker>) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(concat!("replaylab/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DataError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: KRAKEN_API.to_string(),
            circuit_breaker,
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retries(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.base_delay = base_delay;
        self
    }

    /// Kraken pair name: `BTC/USD` is sent as `BTCUSD`.
    pub fn pair_param(symbol: &str) -> String {
        symbol.replace('/', "")
    }

    fn ohlc_url(&self, symbol: &str, interval: Interval, since: DateTime<Utc>) -> String {
        format!(
            "{}/0/public/OHLC?pair={}&interval={}&since={}",
            self.base_url,
            Self::pair_param(symbol),
            interval.as_minutes(),
            since.timestamp() - 1
        )
    }

    fn fetch_with_retry(
        &self,
        symbol: &str,
        interval: Interval,
        since: DateTime<Utc>,
    ) -> Result<Vec<Bar>, DataError> {
        self.circuit_breaker.check()?;

        let url = self.ohlc_url(symbol, interval, since);
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.base_delay * 2u32.pow(attempt - 1);
                debug!(symbol, attempt, ?delay, "retrying Kraken OHLC request");
                std::thread::sleep(delay);
            }

            self.circuit_breaker.check()?;

            let resp = match self.client.get(&url).send() {
                Ok(resp) => resp,
                Err(e) if e.is_connect() || e.is_timeout() => {
                    self.circuit_breaker.record_failure();
                    last_error = Some(DataError::NetworkUnreachable(e.to_string()));
                    continue;
                }
                Err(e) => return Err(DataError::NetworkUnreachable(e.to_string())),
            };

            let status = resp.status();
            if status == reqwest::StatusCode::FORBIDDEN {
                self.circuit_breaker.trip();
                return Err(DataError::CircuitBreakerTripped);
            }
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                self.circuit_breaker.record_failure();
                last_error = Some(DataError::Provider(format!("HTTP {status} for {symbol}")));
                continue;
            }
            if !status.is_success() {
                return Err(DataError::Provider(format!("HTTP {status} for {symbol}")));
            }

            let body: OhlcResponse = resp.json().map_err(|e| {
                DataError::ResponseFormatChanged(format!("failed to decode OHLC for {symbol}: {e}"))
            })?;

            match parse_response(symbol, body) {
                Ok(bars) => {
                    self.circuit_breaker.record_success();
                    return Ok(bars);
                }
                Err(err @ DataError::RateLimited { .. }) => {
                    warn!(symbol, "Kraken rate limit hit");
                    self.circuit_breaker.record_failure();
                    last_error = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_error.unwrap_or_else(|| DataError::Other("max retries exceeded".into())))
    }
}

impl BarFetcher for KrakenFetcher {
    fn name(&self) -> &str {
        "kraken"
    }

    fn fetch_bars_since(
        &self,
        symbol: &str,
        interval: Interval,
        since: DateTime<Utc>,
    ) -> Result<Vec<Bar>, DataError> {
        let bars = self.fetch_with_retry(symbol, interval, since)?;
        debug!(symbol, %interval, %since, bars = bars.len(), "Kraken OHLC");
        Ok(bars)
    }
}

fn parse_response(symbol: &str, resp: OhlcResponse) -> Result<Vec<Bar>, DataError> {
    if let Some(first) = resp.error.first() {
        return Err(classify_api_error(symbol, first));
    }

    // The result is keyed by Kraken's canonical pair name, next to a `last` cursor.
    let rows = resp
        .result
        .into_iter()
        .find(|(key, _)| key != "last")
        .map(|(_, rows)| rows)
        .ok_or_else(|| DataError::SymbolNotFound {
            symbol: symbol.to_string(),
        })?;

    let rows = rows
        .as_array()
        .ok_or_else(|| DataError::ResponseFormatChanged("OHLC result is not an array".into()))?;

    let closed = rows.len().saturating_sub(1);
    rows[..closed].iter().map(parse_row).collect()
}

fn classify_api_error(symbol: &str, message: &str) -> DataError {
    if message.contains("Rate limit") || message.contains("Too many requests") {
        DataError::RateLimited {
            retry_after_secs: 60,
        }
    } else if message.contains("Unknown asset pair") {
        DataError::SymbolNotFound {
            symbol: symbol.to_string(),
        }
    } else {
        DataError::Provider(message.to_string())
    }
}

fn parse_row(row: &Value) -> Result<Bar, DataError> {
    let fields = row
        .as_array()
        .filter(|f| f.len() >= 7)
        .ok_or_else(|| DataError::ResponseFormatChanged(format!("malformed OHLC row: {row}")))?;

    let epoch = fields[0]
        .as_i64()
        .or_else(|| fields[0].as_f64().map(|f| f as i64))
        .ok_or_else(|| DataError::ResponseFormatChanged(format!("bad OHLC time: {}", fields[0])))?;
    let start_time = DateTime::from_timestamp(epoch, 0)
        .ok_or_else(|| DataError::ResponseFormatChanged(format!("OHLC time {epoch} out of range")))?;

    Ok(Bar {
        start_time,
        open: number(&fields[1])?,
        high: number(&fields[2])?,
        low: number(&fields[3])?,
        close: number(&fields[4])?,
        volume: number(&fields[6])?,
    })
}

fn number(value: &Value) -> Result<f64, DataError> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
    .ok_or_else(|| DataError::ResponseFormatChanged(format!("bad OHLC number: {value}")))
}
