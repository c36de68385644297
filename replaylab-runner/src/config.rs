//! Replay configuration, loaded from TOML.
//!
//! ```toml
//! [backtest]
//! start = "2024-01-01T00:00:00Z"
//! end = "2024-03-01T00:00:00Z"
//! step = "1h"
//! initial_capital = 10000.0
//! quote = "USD"
//! fee_rate = 0.0026
//! min_return = 0.0
//!
//! [data]
//! source = "historical_csv"
//! data_root = "data"
//!
//! [strategy]
//! type = "ma_crossover"
//! pair = "BTC/USD"
//! interval = "1h"
//! fast = 12
//! slow = 48
//! ```
//!
//! Timestamps are quoted RFC 3339 strings.

use chrono::{DateTime, Utc};
use replaylab_core::domain::{Interval, Pair};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Unique identifier for a replay run (content-addressable hash).
pub type RunId = String;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReplayConfig {
    pub backtest: BacktestConfig,
    pub data: DataConfig,
    pub strategy: StrategyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BacktestConfig {
    pub start: DateTime<Utc>,
    /// Exclusive; only whole steps before `end.truncate(step)` are replayed.
    pub end: DateTime<Utc>,
    pub step: Interval,

    #[serde(default = "default_capital")]
    pub initial_capital: f64,

    /// Valuation currency; the strategy pair must be quoted in it.
    #[serde(default = "default_quote")]
    pub quote: String,

    #[serde(default = "default_fee_rate")]
    pub fee_rate: f64,

    /// Annual minimum acceptable return for the risk ratios.
    #[serde(default)]
    pub min_return: f64,
}

fn default_capital() -> f64 {
    10_000.0
}

fn default_quote() -> String {
    "USD".to_string()
}

fn default_fee_rate() -> f64 {
    0.0026
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum DataConfig {
    /// Deterministic generated bars; history starts at `origin`
    /// (default: 30 days before the backtest start).
    Synthetic {
        #[serde(default)]
        seed: u64,
        #[serde(default)]
        origin: Option<DateTime<Utc>>,
    },

    HistoricalCsv {
        data_root: PathBuf,
        #[serde(default)]
        name_pattern: Option<String>,
    },

    Kraken,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MaKind {
    #[default]
    Sma,
    Ema,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StrategyConfig {
    /// Buy with all quote on the first tick and hold.
    BuyAndHold { pair: Pair },

    /// Long while the fast average is above the slow one, flat otherwise.
    MaCrossover {
        pair: Pair,
        interval: Interval,
        fast: usize,
        slow: usize,
        #[serde(default)]
        ma: MaKind,
    },
}

impl StrategyConfig {
    pub fn pair(&self) -> &Pair {
        match self {
            StrategyConfig::BuyAndHold { pair } | StrategyConfig::MaCrossover { pair, .. } => pair,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StrategyConfig::BuyAndHold { .. } => "buy_and_hold",
            StrategyConfig::MaCrossover { .. } => "ma_crossover",
        }
    }

    /// Same strategy on another pair.
    pub fn with_pair(&self, pair: Pair) -> Self {
        let mut next = self.clone();
        match &mut next {
            StrategyConfig::BuyAndHold { pair: p } | StrategyConfig::MaCrossover { pair: p, .. } => {
                *p = pair
            }
        }
        next
    }
}

impl ReplayConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let b = &self.backtest;
        if b.step < Interval::BASE {
            return Err(ConfigError::Invalid(format!(
                "step {} is finer than the {} scheduler resolution",
                b.step,
                Interval::BASE
            )));
        }
        if b.step.as_nanos() % Interval::BASE.as_nanos() != 0 {
            return Err(ConfigError::Invalid(format!(
                "step {} is not a whole number of {} ticks",
                b.step,
                Interval::BASE
            )));
        }
        if b.step.truncate(b.end) <= b.step.truncate(b.start) {
            return Err(ConfigError::Invalid(format!(
                "backtest window [{}, {}) holds no whole {} step",
                b.start, b.end, b.step
            )));
        }
        if !(b.initial_capital.is_finite() && b.initial_capital > 0.0) {
            return Err(ConfigError::Invalid("initial_capital must be positive".into()));
        }
        if !(0.0..1.0).contains(&b.fee_rate) {
            return Err(ConfigError::Invalid(format!("fee_rate {} not in [0, 1)", b.fee_rate)));
        }

        let pair = self.strategy.pair();
        if pair.quote != b.quote {
            return Err(ConfigError::Invalid(format!(
                "pair {pair} is not quoted in valuation currency {}",
                b.quote
            )));
        }
        if let StrategyConfig::MaCrossover {
            fast, slow, interval, ..
        } = self.strategy
        {
            if interval < Interval::BASE || interval.as_nanos() % Interval::BASE.as_nanos() != 0 {
                return Err(ConfigError::Invalid(format!(
                    "ma_crossover interval {interval} is not a whole number of {} ticks",
                    Interval::BASE
                )));
            }
            if fast == 0 || slow <= fast {
                return Err(ConfigError::Invalid(format!(
                    "ma_crossover needs 0 < fast < slow, got fast={fast} slow={slow}"
                )));
            }
        }
        if let DataConfig::Synthetic {
            origin: Some(origin),
            ..
        } = self.data
        {
            if origin >= b.end {
                return Err(ConfigError::Invalid("synthetic origin must precede the backtest end".into()));
            }
        }
        Ok(())
    }

    /// Deterministic hash of the whole configuration.
    ///
    /// Two runs with identical configs share a run id.
    pub fn run_id(&self) -> RunId {
        let json = serde_json::to_string(self).expect("ReplayConfig serialization failed");
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }

    /// Copy restricted to `[start, end)`.
    pub fn with_window(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.backtest.start = start;
        next.backtest.end = end;
        next
    }

    pub fn with_pair(&self, pair: Pair) -> Self {
        let mut next = self.clone();
        next.strategy = self.strategy.with_pair(pair);
        next
    }
}
