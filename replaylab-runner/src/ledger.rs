//! Paper-trading ledger: asset balances and market fills.
//!
//! Orders execute immediately at the supplied price. The fee is taken from
//! the asset received, so a buy of `q` quote credits `q / price * (1 - fee)`
//! base.

use chrono::{DateTime, Utc};
use replaylab_core::domain::Pair;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum LedgerError {
    #[error("invalid price {price} for {pair}")]
    InvalidPrice { pair: String, price: f64 },

    #[error("no price for {asset} in {quote}: {reason}")]
    MissingPrice {
        asset: String,
        quote: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

/// One executed market order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub at: DateTime<Utc>,
    pub pair: Pair,
    pub side: Side,
    pub price: f64,
    /// Base amount traded before fees.
    pub base_qty: f64,
    /// Quote amount traded before fees.
    pub quote_qty: f64,
    /// Fee charged, in the received asset.
    pub fee: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ledger {
    balances: BTreeMap<String, f64>,
    fee_rate: f64,
    fills: Vec<Fill>,
}

impl Ledger {
    pub fn new(fee_rate: f64) -> Self {
        Self {
            balances: BTreeMap::new(),
            fee_rate: fee_rate.clamp(0.0, 1.0),
            fills: Vec::new(),
        }
    }

    pub fn deposit(&mut self, asset: &str, amount: f64) {
        *self.balances.entry(asset.to_string()).or_insert(0.0) += amount;
    }

    pub fn balance(&self, asset: &str) -> f64 {
        self.balances.get(asset).copied().unwrap_or(0.0)
    }

    pub fn balances(&self) -> &BTreeMap<String, f64> {
        &self.balances
    }

    pub fn fee_rate(&self) -> f64 {
        self.fee_rate
    }

    pub fn fills(&self) -> &[Fill] {
        &self.fills
    }

    /// Spend `fraction` of the quote balance on base at `price`.
    ///
    /// Returns `Ok(None)` when there is nothing to spend.
    pub fn market_buy(
        &mut self,
        pair: &Pair,
        fraction: f64,
        price: f64,
        at: DateTime<Utc>,
    ) -> Result<Option<Fill>, LedgerError> {
        check_price(pair, price)?;
        let quote_qty = fraction.clamp(0.0, 1.0) * self.balance(&pair.quote);
        if quote_qty <= 0.0 {
            return Ok(None);
        }
        let base_qty = quote_qty / price;
        let fee = base_qty * self.fee_rate;

        self.deposit(&pair.quote, -quote_qty);
        self.deposit(&pair.base, base_qty - fee);
        Ok(Some(self.record(pair, Side::Buy, price, base_qty, quote_qty, fee, at)))
    }

    /// Sell `fraction` of the base balance for quote at `price`.
    pub fn market_sell(
        &mut self,
        pair: &Pair,
        fraction: f64,
        price: f64,
        at: DateTime<Utc>,
    ) -> Result<Option<Fill>, LedgerError> {
        check_price(pair, price)?;
        let base_qty = fraction.clamp(0.0, 1.0) * self.balance(&pair.base);
        if base_qty <= 0.0 {
            return Ok(None);
        }
        let quote_qty = base_qty * price;
        let fee = quote_qty * self.fee_rate;

        self.deposit(&pair.base, -base_qty);
        self.deposit(&pair.quote, quote_qty - fee);
        Ok(Some(self.record(pair, Side::Sell, price, base_qty, quote_qty, fee, at)))
    }

    #[allow(clippy::too_many_arguments)]
    fn record(
        &mut self,
        pair: &Pair,
        side: Side,
        price: f64,
        base_qty: f64,
        quote_qty: f64,
        fee: f64,
        at: DateTime<Utc>,
    ) -> Fill {
        let fill = Fill {
            at,
            pair: pair.clone(),
            side,
            price,
            base_qty,
            quote_qty,
            fee,
        };
        self.fills.push(fill.clone());
        fill
    }

    /// Total holdings expressed in `quote`.
    ///
    /// `price_of(asset)` must return the price of one unit of `asset` in
    /// `quote`; it is not called for `quote` itself or for zero balances.
    pub fn value_in<F, E>(&self, quote: &str, mut price_of: F) -> Result<f64, LedgerError>
    where
        F: FnMut(&str) -> Result<f64, E>,
        E: std::fmt::Display,
    {
        let mut total = 0.0;
        for (asset, &amount) in &self.balances {
            if asset == quote {
                total += amount;
                continue;
            }
            if amount == 0.0 {
                continue;
            }
            let price = price_of(asset).map_err(|e| LedgerError::MissingPrice {
                asset: asset.clone(),
                quote: quote.to_string(),
                reason: e.to_string(),
            })?;
            total += amount * price;
        }
        Ok(total)
    }
}

fn check_price(pair: &Pair, price: f64) -> Result<(), LedgerError> {
    if price.is_finite() && price > 0.0 {
        Ok(())
    } else {
        Err(LedgerError::InvalidPrice {
            pair: pair.to_string(),
            price,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const EPS: f64 = 1e-9;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn btc() -> Pair {
        Pair::new("BTC", "USD")
    }

    #[test]
    fn buy_takes_fee_from_base() {
        let mut ledger = Ledger::new(0.01);
        ledger.deposit("USD", 1_000.0);

        let fill = ledger.market_buy(&btc(), 0.5, 100.0, at()).unwrap().unwrap();
        assert_eq!(fill.side, Side::Buy);
        assert!((fill.quote_qty - 500.0).abs() < EPS);
        assert!((fill.base_qty - 5.0).abs() < EPS);
        assert!((ledger.balance("USD") - 500.0).abs() < EPS);
        assert!((ledger.balance("BTC") - 4.95).abs() < EPS);
    }

    #[test]
    fn sell_takes_fee_from_quote() {
        let mut ledger = Ledger::new(0.01);
        ledger.deposit("BTC", 2.0);

        ledger.market_sell(&btc(), 1.0, 200.0, at()).unwrap();
        assert!(ledger.balance("BTC").abs() < EPS);
        assert!((ledger.balance("USD") - 396.0).abs() < EPS);
    }

    #[test]
    fn fractions_are_clamped() {
        let mut ledger = Ledger::new(0.0);
        ledger.deposit("USD", 100.0);
        ledger.market_buy(&btc(), 3.0, 10.0, at()).unwrap();
        assert!(ledger.balance("USD").abs() < EPS);
        assert!((ledger.balance("BTC") - 10.0).abs() < EPS);

        assert!(ledger.market_sell(&btc(), -1.0, 10.0, at()).unwrap().is_none());
        assert_eq!(ledger.fills().len(), 1);
    }

    #[test]
    fn empty_balance_is_a_no_op() {
        let mut ledger = Ledger::new(0.0);
        assert!(ledger.market_buy(&btc(), 1.0, 10.0, at()).unwrap().is_none());
        assert!(ledger.fills().is_empty());
    }

    #[test]
    fn rejects_bad_price() {
        let mut ledger = Ledger::new(0.0);
        ledger.deposit("USD", 100.0);
        let err = ledger.market_buy(&btc(), 1.0, 0.0, at()).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidPrice { .. }));
        assert!((ledger.balance("USD") - 100.0).abs() < EPS);
    }

    #[test]
    fn value_in_quote() {
        let mut ledger = Ledger::new(0.0);
        ledger.deposit("USD", 50.0);
        ledger.deposit("BTC", 2.0);
        ledger.deposit("ETH", 0.0);

        let value = ledger
            .value_in("USD", |asset| match asset {
                "BTC" => Ok(25.0),
                other => Err(format!("unexpected {other}")),
            })
            .unwrap();
        assert!((value - 100.0).abs() < EPS);

        let err = ledger.value_in("EUR", |_| Err::<f64, _>("closed")).unwrap_err();
        assert!(matches!(err, LedgerError::MissingPrice { .. }));
    }
}
