//! Strategies expressed as scheduler stages over a shared replay context.
//!
//! Stages read bars strictly before their tick time, publish their readings
//! on the blackboard under `{pair}.{name}` keys and trade through the ledger.

use chrono::{DateTime, Utc};
use replaylab_core::data::StoreError;
use replaylab_core::domain::{Interval, Pair};
use replaylab_core::engine::{Blackboard, BoxError, Scheduler};
use replaylab_core::indicators::{Ema, Indicator, Sma};
use replaylab_core::TimeSeriesStore;
use tracing::debug;

use crate::config::{MaKind, ReplayConfig, StrategyConfig};
use crate::ledger::Ledger;

/// Everything a stage may touch.
pub struct ReplayContext {
    pub store: TimeSeriesStore,
    pub board: Blackboard,
    pub ledger: Ledger,
}

impl ReplayContext {
    pub fn new(store: TimeSeriesStore, ledger: Ledger) -> Self {
        Self {
            store,
            board: Blackboard::new(),
            ledger,
        }
    }
}

pub fn board_key(pair: &Pair, name: &str) -> String {
    format!("{pair}.{name}")
}

/// Close of the last `interval` bar that closed at or before `t`.
///
/// `Ok(None)` while the source has no history that far back.
pub fn mark_price(
    store: &mut TimeSeriesStore,
    symbol: &str,
    interval: Interval,
    t: DateTime<Utc>,
) -> Result<Option<f64>, StoreError> {
    match store.get_n_before(symbol, interval, 1, t) {
        Ok(bars) => Ok(bars.last().map(|b| b.close)),
        Err(StoreError::InsufficientData { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

fn moving_average(kind: MaKind, period: usize) -> Box<dyn Indicator> {
    match kind {
        MaKind::Sma => Box::new(Sma::new(period)),
        MaKind::Ema => Box::new(Ema::new(period)),
    }
}

/// Install the configured strategy's stages.
pub fn build_scheduler(config: &ReplayConfig) -> Scheduler<ReplayContext> {
    let mut scheduler = Scheduler::new();
    let step = config.backtest.step;

    match &config.strategy {
        StrategyConfig::BuyAndHold { pair } => {
            add_buy_and_hold(&mut scheduler, pair.clone(), step);
        }
        StrategyConfig::MaCrossover {
            pair,
            interval,
            fast,
            slow,
            ma,
        } => {
            add_ma_signal(&mut scheduler, pair.clone(), *interval, *fast, *slow, *ma);
            add_signal_execution(&mut scheduler, pair.clone(), *interval, step);
        }
    }
    scheduler
}

// ── Buy and hold ──

fn add_buy_and_hold(scheduler: &mut Scheduler<ReplayContext>, pair: Pair, step: Interval) {
    let symbol = pair.symbol();
    let held = board_key(&pair, "holding");

    scheduler.add(step, move |t, ctx: &mut ReplayContext| -> Result<(), BoxError> {
        if ctx.board.contains(&held) {
            return Ok(());
        }
        let Some(price) = mark_price(&mut ctx.store, &symbol, step, t)? else {
            debug!(%pair, at = %t, "no price yet");
            return Ok(());
        };
        ctx.ledger.market_buy(&pair, 1.0, price, t)?;
        ctx.board.set(held.clone(), 1.0);
        Ok(())
    });
}

// ── Moving-average crossover ──

fn add_ma_signal(
    scheduler: &mut Scheduler<ReplayContext>,
    pair: Pair,
    interval: Interval,
    fast: usize,
    slow: usize,
    kind: MaKind,
) {
    let symbol = pair.symbol();
    let fast_key = board_key(&pair, "fast");
    let slow_key = board_key(&pair, "slow");
    let signal_key = board_key(&pair, "signal");

    scheduler.add(interval, move |t, ctx: &mut ReplayContext| -> Result<(), BoxError> {
        let bars = match ctx.store.get_n_before(&symbol, interval, slow, t) {
            Ok(bars) => bars,
            Err(StoreError::InsufficientData { available, .. }) => {
                debug!(%pair, at = %t, available, needed = slow, "warming up");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let fast_value = moving_average(kind, fast).update_all(&bars[slow - fast..]);
        let slow_value = moving_average(kind, slow).update_all(bars);
        let signal = if fast_value > slow_value { 1.0 } else { 0.0 };

        ctx.board.set(fast_key.clone(), fast_value);
        ctx.board.set(slow_key.clone(), slow_value);
        ctx.board.set(signal_key.clone(), signal);
        Ok(())
    });
}

/// Go all-in on a long signal and flat otherwise, trading at the last `step` close.
fn add_signal_execution(
    scheduler: &mut Scheduler<ReplayContext>,
    pair: Pair,
    interval: Interval,
    step: Interval,
) {
    let symbol = pair.symbol();
    let signal_key = board_key(&pair, "signal");

    scheduler.add(interval, move |t, ctx: &mut ReplayContext| -> Result<(), BoxError> {
        let Some(signal) = ctx.board.get(&signal_key) else {
            return Ok(());
        };
        let long = signal > 0.0;
        let holding = ctx.ledger.balance(&pair.base) > 0.0;
        if long == holding {
            return Ok(());
        }

        let Some(price) = mark_price(&mut ctx.store, &symbol, step, t)? else {
            return Ok(());
        };
        let fill = if long {
            ctx.ledger.market_buy(&pair, 1.0, price, t)?
        } else {
            ctx.ledger.market_sell(&pair, 1.0, price, t)?
        };
        if let Some(fill) = fill {
            debug!(%pair, at = %t, side = ?fill.side, price, "filled");
        }
        Ok(())
    });
}
