//! Replay engine: interval-driven stage scheduling in live and backtest modes.
//!
//! A `Scheduler<C>` maps intervals to ordered stages. Each tick:
//!
//! 1. Resolve the tick time (truncated to one minute)
//! 2. Find every registered interval aligned with that time (ascending)
//! 3. Run the stages of each due interval in registration order
//! 4. In backtest/live mode, value the portfolio and feed the tracker
//!
//! Stages share state only through the context `C` (store, `Blackboard`,
//! ledger, ...) passed to them by mutable reference.

pub mod blackboard;
pub mod live;
pub mod scheduler;

pub use blackboard::Blackboard;
pub use live::{run_live, Clock, ManualClock, SystemClock};
pub use scheduler::{BoxError, PartialBacktest, Scheduler, SchedulerError, Stage};
