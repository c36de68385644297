//! Domain types for ReplayLab

pub mod bar;
pub mod interval;
pub mod series;

pub use bar::Bar;
pub use interval::{Interval, IntervalError, YEAR_NANOS};
pub use series::{Pair, SeriesKey};
