//! Strategy hook port.

use crate::domain::ohlcv::Bar;
use crate::domain::order::{Direction, Offset};

/// A trading intention produced by a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Intent {
    pub direction: Direction,
    pub offset: Offset,
    pub volume: i64,
}

/// Decides what to trade when a new daily bar begins.
pub trait StrategyPort {
    /// `bar` is the newest daily bar; `history` is the full series including it.
    fn on_daily_bar(&mut self, bar: &Bar, history: &[Bar]) -> Option<Intent>;
}
