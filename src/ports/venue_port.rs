//! Execution venue capability port.

use crate::domain::error::VenueError;
use crate::domain::ohlcv::{Bar, Quote};
use crate::domain::order::{Order, OrderRequest};
use crate::domain::record::{AccountSnapshot, PositionSnapshot};

/// Something the venue can report as changed during the last update.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Observable {
    Account,
    Position(String),
    Series { symbol: String, interval_secs: u64 },
    Quote(String),
}

/// Narrow capability interface onto a market-data/execution venue.
///
/// The read accessors return point-in-time copies; the venue owns the live
/// state and keeps mutating it between `wait_for_update` calls.
pub trait VenuePort {
    /// Blocks until the venue has new data. Returns whether anything arrived.
    /// A bounded session ends with [`VenueError::SessionFinished`].
    fn wait_for_update(&mut self) -> Result<bool, VenueError>;

    /// Whether any of `fields` of `observable` changed in the last update.
    fn is_changed(&self, observable: &Observable, fields: &[&str]) -> bool;

    fn account(&self) -> Result<AccountSnapshot, VenueError>;

    fn position(&self, symbol: &str) -> Result<PositionSnapshot, VenueError>;

    fn series(&self, symbol: &str, interval_secs: u64) -> Result<Vec<Bar>, VenueError>;

    fn quote(&self, symbol: &str) -> Result<Quote, VenueError>;

    /// Places an order and returns its initial state.
    fn insert_order(&mut self, request: &OrderRequest) -> Result<Order, VenueError>;

    /// Current state of a previously placed order.
    fn order(&self, order_id: &str) -> Result<Option<Order>, VenueError>;

    fn is_finished(&self) -> bool;

    fn close(&mut self) -> Result<(), VenueError>;

    /// Most recent bar of a series, if any.
    fn last_bar(&self, symbol: &str, interval_secs: u64) -> Result<Option<Bar>, VenueError> {
        Ok(self.series(symbol, interval_secs)?.pop())
    }
}
