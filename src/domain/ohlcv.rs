//! OHLCV bars and quotes as exposed by the venue.

use chrono::{DateTime, NaiveDate, Utc};

/// One bar of a kline series. `datetime` is the bar's start in ns since epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub datetime: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

impl Bar {
    /// Calendar day (UTC) the bar starts on.
    pub fn trading_day(&self) -> NaiveDate {
        DateTime::<Utc>::from_timestamp_nanos(self.datetime).date_naive()
    }

    /// Whether a limit price would be reached during this bar.
    pub fn touches(&self, price: f64) -> bool {
        self.low <= price && price <= self.high
    }
}

/// Top-of-book quote.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub symbol: String,
    pub datetime: i64,
    pub last_price: f64,
    pub bid_price1: f64,
    pub ask_price1: f64,
}
