//! Orders, fills and their wire enums.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Buy => "BUY",
            Direction::Sell => "SELL",
        }
    }
}

/// Whether an order opens a new position or closes an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Offset {
    Open,
    Close,
    CloseToday,
}

impl Offset {
    pub fn as_str(&self) -> &'static str {
        match self {
            Offset::Open => "OPEN",
            Offset::Close => "CLOSE",
            Offset::CloseToday => "CLOSETODAY",
        }
    }

    pub fn is_close(&self) -> bool {
        !matches!(self, Offset::Open)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PriceType {
    Any,
    Limit,
}

impl PriceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceType::Any => "ANY",
            PriceType::Limit => "LIMIT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OrderStatus {
    Alive,
    Finished,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Alive => "ALIVE",
            OrderStatus::Finished => "FINISHED",
        }
    }
}

/// Error returned when a wire name does not parse.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! wire_enum {
    ($ty:ident, $kind:literal, [$($variant:ident),+]) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let upper = s.trim().to_ascii_uppercase();
                $(
                    if upper == $ty::$variant.as_str() {
                        return Ok($ty::$variant);
                    }
                )+
                Err(ParseEnumError {
                    kind: $kind,
                    value: s.to_string(),
                })
            }
        }
    };
}

wire_enum!(Direction, "direction", [Buy, Sell]);
wire_enum!(Offset, "offset", [Open, Close, CloseToday]);
wire_enum!(PriceType, "price type", [Any, Limit]);
wire_enum!(OrderStatus, "order status", [Alive, Finished]);

/// Splits a venue symbol `EXCHANGE.INSTRUMENT` into `(exchange, instrument)`.
pub fn split_symbol(symbol: &str) -> Option<(&str, &str)> {
    let (exchange, instrument) = symbol.split_once('.')?;
    if exchange.is_empty() || instrument.is_empty() {
        return None;
    }
    Some((exchange, instrument))
}

/// Parameters for placing an order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub direction: Direction,
    pub offset: Offset,
    pub price_type: PriceType,
    pub limit_price: Option<f64>,
    pub volume: i64,
}

/// A fill belonging to one order.
#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub trade_id: String,
    pub exchange_trade_id: Option<String>,
    pub exchange_id: String,
    pub instrument_id: String,
    pub direction: Direction,
    pub offset: Offset,
    pub price: f64,
    pub volume: i64,
    /// Fill time, ns since epoch.
    pub trade_date_time: i64,
}

/// Live state of an order as reported by the venue.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub order_id: String,
    pub exchange_order_id: Option<String>,
    pub exchange_id: String,
    pub instrument_id: String,
    pub direction: Direction,
    pub offset: Offset,
    pub volume_orign: i64,
    pub volume_left: i64,
    pub price_type: PriceType,
    pub limit_price: Option<f64>,
    pub volume_condition: Option<String>,
    pub time_condition: Option<String>,
    pub insert_date_time: Option<i64>,
    pub last_msg: Option<String>,
    pub status: OrderStatus,
    pub is_dead: bool,
    pub is_online: bool,
    pub is_error: bool,
    pub trade_price: Option<f64>,
    pub trades: BTreeMap<String, Trade>,
}

impl Order {
    /// A freshly accepted order with nothing filled yet.
    pub fn new(order_id: impl Into<String>, request: &OrderRequest) -> Self {
        let (exchange_id, instrument_id) =
            split_symbol(&request.symbol).unwrap_or(("", request.symbol.as_str()));
        Order {
            order_id: order_id.into(),
            exchange_order_id: None,
            exchange_id: exchange_id.to_string(),
            instrument_id: instrument_id.to_string(),
            direction: request.direction,
            offset: request.offset,
            volume_orign: request.volume,
            volume_left: request.volume,
            price_type: request.price_type,
            limit_price: request.limit_price,
            volume_condition: Some("ANY".to_string()),
            time_condition: Some("GFD".to_string()),
            insert_date_time: None,
            last_msg: None,
            status: OrderStatus::Alive,
            is_dead: false,
            is_online: true,
            is_error: false,
            trade_price: None,
            trades: BTreeMap::new(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status == OrderStatus::Finished
    }

    pub fn volume_filled(&self) -> i64 {
        self.volume_orign - self.volume_left
    }

    /// Checks `0 <= volume_left <= volume_orign`.
    pub fn check_volumes(&self) -> Result<(), String> {
        if self.volume_left < 0 {
            return Err(format!("volume_left {} is negative", self.volume_left));
        }
        if self.volume_left > self.volume_orign {
            return Err(format!(
                "volume_left {} exceeds volume_orign {}",
                self.volume_left, self.volume_orign
            ));
        }
        Ok(())
    }
}
