//! Audit record types and their flat row encoding.
//!
//! Every record type declares its columns up front: the stored fields in
//! declaration order, then any derived composite ids. [`AuditRecord::to_row`]
//! turns a record into a key→value map over exactly those columns.

use std::collections::HashMap;

use chrono::Utc;

use super::order::{Direction, Offset, Order, OrderStatus, PriceType, Trade};

/// A flat key→value encoding of one record.
pub type Row = HashMap<String, String>;

/// UTC wall-clock timestamp with microsecond precision, as stamped into `ts`.
pub fn audit_timestamp() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

/// Encoding of a single value into a CSV cell. `None` is the empty cell.
pub trait ToCell {
    fn to_cell(&self) -> String;
}

impl ToCell for String {
    fn to_cell(&self) -> String {
        self.clone()
    }
}

impl ToCell for i64 {
    fn to_cell(&self) -> String {
        self.to_string()
    }
}

impl ToCell for u64 {
    fn to_cell(&self) -> String {
        self.to_string()
    }
}

impl ToCell for f64 {
    fn to_cell(&self) -> String {
        self.to_string()
    }
}

impl ToCell for bool {
    fn to_cell(&self) -> String {
        self.to_string()
    }
}

impl<T: ToCell> ToCell for Option<T> {
    fn to_cell(&self) -> String {
        self.as_ref().map(ToCell::to_cell).unwrap_or_default()
    }
}

macro_rules! wire_cell {
    ($($ty:ty),+) => {
        $(
            impl ToCell for $ty {
                fn to_cell(&self) -> String {
                    self.as_str().to_string()
                }
            }
        )+
    };
}

/// Outcome of matching one expected signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStatus {
    Matched,
    Mismatch,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Matched => "MATCHED",
            MatchStatus::Mismatch => "MISMATCH",
        }
    }
}

/// What the venue's wait call reported for a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VenueStatus {
    Ok,
    NoUpdate,
    Error,
}

impl VenueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VenueStatus::Ok => "OK",
            VenueStatus::NoUpdate => "NO_UPDATE",
            VenueStatus::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleVerdict {
    Pass,
    Fail,
}

impl CycleVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleVerdict::Pass => "PASS",
            CycleVerdict::Fail => "FAIL",
        }
    }
}

wire_cell!(
    Direction,
    Offset,
    PriceType,
    OrderStatus,
    MatchStatus,
    VenueStatus,
    CycleVerdict
);

/// The six audit stores, one per record type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Account,
    Position,
    Order,
    Trade,
    ValidationLog,
    WaitUpdateLog,
}

impl RecordKind {
    pub const ALL: [RecordKind; 6] = [
        RecordKind::Account,
        RecordKind::Position,
        RecordKind::Order,
        RecordKind::Trade,
        RecordKind::ValidationLog,
        RecordKind::WaitUpdateLog,
    ];

    pub fn store_name(&self) -> &'static str {
        match self {
            RecordKind::Account => "account",
            RecordKind::Position => "position",
            RecordKind::Order => "order",
            RecordKind::Trade => "trade",
            RecordKind::ValidationLog => "validation_log",
            RecordKind::WaitUpdateLog => "wait_update_log",
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}.csv", self.store_name())
    }

    /// Fixed column order of this store's header.
    pub fn columns(&self) -> Vec<&'static str> {
        match self {
            RecordKind::Account => AccountSnapshot::columns(),
            RecordKind::Position => PositionSnapshot::columns(),
            RecordKind::Order => OrderRecord::columns(),
            RecordKind::Trade => TradeRecord::columns(),
            RecordKind::ValidationLog => ValidationLogEntry::columns(),
            RecordKind::WaitUpdateLog => WaitUpdateLogEntry::columns(),
        }
    }
}

/// A record with a fixed, declared column layout.
pub trait AuditRecord {
    const KIND: RecordKind;
    /// Stored fields, in declaration order.
    const STORED: &'static [&'static str];
    /// Composite ids computed from stored fields, appended after them.
    const DERIVED: &'static [&'static str];

    fn stored_cells(&self) -> Vec<String>;

    fn derived_cells(&self) -> Vec<String>;

    fn columns() -> Vec<&'static str>
    where
        Self: Sized,
    {
        Self::STORED.iter().chain(Self::DERIVED).copied().collect()
    }

    fn to_row(&self) -> Row {
        Self::STORED
            .iter()
            .zip(self.stored_cells())
            .chain(Self::DERIVED.iter().zip(self.derived_cells()))
            .map(|(key, value)| (key.to_string(), value))
            .collect()
    }
}

macro_rules! audit_record {
    (
        $(#[$meta:meta])*
        $kind:ident => pub struct $name:ident {
            $( $(#[$fmeta:meta])* pub $field:ident : $ty:ty, )+
        }
        derived: [$($derived:ident),* $(,)?]
    ) => {
        $(#[$meta])*
        pub struct $name {
            $( $(#[$fmeta])* pub $field: $ty, )+
        }

        impl AuditRecord for $name {
            const KIND: RecordKind = RecordKind::$kind;
            const STORED: &'static [&'static str] = &[$(stringify!($field)),+];
            const DERIVED: &'static [&'static str] = &[$(stringify!($derived)),*];

            fn stored_cells(&self) -> Vec<String> {
                vec![$(self.$field.to_cell()),+]
            }

            fn derived_cells(&self) -> Vec<String> {
                vec![$(self.$derived()),*]
            }
        }
    };
}

audit_record! {
    /// Point-in-time copy of the venue account.
    #[derive(Debug, Clone, Default, PartialEq)]
    Account => pub struct AccountSnapshot {
        pub gateway_name: String,
        pub currency: Option<String>,
        pub pre_balance: Option<f64>,
        pub static_balance: Option<f64>,
        pub balance: Option<f64>,
        pub available: Option<f64>,
        pub ctp_balance: Option<f64>,
        pub ctp_available: Option<f64>,
        pub float_profit: Option<f64>,
        pub position_profit: Option<f64>,
        pub close_profit: Option<f64>,
        pub frozen_margin: Option<f64>,
        pub margin: Option<f64>,
        pub frozen_commission: Option<f64>,
        pub commission: Option<f64>,
        pub frozen_premium: Option<f64>,
        pub premium: Option<f64>,
        pub deposit: Option<f64>,
        pub withdraw: Option<f64>,
        pub risk_ratio: Option<f64>,
        pub market_value: Option<f64>,
        pub user_id: Option<String>,
        pub asset: Option<f64>,
        pub asset_his: Option<f64>,
        pub available_his: Option<f64>,
        pub cost: Option<f64>,
        pub drawable: Option<f64>,
        pub buy_frozen_balance: Option<f64>,
        pub buy_frozen_fee: Option<f64>,
        pub buy_balance_today: Option<f64>,
        pub buy_fee_today: Option<f64>,
        pub sell_balance_today: Option<f64>,
        pub sell_fee_today: Option<f64>,
        pub hold_profit: Option<f64>,
        pub float_profit_today: Option<f64>,
        pub real_profit_today: Option<f64>,
        pub profit_today: Option<f64>,
        pub profit_rate_today: Option<f64>,
        pub dividend_balance_today: Option<f64>,
        pub ts: String,
    }
    derived: []
}

impl AccountSnapshot {
    pub fn new(gateway_name: impl Into<String>) -> Self {
        AccountSnapshot {
            gateway_name: gateway_name.into(),
            ts: audit_timestamp(),
            ..Default::default()
        }
    }
}

audit_record! {
    /// Point-in-time copy of the venue position in one instrument.
    #[derive(Debug, Clone, Default, PartialEq)]
    Position => pub struct PositionSnapshot {
        pub gateway_name: String,
        pub exchange_id: String,
        pub instrument_id: String,
        pub pos_long_his: Option<i64>,
        pub pos_long_today: Option<i64>,
        pub pos_short_his: Option<i64>,
        pub pos_short_today: Option<i64>,
        pub volume_long: Option<i64>,
        pub volume_short: Option<i64>,
        pub open_price_long: Option<f64>,
        pub open_price_short: Option<f64>,
        pub open_cost_long: Option<f64>,
        pub open_cost_short: Option<f64>,
        pub position_price_long: Option<f64>,
        pub position_price_short: Option<f64>,
        pub position_cost_long: Option<f64>,
        pub position_cost_short: Option<f64>,
        pub float_profit_long: Option<f64>,
        pub float_profit_short: Option<f64>,
        pub float_profit: Option<f64>,
        pub position_profit_long: Option<f64>,
        pub position_profit_short: Option<f64>,
        pub position_profit: Option<f64>,
        pub margin_long: Option<f64>,
        pub margin_short: Option<f64>,
        pub margin: Option<f64>,
        pub pos: Option<i64>,
        pub pos_long: Option<i64>,
        pub pos_short: Option<i64>,
        pub ts: String,
    }
    derived: [vt_symbol]
}

impl PositionSnapshot {
    pub fn new(
        gateway_name: impl Into<String>,
        exchange_id: impl Into<String>,
        instrument_id: impl Into<String>,
    ) -> Self {
        PositionSnapshot {
            gateway_name: gateway_name.into(),
            exchange_id: exchange_id.into(),
            instrument_id: instrument_id.into(),
            ts: audit_timestamp(),
            ..Default::default()
        }
    }

    pub fn vt_symbol(&self) -> String {
        format!("{}.{}", self.instrument_id, self.exchange_id)
    }
}

audit_record! {
    #[derive(Debug, Clone, PartialEq)]
    Order => pub struct OrderRecord {
        pub gateway_name: String,
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
        /// ns since epoch
        pub insert_date_time: Option<i64>,
        pub last_msg: Option<String>,
        pub status: OrderStatus,
        pub is_dead: bool,
        pub is_online: bool,
        pub is_error: bool,
        pub trade_price: Option<f64>,
        pub ts: String,
    }
    derived: [vt_symbol, vt_orderid]
}

impl OrderRecord {
    pub fn from_order(gateway_name: &str, order: &Order) -> Self {
        OrderRecord {
            gateway_name: gateway_name.to_string(),
            order_id: order.order_id.clone(),
            exchange_order_id: order.exchange_order_id.clone(),
            exchange_id: order.exchange_id.clone(),
            instrument_id: order.instrument_id.clone(),
            direction: order.direction,
            offset: order.offset,
            volume_orign: order.volume_orign,
            volume_left: order.volume_left,
            price_type: order.price_type,
            limit_price: order.limit_price,
            volume_condition: order.volume_condition.clone(),
            time_condition: order.time_condition.clone(),
            insert_date_time: order.insert_date_time,
            last_msg: order.last_msg.clone(),
            status: order.status,
            is_dead: order.is_dead,
            is_online: order.is_online,
            is_error: order.is_error,
            trade_price: order.trade_price,
            ts: audit_timestamp(),
        }
    }

    pub fn vt_symbol(&self) -> String {
        format!("{}.{}", self.instrument_id, self.exchange_id)
    }

    pub fn vt_orderid(&self) -> String {
        format!("{}.{}", self.gateway_name, self.order_id)
    }
}

audit_record! {
    #[derive(Debug, Clone, PartialEq)]
    Trade => pub struct TradeRecord {
        pub gateway_name: String,
        pub order_id: String,
        pub trade_id: String,
        pub exchange_trade_id: Option<String>,
        pub exchange_id: String,
        pub instrument_id: String,
        pub direction: Direction,
        pub offset: Offset,
        pub price: f64,
        pub volume: i64,
        /// ns since epoch
        pub trade_date_time: i64,
        pub ts: String,
    }
    derived: [vt_symbol, vt_orderid, vt_tradeid]
}

impl TradeRecord {
    pub fn from_trade(gateway_name: &str, order_id: &str, trade: &Trade) -> Self {
        TradeRecord {
            gateway_name: gateway_name.to_string(),
            order_id: order_id.to_string(),
            trade_id: trade.trade_id.clone(),
            exchange_trade_id: trade.exchange_trade_id.clone(),
            exchange_id: trade.exchange_id.clone(),
            instrument_id: trade.instrument_id.clone(),
            direction: trade.direction,
            offset: trade.offset,
            price: trade.price,
            volume: trade.volume,
            trade_date_time: trade.trade_date_time,
            ts: audit_timestamp(),
        }
    }

    pub fn vt_symbol(&self) -> String {
        format!("{}.{}", self.instrument_id, self.exchange_id)
    }

    pub fn vt_orderid(&self) -> String {
        format!("{}.{}", self.gateway_name, self.order_id)
    }

    pub fn vt_tradeid(&self) -> String {
        format!("{}.{}", self.gateway_name, self.trade_id)
    }
}

audit_record! {
    /// Result of matching one expected signal against the recent orders.
    #[derive(Debug, Clone, PartialEq)]
    ValidationLog => pub struct ValidationLogEntry {
        pub gateway_name: String,
        pub event_type: String,
        pub signal_direction: Direction,
        pub signal_offset: Offset,
        pub signal_volume: i64,
        pub order_id: Option<String>,
        pub order_direction: Option<Direction>,
        pub order_offset: Option<Offset>,
        pub order_volume: Option<i64>,
        pub status: MatchStatus,
        pub message: String,
        pub ts: String,
    }
    derived: []
}

audit_record! {
    /// Result of one polling cycle.
    #[derive(Debug, Clone, PartialEq)]
    WaitUpdateLog => pub struct WaitUpdateLogEntry {
        pub gateway_name: String,
        pub update_id: u64,
        pub duration_ms: f64,
        pub has_changes: bool,
        pub d1_changed: bool,
        pub m1_changed: bool,
        pub account_changed: bool,
        pub position_changed: bool,
        pub orders_changed: bool,
        pub tqsdk_status: VenueStatus,
        pub validation_status: CycleVerdict,
        pub message: String,
        pub ts: String,
    }
    derived: []
}
