//! File-backed replay venue.
//!
//! Reveals one minute bar per update from CSV history, together with every
//! daily bar that has started by then. Alive orders are filled against each
//! newly revealed minute bar, and the resulting position and account changes
//! are reported through [`VenuePort::is_changed`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use tracing::{debug, info};

use crate::domain::config_validation::ReplayConfig;
use crate::domain::error::{TradecheckError, VenueError};
use crate::domain::ohlcv::{Bar, Quote};
use crate::domain::order::{
    Direction, Offset, Order, OrderRequest, OrderStatus, PriceType, Trade, split_symbol,
};
use crate::domain::record::{AccountSnapshot, PositionSnapshot};
use crate::domain::session::SessionConfig;
use crate::ports::venue_port::{Observable, VenuePort};

const ACCOUNT_FIELDS: [&str; 6] = [
    "balance",
    "available",
    "float_profit",
    "position_profit",
    "close_profit",
    "commission",
];

const POSITION_FIELDS: [&str; 7] = [
    "pos",
    "pos_long",
    "pos_short",
    "open_price_long",
    "open_price_short",
    "float_profit",
    "position_profit",
];

const BAR_FIELDS: [&str; 6] = ["datetime", "open", "high", "low", "close", "volume"];

/// Account and fill parameters of a replay.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplaySettings {
    pub gateway_name: String,
    pub initial_capital: f64,
    pub commission_per_lot: f64,
    pub multiplier: f64,
}

#[derive(Debug, Clone, Default)]
struct Book {
    volume_long: i64,
    volume_short: i64,
    open_cost_long: f64,
    open_cost_short: f64,
    close_profit: f64,
    commission: f64,
}

pub struct ReplayVenue {
    symbol: String,
    exchange_id: String,
    instrument_id: String,
    daily_interval_secs: u64,
    minute_interval_secs: u64,
    daily: Vec<Bar>,
    minute: Vec<Bar>,
    revealed_days: usize,
    revealed_minutes: usize,
    settings: ReplaySettings,
    book: Book,
    orders: BTreeMap<String, Order>,
    next_order_seq: u64,
    next_trade_seq: u64,
    changes: HashMap<Observable, HashSet<&'static str>>,
    finished: bool,
    closed: bool,
}

impl ReplayVenue {
    pub fn new(
        session: &SessionConfig,
        settings: ReplaySettings,
        daily: Vec<Bar>,
        minute: Vec<Bar>,
    ) -> Result<Self, TradecheckError> {
        let (exchange_id, instrument_id) =
            split_symbol(&session.symbol).ok_or_else(|| TradecheckError::Data {
                reason: format!("symbol '{}' is not EXCHANGE.INSTRUMENT", session.symbol),
            })?;
        Ok(ReplayVenue {
            symbol: session.symbol.clone(),
            exchange_id: exchange_id.to_string(),
            instrument_id: instrument_id.to_string(),
            daily_interval_secs: session.daily_interval_secs,
            minute_interval_secs: session.minute_interval_secs,
            daily,
            minute,
            revealed_days: 0,
            revealed_minutes: 0,
            settings,
            book: Book::default(),
            orders: BTreeMap::new(),
            next_order_seq: 0,
            next_trade_seq: 0,
            changes: HashMap::new(),
            finished: false,
            closed: false,
        })
    }

    /// Loads both series from `replay.data_dir`.
    pub fn open(session: &SessionConfig, replay: &ReplayConfig) -> Result<Self, TradecheckError> {
        let (exchange, instrument) =
            split_symbol(&session.symbol).ok_or_else(|| TradecheckError::Data {
                reason: format!("symbol '{}' is not EXCHANGE.INSTRUMENT", session.symbol),
            })?;
        let daily = load_bars(&series_path(
            &replay.data_dir,
            instrument,
            exchange,
            session.daily_interval_secs,
        ))?;
        let minute = load_bars(&series_path(
            &replay.data_dir,
            instrument,
            exchange,
            session.minute_interval_secs,
        ))?;
        info!(
            symbol = %session.symbol,
            daily_bars = daily.len(),
            minute_bars = minute.len(),
            "replay data loaded"
        );

        let settings = ReplaySettings {
            gateway_name: session.gateway_name.clone(),
            initial_capital: replay.initial_capital,
            commission_per_lot: replay.commission_per_lot,
            multiplier: replay.multiplier,
        };
        Self::new(session, settings, daily, minute)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn remaining(&self) -> usize {
        self.minute.len() - self.revealed_minutes
    }

    fn check_symbol(&self, symbol: &str) -> Result<(), VenueError> {
        if symbol == self.symbol {
            Ok(())
        } else {
            Err(VenueError::UnknownSymbol {
                symbol: symbol.to_string(),
            })
        }
    }

    /// The part of a series visible so far.
    fn revealed(&self, symbol: &str, interval_secs: u64) -> Result<&[Bar], VenueError> {
        self.check_symbol(symbol)?;
        if interval_secs == self.minute_interval_secs {
            Ok(&self.minute[..self.revealed_minutes])
        } else if interval_secs == self.daily_interval_secs {
            Ok(&self.daily[..self.revealed_days])
        } else {
            Err(VenueError::Failure {
                reason: format!("no {interval_secs}s series for {symbol}"),
            })
        }
    }

    fn last_price(&self) -> Option<f64> {
        self.revealed_minutes
            .checked_sub(1)
            .map(|i| self.minute[i].close)
    }

    fn open_price_long(&self) -> f64 {
        average_price(self.book.open_cost_long, self.book.volume_long, self.settings.multiplier)
    }

    fn open_price_short(&self) -> f64 {
        average_price(self.book.open_cost_short, self.book.volume_short, self.settings.multiplier)
    }

    fn float_profit_long(&self) -> f64 {
        let last = self.last_price().unwrap_or(0.0);
        match self.book.volume_long {
            0 => 0.0,
            v => last * v as f64 * self.settings.multiplier - self.book.open_cost_long,
        }
    }

    fn float_profit_short(&self) -> f64 {
        let last = self.last_price().unwrap_or(0.0);
        match self.book.volume_short {
            0 => 0.0,
            v => self.book.open_cost_short - last * v as f64 * self.settings.multiplier,
        }
    }

    fn balance(&self) -> f64 {
        self.settings.initial_capital + self.book.close_profit
            + self.float_profit_long()
            + self.float_profit_short()
            - self.book.commission
    }

    fn account_values(&self) -> [f64; 6] {
        let float = self.float_profit_long() + self.float_profit_short();
        let balance = self.balance();
        [
            balance,
            balance,
            float,
            float,
            self.book.close_profit,
            self.book.commission,
        ]
    }

    fn position_values(&self) -> [f64; 7] {
        let float = self.float_profit_long() + self.float_profit_short();
        [
            (self.book.volume_long - self.book.volume_short) as f64,
            self.book.volume_long as f64,
            self.book.volume_short as f64,
            self.open_price_long(),
            self.open_price_short(),
            float,
            float,
        ]
    }

    fn mark(&mut self, observable: Observable, fields: &[&'static str]) {
        self.changes
            .entry(observable)
            .or_default()
            .extend(fields.iter().copied());
    }

    fn mark_differences<const N: usize>(
        &mut self,
        observable: Observable,
        names: [&'static str; N],
        before: [f64; N],
        after: [f64; N],
    ) {
        let changed: Vec<&'static str> = names
            .iter()
            .zip(before.iter().zip(after.iter()))
            .filter(|(_, (b, a))| b != a)
            .map(|(name, _)| *name)
            .collect();
        if !changed.is_empty() {
            self.mark(observable, &changed);
        }
    }

    /// Fills every alive order the bar reaches, oldest first.
    fn match_orders(&mut self, bar: &Bar) {
        let alive: Vec<String> = self
            .orders
            .values()
            .filter(|o| !o.is_finished())
            .map(|o| o.order_id.clone())
            .collect();

        for order_id in alive {
            let Some(order) = self.orders.get(&order_id) else {
                continue;
            };
            let Some(price) = fill_price(order, bar) else {
                continue;
            };
            let (direction, offset, volume) = (order.direction, order.offset, order.volume_left);

            if offset.is_close() && self.closable(direction) < volume {
                self.cancel(&order_id, "cancelled: insufficient position");
                continue;
            }
            self.apply_fill(direction, offset, volume, price);
            self.fill(&order_id, price, volume, bar.datetime);
        }
    }

    fn closable(&self, direction: Direction) -> i64 {
        match direction {
            Direction::Sell => self.book.volume_long,
            Direction::Buy => self.book.volume_short,
        }
    }

    fn apply_fill(&mut self, direction: Direction, offset: Offset, volume: i64, price: f64) {
        let mult = self.settings.multiplier;
        let notional = price * volume as f64 * mult;
        self.book.commission += self.settings.commission_per_lot * volume as f64;

        match (direction, offset.is_close()) {
            (Direction::Buy, false) => {
                self.book.volume_long += volume;
                self.book.open_cost_long += notional;
            }
            (Direction::Sell, false) => {
                self.book.volume_short += volume;
                self.book.open_cost_short += notional;
            }
            (Direction::Sell, true) => {
                let avg = self.open_price_long();
                self.book.close_profit += (price - avg) * volume as f64 * mult;
                self.book.volume_long -= volume;
                self.book.open_cost_long = avg * self.book.volume_long as f64 * mult;
            }
            (Direction::Buy, true) => {
                let avg = self.open_price_short();
                self.book.close_profit += (avg - price) * volume as f64 * mult;
                self.book.volume_short -= volume;
                self.book.open_cost_short = avg * self.book.volume_short as f64 * mult;
            }
        }
    }

    fn fill(&mut self, order_id: &str, price: f64, volume: i64, at: i64) {
        self.next_trade_seq += 1;
        let trade_id = format!("{}|{}", order_id, self.next_trade_seq);
        let Some(order) = self.orders.get_mut(order_id) else {
            return;
        };
        let trade = Trade {
            trade_id: trade_id.clone(),
            exchange_trade_id: Some(trade_id.clone()),
            exchange_id: order.exchange_id.clone(),
            instrument_id: order.instrument_id.clone(),
            direction: order.direction,
            offset: order.offset,
            price,
            volume,
            trade_date_time: at,
        };
        order.trades.insert(trade_id, trade);
        order.volume_left -= volume;
        order.trade_price = Some(price);
        order.status = OrderStatus::Finished;
        order.is_dead = true;
        order.last_msg = Some("filled".to_string());
        debug!(order_id, price, volume, "replay fill");
    }

    fn cancel(&mut self, order_id: &str, reason: &str) {
        if let Some(order) = self.orders.get_mut(order_id) {
            order.status = OrderStatus::Finished;
            order.is_dead = true;
            order.last_msg = Some(reason.to_string());
            debug!(order_id, reason, "replay cancel");
        }
    }
}

impl VenuePort for ReplayVenue {
    fn wait_for_update(&mut self) -> Result<bool, VenueError> {
        if self.closed {
            return Err(VenueError::Closed);
        }
        if self.revealed_minutes >= self.minute.len() {
            self.finished = true;
            return Err(VenueError::SessionFinished);
        }

        self.changes.clear();
        let first = self.revealed_minutes == 0;
        let account_before = self.account_values();
        let position_before = self.position_values();

        let bar = self.minute[self.revealed_minutes].clone();
        self.revealed_minutes += 1;
        self.mark(
            Observable::Series {
                symbol: self.symbol.clone(),
                interval_secs: self.minute_interval_secs,
            },
            &BAR_FIELDS,
        );
        self.mark(
            Observable::Quote(self.symbol.clone()),
            &["datetime", "last_price", "bid_price1", "ask_price1"],
        );

        let days_before = self.revealed_days;
        while self.revealed_days < self.daily.len()
            && self.daily[self.revealed_days].datetime <= bar.datetime
        {
            self.revealed_days += 1;
        }
        if self.revealed_days > days_before {
            self.mark(
                Observable::Series {
                    symbol: self.symbol.clone(),
                    interval_secs: self.daily_interval_secs,
                },
                &BAR_FIELDS,
            );
        }

        self.match_orders(&bar);

        let position = Observable::Position(self.symbol.clone());
        if first {
            self.mark(Observable::Account, &ACCOUNT_FIELDS);
            self.mark(position, &POSITION_FIELDS);
        } else {
            let account_after = self.account_values();
            let position_after = self.position_values();
            self.mark_differences(Observable::Account, ACCOUNT_FIELDS, account_before, account_after);
            self.mark_differences(position, POSITION_FIELDS, position_before, position_after);
        }
        Ok(true)
    }

    fn is_changed(&self, observable: &Observable, fields: &[&str]) -> bool {
        self.changes
            .get(observable)
            .is_some_and(|changed| fields.iter().any(|f| changed.contains(*f)))
    }

    fn account(&self) -> Result<AccountSnapshot, VenueError> {
        let [balance, available, float_profit, position_profit, close_profit, commission] =
            self.account_values();
        Ok(AccountSnapshot {
            currency: Some("CNY".to_string()),
            pre_balance: Some(self.settings.initial_capital),
            static_balance: Some(self.settings.initial_capital),
            balance: Some(balance),
            available: Some(available),
            float_profit: Some(float_profit),
            position_profit: Some(position_profit),
            close_profit: Some(close_profit),
            frozen_margin: Some(0.0),
            margin: Some(0.0),
            frozen_commission: Some(0.0),
            commission: Some(commission),
            deposit: Some(0.0),
            withdraw: Some(0.0),
            risk_ratio: Some(0.0),
            ..AccountSnapshot::new(self.settings.gateway_name.clone())
        })
    }

    fn position(&self, symbol: &str) -> Result<PositionSnapshot, VenueError> {
        self.check_symbol(symbol)?;
        let mult = self.settings.multiplier;
        let (long, short) = (self.book.volume_long, self.book.volume_short);
        let (float_long, float_short) = (self.float_profit_long(), self.float_profit_short());
        Ok(PositionSnapshot {
            pos_long_his: Some(0),
            pos_long_today: Some(long),
            pos_short_his: Some(0),
            pos_short_today: Some(short),
            volume_long: Some(long),
            volume_short: Some(short),
            open_price_long: Some(self.open_price_long()),
            open_price_short: Some(self.open_price_short()),
            open_cost_long: Some(self.book.open_cost_long),
            open_cost_short: Some(self.book.open_cost_short),
            position_price_long: Some(self.open_price_long()),
            position_price_short: Some(self.open_price_short()),
            position_cost_long: Some(self.open_price_long() * long as f64 * mult),
            position_cost_short: Some(self.open_price_short() * short as f64 * mult),
            float_profit_long: Some(float_long),
            float_profit_short: Some(float_short),
            float_profit: Some(float_long + float_short),
            position_profit_long: Some(float_long),
            position_profit_short: Some(float_short),
            position_profit: Some(float_long + float_short),
            margin_long: Some(0.0),
            margin_short: Some(0.0),
            margin: Some(0.0),
            pos: Some(long - short),
            pos_long: Some(long),
            pos_short: Some(short),
            ..PositionSnapshot::new(
                self.settings.gateway_name.clone(),
                self.exchange_id.clone(),
                self.instrument_id.clone(),
            )
        })
    }

    fn series(&self, symbol: &str, interval_secs: u64) -> Result<Vec<Bar>, VenueError> {
        Ok(self.revealed(symbol, interval_secs)?.to_vec())
    }

    fn last_bar(&self, symbol: &str, interval_secs: u64) -> Result<Option<Bar>, VenueError> {
        Ok(self.revealed(symbol, interval_secs)?.last().cloned())
    }

    fn quote(&self, symbol: &str) -> Result<Quote, VenueError> {
        self.check_symbol(symbol)?;
        let bar = self
            .revealed_minutes
            .checked_sub(1)
            .map(|i| &self.minute[i])
            .ok_or_else(|| VenueError::Failure {
                reason: format!("no quote for {symbol} yet"),
            })?;
        Ok(Quote {
            symbol: symbol.to_string(),
            datetime: bar.datetime,
            last_price: bar.close,
            bid_price1: bar.close,
            ask_price1: bar.close,
        })
    }

    fn insert_order(&mut self, request: &OrderRequest) -> Result<Order, VenueError> {
        if self.closed {
            return Err(VenueError::Closed);
        }
        self.check_symbol(&request.symbol)?;
        if request.volume <= 0 {
            return Err(VenueError::Rejected {
                reason: format!("volume {} must be positive", request.volume),
            });
        }
        if request.price_type == PriceType::Limit && request.limit_price.is_none() {
            return Err(VenueError::Rejected {
                reason: "limit order without a price".to_string(),
            });
        }
        if request.offset.is_close() && self.closable(request.direction) < request.volume {
            return Err(VenueError::Rejected {
                reason: format!(
                    "cannot {} {} lots: position is {}",
                    request.offset,
                    request.volume,
                    self.closable(request.direction)
                ),
            });
        }

        self.next_order_seq += 1;
        let order_id = format!("REPLAY_{:06}", self.next_order_seq);
        let mut order = Order::new(order_id.clone(), request);
        order.exchange_order_id = Some(order_id.clone());
        order.insert_date_time = self
            .revealed_minutes
            .checked_sub(1)
            .map(|i| self.minute[i].datetime);
        self.orders.insert(order_id, order.clone());
        Ok(order)
    }

    fn order(&self, order_id: &str) -> Result<Option<Order>, VenueError> {
        Ok(self.orders.get(order_id).cloned())
    }

    fn is_finished(&self) -> bool {
        self.finished
    }

    fn close(&mut self) -> Result<(), VenueError> {
        if !self.closed {
            self.closed = true;
            debug!(symbol = %self.symbol, "replay venue closed");
        }
        Ok(())
    }
}

fn average_price(cost: f64, volume: i64, multiplier: f64) -> f64 {
    if volume == 0 {
        0.0
    } else {
        cost / (volume as f64 * multiplier)
    }
}

/// Execution price of `order` against `bar`, if it trades.
fn fill_price(order: &Order, bar: &Bar) -> Option<f64> {
    match (order.price_type, order.limit_price) {
        (PriceType::Any, _) => Some(bar.open),
        (PriceType::Limit, Some(limit)) => match order.direction {
            Direction::Buy if bar.open <= limit => Some(bar.open),
            Direction::Sell if bar.open >= limit => Some(bar.open),
            _ if bar.touches(limit) => Some(limit),
            _ => None,
        },
        (PriceType::Limit, None) => None,
    }
}

/// `{data_dir}/{instrument}_{exchange}_{interval}.csv`
pub fn series_path(data_dir: &Path, instrument: &str, exchange: &str, interval_secs: u64) -> PathBuf {
    data_dir.join(format!("{}_{}_{}.csv", instrument, exchange, interval_secs))
}

/// Loads a `datetime,open,high,low,close,volume` CSV, sorted by datetime.
pub fn load_bars(path: &Path) -> Result<Vec<Bar>, TradecheckError> {
    let content = fs::read_to_string(path).map_err(|e| TradecheckError::Data {
        reason: format!("failed to read {}: {}", path.display(), e),
    })?;

    let mut rdr = csv::Reader::from_reader(content.as_bytes());
    let mut bars = Vec::new();

    for (line, result) in rdr.records().enumerate() {
        let record = result.map_err(|e| TradecheckError::Data {
            reason: format!("{}: CSV parse error: {}", path.display(), e),
        })?;
        let at = |column: &str| format!("{} row {} {}", path.display(), line + 1, column);

        let datetime_str = record.get(0).ok_or_else(|| TradecheckError::Data {
            reason: format!("{}: missing", at("datetime")),
        })?;
        let datetime = parse_datetime(datetime_str).ok_or_else(|| TradecheckError::Data {
            reason: format!("{}: invalid value '{}'", at("datetime"), datetime_str),
        })?;

        bars.push(Bar {
            datetime,
            open: parse_field(&record, 1, || at("open"))?,
            high: parse_field(&record, 2, || at("high"))?,
            low: parse_field(&record, 3, || at("low"))?,
            close: parse_field(&record, 4, || at("close"))?,
            volume: parse_field(&record, 5, || at("volume"))?,
        });
    }

    bars.sort_by_key(|b| b.datetime);
    Ok(bars)
}

fn parse_field<T: FromStr>(
    record: &csv::StringRecord,
    index: usize,
    at: impl Fn() -> String,
) -> Result<T, TradecheckError>
where
    T::Err: std::fmt::Display,
{
    let raw = record.get(index).ok_or_else(|| TradecheckError::Data {
        reason: format!("{}: missing", at()),
    })?;
    raw.trim().parse().map_err(|e| TradecheckError::Data {
        reason: format!("{}: invalid value '{}': {}", at(), raw, e),
    })
}

/// RFC3339, `%Y-%m-%d %H:%M:%S` (UTC) or a bare date, as ns since epoch.
fn parse_datetime(value: &str) -> Option<i64> {
    let value = value.trim();
    let utc = if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        dt.to_utc()
    } else if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        naive.and_utc()
    } else {
        NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .ok()?
            .and_hms_opt(0, 0, 0)?
            .and_utc()
    };
    utc.timestamp_nanos_opt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tempfile::TempDir;

    const DAY_NS: i64 = 86_400 * 1_000_000_000;
    const MINUTE_NS: i64 = 60 * 1_000_000_000;
    // 2023-01-02 00:00:00 UTC
    const DAY0: i64 = 1_672_617_600_000_000_000;

    fn bar(datetime: i64, open: f64, high: f64, low: f64, close: f64) -> Bar {
        Bar {
            datetime,
            open,
            high,
            low,
            close,
            volume: 100,
        }
    }

    fn session() -> SessionConfig {
        SessionConfig::default()
    }

    fn settings() -> ReplaySettings {
        ReplaySettings {
            gateway_name: "tqsdk".into(),
            initial_capital: 1_000_000.0,
            commission_per_lot: 2.0,
            multiplier: 200.0,
        }
    }

    fn venue(minute: Vec<Bar>) -> ReplayVenue {
        let daily = vec![
            bar(DAY0, 100.0, 110.0, 90.0, 105.0),
            bar(DAY0 + DAY_NS, 105.0, 115.0, 95.0, 110.0),
        ];
        ReplayVenue::new(&session(), settings(), daily, minute).unwrap()
    }

    fn request(direction: Direction, offset: Offset, limit: f64, volume: i64) -> OrderRequest {
        OrderRequest {
            symbol: "CFFEX.IC2306".into(),
            direction,
            offset,
            price_type: PriceType::Limit,
            limit_price: Some(limit),
            volume,
        }
    }

    fn minute_series() -> Observable {
        Observable::Series {
            symbol: "CFFEX.IC2306".into(),
            interval_secs: 60,
        }
    }

    fn daily_series() -> Observable {
        Observable::Series {
            symbol: "CFFEX.IC2306".into(),
            interval_secs: 86_400,
        }
    }

    #[test]
    fn reveals_one_minute_per_update_then_finishes() {
        let mut venue = venue(vec![
            bar(DAY0, 100.0, 101.0, 99.0, 100.0),
            bar(DAY0 + MINUTE_NS, 100.0, 101.0, 99.0, 100.5),
        ]);

        assert!(venue.series("CFFEX.IC2306", 60).unwrap().is_empty());
        assert!(venue.wait_for_update().unwrap());
        assert_eq!(venue.series("CFFEX.IC2306", 60).unwrap().len(), 1);
        assert_eq!(venue.series("CFFEX.IC2306", 86_400).unwrap().len(), 1);
        assert!(venue.wait_for_update().unwrap());
        assert_eq!(venue.remaining(), 0);

        assert_eq!(venue.wait_for_update(), Err(VenueError::SessionFinished));
        assert!(venue.is_finished());
    }

    #[test]
    fn daily_series_changes_only_when_a_day_starts() {
        let mut venue = venue(vec![
            bar(DAY0, 100.0, 101.0, 99.0, 100.0),
            bar(DAY0 + MINUTE_NS, 100.0, 101.0, 99.0, 100.0),
            bar(DAY0 + DAY_NS, 100.0, 101.0, 99.0, 100.0),
        ]);

        venue.wait_for_update().unwrap();
        assert!(venue.is_changed(&daily_series(), &["datetime"]));
        assert!(venue.is_changed(&Observable::Account, &["balance"]));

        venue.wait_for_update().unwrap();
        assert!(!venue.is_changed(&daily_series(), &["datetime"]));
        assert!(venue.is_changed(&minute_series(), &["datetime"]));
        assert!(!venue.is_changed(&Observable::Account, &["balance", "available"]));

        venue.wait_for_update().unwrap();
        assert!(venue.is_changed(&daily_series(), &["datetime"]));
        assert_eq!(venue.series("CFFEX.IC2306", 86_400).unwrap().len(), 2);
    }

    #[test]
    fn limit_buy_fills_when_low_reaches_price() {
        let mut venue = venue(vec![
            bar(DAY0, 100.0, 101.0, 99.0, 100.0),
            bar(DAY0 + MINUTE_NS, 100.5, 101.0, 100.2, 100.8),
            bar(DAY0 + 2 * MINUTE_NS, 100.5, 101.0, 99.5, 100.0),
        ]);
        venue.wait_for_update().unwrap();
        let order = venue
            .insert_order(&request(Direction::Buy, Offset::Open, 100.0, 2))
            .unwrap();
        assert_eq!(order.status, OrderStatus::Alive);
        assert_eq!(order.insert_date_time, Some(DAY0));

        venue.wait_for_update().unwrap();
        let live = venue.order(&order.order_id).unwrap().unwrap();
        assert_eq!(live.status, OrderStatus::Alive);

        venue.wait_for_update().unwrap();
        let live = venue.order(&order.order_id).unwrap().unwrap();
        assert_eq!(live.status, OrderStatus::Finished);
        assert_eq!(live.volume_left, 0);
        assert_eq!(live.trades.len(), 1);
        assert_relative_eq!(live.trade_price.unwrap(), 100.0);

        let position = venue.position("CFFEX.IC2306").unwrap();
        assert_eq!(position.pos, Some(2));
        assert_relative_eq!(position.open_price_long.unwrap(), 100.0);
        assert!(venue.is_changed(
            &Observable::Position("CFFEX.IC2306".into()),
            &["pos", "position_profit"]
        ));
        assert!(venue.is_changed(&Observable::Account, &["commission"]));
    }

    #[test]
    fn limit_buy_below_open_fills_at_open() {
        let mut venue = venue(vec![
            bar(DAY0, 100.0, 101.0, 99.0, 100.0),
            bar(DAY0 + MINUTE_NS, 99.0, 99.5, 98.0, 99.0),
        ]);
        venue.wait_for_update().unwrap();
        let order = venue
            .insert_order(&request(Direction::Buy, Offset::Open, 100.0, 1))
            .unwrap();
        venue.wait_for_update().unwrap();

        let live = venue.order(&order.order_id).unwrap().unwrap();
        assert_relative_eq!(live.trade_price.unwrap(), 99.0);
    }

    #[test]
    fn round_trip_books_profit_and_commission() {
        let mut venue = venue(vec![
            bar(DAY0, 100.0, 101.0, 99.0, 100.0),
            bar(DAY0 + MINUTE_NS, 100.0, 101.0, 99.0, 100.0),
            bar(DAY0 + 2 * MINUTE_NS, 105.0, 106.0, 104.0, 105.0),
        ]);
        venue.wait_for_update().unwrap();
        venue
            .insert_order(&request(Direction::Buy, Offset::Open, 100.0, 1))
            .unwrap();
        venue.wait_for_update().unwrap();
        venue
            .insert_order(&request(Direction::Sell, Offset::Close, 105.0, 1))
            .unwrap();
        venue.wait_for_update().unwrap();

        let account = venue.account().unwrap();
        // (105 - 100) * 1 lot * 200 - 2 lots of commission
        assert_relative_eq!(account.close_profit.unwrap(), 1_000.0);
        assert_relative_eq!(account.commission.unwrap(), 4.0);
        assert_relative_eq!(account.balance.unwrap(), 1_000_996.0);
        assert_eq!(venue.position("CFFEX.IC2306").unwrap().pos, Some(0));
    }

    #[test]
    fn short_position_float_profit() {
        let mut venue = venue(vec![
            bar(DAY0, 100.0, 101.0, 99.0, 100.0),
            bar(DAY0 + MINUTE_NS, 100.0, 101.0, 99.0, 98.0),
        ]);
        venue.wait_for_update().unwrap();
        venue
            .insert_order(&OrderRequest {
                price_type: PriceType::Any,
                limit_price: None,
                ..request(Direction::Sell, Offset::Open, 0.0, 1)
            })
            .unwrap();
        venue.wait_for_update().unwrap();

        let position = venue.position("CFFEX.IC2306").unwrap();
        assert_eq!(position.pos, Some(-1));
        // opened at 100, last 98
        assert_relative_eq!(position.float_profit.unwrap(), 400.0);
    }

    #[test]
    fn limit_sell_close_fills_when_high_reaches_price() {
        let mut venue = venue(vec![
            bar(DAY0, 100.0, 101.0, 99.0, 100.0),
            bar(DAY0 + MINUTE_NS, 100.0, 101.0, 99.0, 100.0),
            bar(DAY0 + 2 * MINUTE_NS, 100.5, 101.5, 100.0, 101.0),
            bar(DAY0 + 3 * MINUTE_NS, 100.5, 102.5, 100.0, 101.0),
        ]);
        venue.wait_for_update().unwrap();
        venue
            .insert_order(&OrderRequest {
                price_type: PriceType::Any,
                limit_price: None,
                ..request(Direction::Buy, Offset::Open, 0.0, 1)
            })
            .unwrap();
        venue.wait_for_update().unwrap();
        let order = venue
            .insert_order(&request(Direction::Sell, Offset::Close, 102.0, 1))
            .unwrap();

        venue.wait_for_update().unwrap();
        let live = venue.order(&order.order_id).unwrap().unwrap();
        assert_eq!(live.status, OrderStatus::Alive);

        venue.wait_for_update().unwrap();
        let live = venue.order(&order.order_id).unwrap().unwrap();
        assert_eq!(live.status, OrderStatus::Finished);
        assert_relative_eq!(live.trade_price.unwrap(), 102.0);
        // (102 - 100) * 1 lot * 200
        assert_relative_eq!(venue.account().unwrap().close_profit.unwrap(), 400.0);
        assert_eq!(venue.position("CFFEX.IC2306").unwrap().pos, Some(0));
    }

    #[test]
    fn any_order_fills_at_next_open() {
        let mut venue = venue(vec![
            bar(DAY0, 100.0, 101.0, 99.0, 100.0),
            bar(DAY0 + MINUTE_NS, 101.5, 103.0, 98.0, 102.0),
        ]);
        venue.wait_for_update().unwrap();
        let order = venue
            .insert_order(&OrderRequest {
                price_type: PriceType::Any,
                limit_price: None,
                ..request(Direction::Buy, Offset::Open, 0.0, 3)
            })
            .unwrap();
        venue.wait_for_update().unwrap();

        let live = venue.order(&order.order_id).unwrap().unwrap();
        assert_eq!(live.status, OrderStatus::Finished);
        assert_eq!(live.volume_left, 0);
        assert_eq!(live.trades.len(), 1);
        assert_relative_eq!(live.trade_price.unwrap(), 101.5);
        assert_eq!(venue.position("CFFEX.IC2306").unwrap().pos, Some(3));
    }

    #[test]
    fn last_bar_tracks_revealed_bars() {
        let mut venue = venue(vec![
            bar(DAY0, 100.0, 101.0, 99.0, 100.0),
            bar(DAY0 + MINUTE_NS, 100.0, 101.0, 99.0, 100.5),
        ]);
        assert_eq!(venue.last_bar("CFFEX.IC2306", 60).unwrap(), None);

        venue.wait_for_update().unwrap();
        venue.wait_for_update().unwrap();

        let minute = venue.last_bar("CFFEX.IC2306", 60).unwrap().unwrap();
        assert_eq!(minute.datetime, DAY0 + MINUTE_NS);
        let daily = venue.last_bar("CFFEX.IC2306", 86_400).unwrap().unwrap();
        assert_eq!(daily.datetime, DAY0);
        assert!(matches!(
            venue.last_bar("SHFE.rb2310", 60),
            Err(VenueError::UnknownSymbol { .. })
        ));
    }

    #[test]
    fn long_replay_polls_every_minute() {
        use crate::domain::ledger::OrderLedger;
        use crate::domain::poll_cycle::{PollCycleValidator, TrackedStreams};
        use crate::domain::record::{RecordKind, Row};
        use crate::ports::audit_port::AuditPort;

        #[derive(Default)]
        struct CountingAudit {
            rows: usize,
        }

        impl AuditPort for CountingAudit {
            fn append(&mut self, _kind: RecordKind, _row: &Row) -> Result<(), TradecheckError> {
                self.rows += 1;
                Ok(())
            }
        }

        const MINUTES: i64 = 50_000;
        let minute: Vec<Bar> = (0..MINUTES)
            .map(|i| bar(DAY0 + i * MINUTE_NS, 100.0, 101.0, 99.0, 100.0))
            .collect();
        let daily: Vec<Bar> = (0..=MINUTES * MINUTE_NS / DAY_NS)
            .map(|d| bar(DAY0 + d * DAY_NS, 100.0, 101.0, 99.0, 100.0))
            .collect();
        let mut venue = ReplayVenue::new(&session(), settings(), daily, minute).unwrap();
        let mut ledger = OrderLedger::new("tqsdk");
        let mut audit = CountingAudit::default();
        let mut validator = PollCycleValidator::new(
            "tqsdk",
            TrackedStreams {
                symbol: "CFFEX.IC2306".into(),
                daily_interval_secs: 86_400,
                minute_interval_secs: 60,
            },
        );

        while validator.validate(&mut venue, &mut ledger, &mut audit).unwrap() {
            assert!(validator.last_entry().unwrap().m1_changed);
        }

        assert_eq!(validator.cycles(), MINUTES as u64 + 1);
        assert_eq!(audit.rows, MINUTES as usize + 1);
        assert!(venue.is_finished());
        let last = venue.last_bar("CFFEX.IC2306", 60).unwrap().unwrap();
        assert_eq!(last.datetime, DAY0 + (MINUTES - 1) * MINUTE_NS);
    }

    #[test]
    fn closing_without_position_is_rejected() {
        let mut venue = venue(vec![bar(DAY0, 100.0, 101.0, 99.0, 100.0)]);
        venue.wait_for_update().unwrap();

        let err = venue
            .insert_order(&request(Direction::Sell, Offset::Close, 100.0, 1))
            .unwrap_err();
        assert!(matches!(err, VenueError::Rejected { .. }));
    }

    #[test]
    fn unknown_symbol_and_interval_are_errors() {
        let venue = venue(vec![]);
        assert!(matches!(
            venue.position("SHFE.rb2310"),
            Err(VenueError::UnknownSymbol { .. })
        ));
        assert!(matches!(
            venue.series("CFFEX.IC2306", 300),
            Err(VenueError::Failure { .. })
        ));
        assert!(venue.quote("CFFEX.IC2306").is_err());
    }

    #[test]
    fn unknown_order_id_is_none() {
        let mut venue = venue(vec![bar(DAY0, 100.0, 101.0, 99.0, 100.0)]);
        venue.wait_for_update().unwrap();
        let order = venue
            .insert_order(&request(Direction::Buy, Offset::Open, 100.0, 1))
            .unwrap();

        assert!(venue.order(&order.order_id).unwrap().is_some());
        assert!(venue.order("REPLAY_999999").unwrap().is_none());
    }

    #[test]
    fn closed_venue_refuses_updates() {
        let mut venue = venue(vec![bar(DAY0, 100.0, 101.0, 99.0, 100.0)]);
        venue.close().unwrap();
        venue.close().unwrap();
        assert!(venue.is_closed());
        assert_eq!(venue.wait_for_update(), Err(VenueError::Closed));
    }

    #[test]
    fn load_bars_accepts_supported_datetime_formats() {
        let dir = TempDir::new().unwrap();
        let path = series_path(dir.path(), "IC2306", "CFFEX", 60);
        fs::write(
            &path,
            "datetime,open,high,low,close,volume\n\
             2023-01-02 00:01:00,100.5,101.0,100.0,100.8,12\n\
             2023-01-02T00:00:00Z,100.0,101.0,99.0,100.5,10\n\
             2023-01-03,101.0,102.0,100.0,101.5,8\n",
        )
        .unwrap();

        let bars = load_bars(&path).unwrap();

        assert_eq!(bars.len(), 3);
        assert_eq!(bars[0].datetime, DAY0);
        assert_eq!(bars[1].datetime, DAY0 + MINUTE_NS);
        assert_eq!(bars[2].datetime, DAY0 + DAY_NS);
        assert_relative_eq!(bars[1].close, 100.8);
        assert_eq!(bars[1].volume, 12);
    }

    #[test]
    fn load_bars_reports_bad_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.csv");
        fs::write(&path, "datetime,open,high,low,close,volume\n2023-01-02,abc,1,1,1,1\n").unwrap();

        let err = load_bars(&path).unwrap_err();
        assert!(matches!(&err, TradecheckError::Data { reason } if reason.contains("open")));
    }

    #[test]
    fn load_bars_missing_file_is_data_error() {
        let dir = TempDir::new().unwrap();
        let result = load_bars(&dir.path().join("missing.csv"));
        assert!(matches!(result, Err(TradecheckError::Data { .. })));
    }
}
