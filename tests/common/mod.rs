#![allow(dead_code)]

use std::cell::Cell;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::rc::Rc;

use chrono::NaiveDate;
use tradecheck::domain::error::{TradecheckError, VenueError};
use tradecheck::domain::ohlcv::{Bar, Quote};
use tradecheck::domain::order::{Direction, Offset, Order, OrderRequest, OrderStatus};
use tradecheck::domain::record::{AccountSnapshot, PositionSnapshot, RecordKind, Row};
use tradecheck::domain::session::SessionConfig;
use tradecheck::ports::audit_port::AuditPort;
use tradecheck::ports::strategy_port::Intent;
use tradecheck::ports::venue_port::{Observable, VenuePort};

pub const SYMBOL: &str = "CFFEX.IC2306";
pub const DAY_NS: i64 = 86_400 * 1_000_000_000;
pub const MINUTE_NS: i64 = 60 * 1_000_000_000;
/// 2023-01-02 00:00:00 UTC
pub const DAY0: i64 = 1_672_617_600_000_000_000;

pub fn bar(datetime: i64, open: f64) -> Bar {
    Bar {
        datetime,
        open,
        high: open + 1.0,
        low: open - 1.0,
        close: open,
        volume: 10,
    }
}

pub fn day(n: i64) -> i64 {
    DAY0 + n * DAY_NS
}

pub fn date(n: u64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 1, 2)
        .unwrap()
        .checked_add_days(chrono::Days::new(n))
        .unwrap()
}

pub fn intent(direction: Direction, offset: Offset, volume: i64) -> Intent {
    Intent {
        direction,
        offset,
        volume,
    }
}

pub fn session_config() -> SessionConfig {
    SessionConfig {
        symbol: SYMBOL.to_string(),
        ..SessionConfig::default()
    }
}

/// What one scripted `wait_for_update` delivers.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    pub daily: Option<Bar>,
    pub minute: Option<Bar>,
    pub balance: Option<f64>,
    pub pos: Option<i64>,
    pub fill_alive_orders: bool,
}

#[derive(Debug, Clone)]
pub enum Step {
    Update(Frame),
    NoUpdate,
    Fail(VenueError),
}

/// Venue double driven by a fixed list of steps; finishes when they run out.
pub struct ScriptedVenue {
    steps: VecDeque<Step>,
    daily: Vec<Bar>,
    minute: Vec<Bar>,
    balance: f64,
    pos: i64,
    orders: BTreeMap<String, Order>,
    changes: HashMap<Observable, HashSet<&'static str>>,
    pub placed: Vec<OrderRequest>,
    pub reject_orders: bool,
    finished: bool,
    closes: Rc<Cell<u32>>,
}

impl ScriptedVenue {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: steps.into(),
            daily: Vec::new(),
            minute: Vec::new(),
            balance: 1_000_000.0,
            pos: 0,
            orders: BTreeMap::new(),
            changes: HashMap::new(),
            placed: Vec::new(),
            reject_orders: false,
            finished: false,
            closes: Rc::new(Cell::new(0)),
        }
    }

    pub fn rejecting(mut self) -> Self {
        self.reject_orders = true;
        self
    }

    /// Shared counter of `close` calls, readable after the venue is dropped.
    pub fn close_counter(&self) -> Rc<Cell<u32>> {
        Rc::clone(&self.closes)
    }

    fn mark(&mut self, observable: Observable, field: &'static str) {
        self.changes.entry(observable).or_default().insert(field);
    }
}

impl VenuePort for ScriptedVenue {
    fn wait_for_update(&mut self) -> Result<bool, VenueError> {
        self.changes.clear();
        let frame = match self.steps.pop_front() {
            None => {
                self.finished = true;
                return Err(VenueError::SessionFinished);
            }
            Some(Step::Fail(err)) => return Err(err),
            Some(Step::NoUpdate) => return Ok(false),
            Some(Step::Update(frame)) => frame,
        };

        if let Some(bar) = frame.daily {
            self.daily.push(bar);
            self.mark(
                Observable::Series {
                    symbol: SYMBOL.to_string(),
                    interval_secs: 86_400,
                },
                "datetime",
            );
        }
        if let Some(bar) = frame.minute {
            self.minute.push(bar);
            self.mark(
                Observable::Series {
                    symbol: SYMBOL.to_string(),
                    interval_secs: 60,
                },
                "datetime",
            );
        }
        if let Some(balance) = frame.balance {
            self.balance = balance;
            self.mark(Observable::Account, "balance");
        }
        if let Some(pos) = frame.pos {
            self.pos = pos;
            self.mark(Observable::Position(SYMBOL.to_string()), "pos");
        }
        if frame.fill_alive_orders {
            for order in self.orders.values_mut().filter(|o| !o.is_finished()) {
                order.volume_left = 0;
                order.status = OrderStatus::Finished;
                order.is_dead = true;
            }
        }
        Ok(true)
    }

    fn is_changed(&self, observable: &Observable, fields: &[&str]) -> bool {
        self.changes
            .get(observable)
            .is_some_and(|changed| fields.iter().any(|f| changed.contains(*f)))
    }

    fn account(&self) -> Result<AccountSnapshot, VenueError> {
        Ok(AccountSnapshot {
            balance: Some(self.balance),
            available: Some(self.balance),
            ..AccountSnapshot::new("tqsdk")
        })
    }

    fn position(&self, _symbol: &str) -> Result<PositionSnapshot, VenueError> {
        Ok(PositionSnapshot {
            pos: Some(self.pos),
            ..PositionSnapshot::new("tqsdk", "CFFEX", "IC2306")
        })
    }

    fn series(&self, _symbol: &str, interval_secs: u64) -> Result<Vec<Bar>, VenueError> {
        Ok(if interval_secs == 86_400 {
            self.daily.clone()
        } else {
            self.minute.clone()
        })
    }

    fn quote(&self, symbol: &str) -> Result<Quote, VenueError> {
        Err(VenueError::Failure {
            reason: format!("no quote for {symbol}"),
        })
    }

    fn insert_order(&mut self, request: &OrderRequest) -> Result<Order, VenueError> {
        if self.reject_orders {
            return Err(VenueError::Rejected {
                reason: "scripted rejection".to_string(),
            });
        }
        self.placed.push(request.clone());
        let order = Order::new(format!("O{}", self.placed.len()), request);
        self.orders.insert(order.order_id.clone(), order.clone());
        Ok(order)
    }

    fn order(&self, order_id: &str) -> Result<Option<Order>, VenueError> {
        Ok(self.orders.get(order_id).cloned())
    }

    fn is_finished(&self) -> bool {
        self.finished
    }

    fn close(&mut self) -> Result<(), VenueError> {
        self.closes.set(self.closes.get() + 1);
        Ok(())
    }
}

/// Audit port keeping rows in memory; can be told to fail after N appends.
#[derive(Default)]
pub struct MemoryAudit {
    pub rows: Vec<(RecordKind, Row)>,
    pub fail_after: Option<usize>,
}

impl MemoryAudit {
    pub fn failing_after(n: usize) -> Self {
        Self {
            rows: Vec::new(),
            fail_after: Some(n),
        }
    }

    pub fn of(&self, kind: RecordKind) -> Vec<&Row> {
        self.rows
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, row)| row)
            .collect()
    }
}

impl AuditPort for MemoryAudit {
    fn append(&mut self, kind: RecordKind, row: &Row) -> Result<(), TradecheckError> {
        if self.fail_after.is_some_and(|n| self.rows.len() >= n) {
            return Err(TradecheckError::SinkIo {
                path: kind.file_name().into(),
                source: std::io::Error::other("disk full"),
            });
        }
        self.rows.push((kind, row.clone()));
        Ok(())
    }
}
