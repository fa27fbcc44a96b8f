//! Registry of the orders placed during one session.
//!
//! The ledger is the only owner of order and fill state inside the core. It
//! produces full row snapshots on demand, the trailing window of recently
//! placed orders used as the reconciliation pool, and the aggregate
//! "did anything about the orders change" signal the poll cycle consumes.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use super::change_tracker::ChangeTracker;
use super::error::TradecheckError;
use super::order::{Direction, Offset, Order, OrderStatus};
use super::record::{OrderRecord, TradeRecord};
use crate::ports::audit_port::AuditPort;
use crate::ports::venue_port::VenuePort;

/// The reconciliation view of a placed order.
#[derive(Debug, Clone, PartialEq)]
pub struct RecentOrder {
    pub order_id: String,
    pub direction: Direction,
    pub offset: Offset,
    pub volume: i64,
    pub placed_at: DateTime<Utc>,
}

/// Full-state dump of the ledger, ready to append.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedgerSnapshot {
    pub orders: Vec<OrderRecord>,
    pub trades: Vec<TradeRecord>,
}

impl LedgerSnapshot {
    pub fn write_to(&self, audit: &mut dyn AuditPort) -> Result<(), TradecheckError> {
        for order in &self.orders {
            audit.write(order)?;
        }
        for trade in &self.trades {
            audit.write(trade)?;
        }
        Ok(())
    }
}

type OrderState = BTreeMap<String, (OrderStatus, i64)>;

#[derive(Debug, Clone)]
struct Entry {
    order: Order,
    placed_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct OrderLedger {
    gateway_name: String,
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
    state: ChangeTracker<OrderState>,
}

impl OrderLedger {
    pub fn new(gateway_name: impl Into<String>) -> Self {
        OrderLedger {
            gateway_name: gateway_name.into(),
            entries: Vec::new(),
            index: HashMap::new(),
            state: ChangeTracker::seeded(OrderState::new()),
        }
    }

    pub fn gateway_name(&self) -> &str {
        &self.gateway_name
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, order_id: &str) -> Option<&Order> {
        self.index.get(order_id).map(|&i| &self.entries[i].order)
    }

    /// Orders in placement order.
    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        self.entries.iter().map(|e| &e.order)
    }

    /// Registers a newly placed order, stamped with the current time.
    pub fn record(&mut self, order: Order) -> Result<(), TradecheckError> {
        self.record_at(order, Utc::now())
    }

    pub fn record_at(
        &mut self,
        order: Order,
        placed_at: DateTime<Utc>,
    ) -> Result<(), TradecheckError> {
        if self.index.contains_key(&order.order_id) {
            return Err(TradecheckError::LedgerConflict {
                order_id: order.order_id,
            });
        }
        order
            .check_volumes()
            .map_err(|reason| TradecheckError::OrderInvariant {
                order_id: order.order_id.clone(),
                reason,
            })?;

        debug!(
            order_id = %order.order_id,
            direction = %order.direction,
            offset = %order.offset,
            volume = order.volume_orign,
            "ledger: order recorded"
        );
        self.index.insert(order.order_id.clone(), self.entries.len());
        self.entries.push(Entry { order, placed_at });
        Ok(())
    }

    /// Replaces the live state of a tracked order.
    ///
    /// Finished orders are frozen; updates to them are ignored. Returns whether
    /// the stored state changed.
    pub fn apply_update(&mut self, update: Order) -> Result<bool, TradecheckError> {
        let Some(&i) = self.index.get(&update.order_id) else {
            return Err(TradecheckError::OrderInvariant {
                order_id: update.order_id,
                reason: "order is not registered in the ledger".into(),
            });
        };
        let current = &mut self.entries[i].order;
        if current.is_finished() {
            return Ok(false);
        }
        if update.direction != current.direction
            || update.offset != current.offset
            || update.volume_orign != current.volume_orign
        {
            return Err(TradecheckError::OrderInvariant {
                order_id: update.order_id,
                reason: "direction, offset and original volume are immutable".into(),
            });
        }
        update
            .check_volumes()
            .map_err(|reason| TradecheckError::OrderInvariant {
                order_id: update.order_id.clone(),
                reason,
            })?;

        if *current == update {
            return Ok(false);
        }
        *current = update;
        Ok(true)
    }

    /// Pulls the latest state of every unfinished order from the venue.
    pub fn sync_from(&mut self, venue: &dyn VenuePort) -> Result<usize, TradecheckError> {
        let alive: Vec<String> = self
            .entries
            .iter()
            .filter(|e| !e.order.is_finished())
            .map(|e| e.order.order_id.clone())
            .collect();

        let mut updated = 0;
        for order_id in alive {
            if let Some(order) = venue.order(&order_id)? {
                if self.apply_update(order)? {
                    updated += 1;
                }
            }
        }
        Ok(updated)
    }

    /// One order row per order and one trade row per fill. Read-only.
    pub fn snapshot_all(&self) -> LedgerSnapshot {
        let mut snapshot = LedgerSnapshot::default();
        for entry in &self.entries {
            let order = &entry.order;
            snapshot
                .orders
                .push(OrderRecord::from_order(&self.gateway_name, order));
            snapshot.trades.extend(
                order
                    .trades
                    .values()
                    .map(|trade| TradeRecord::from_trade(&self.gateway_name, &order.order_id, trade)),
            );
        }
        snapshot
    }

    /// Orders placed within the last `max_age_secs`, oldest first.
    pub fn recent_orders(&self, max_age_secs: u64) -> Vec<RecentOrder> {
        self.recent_orders_at(Utc::now(), max_age_secs)
    }

    pub fn recent_orders_at(&self, now: DateTime<Utc>, max_age_secs: u64) -> Vec<RecentOrder> {
        let max_age = i64::try_from(max_age_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX);
        let mut recent: Vec<RecentOrder> = self
            .entries
            .iter()
            .filter(|e| now - e.placed_at <= max_age)
            .map(|e| RecentOrder {
                order_id: e.order.order_id.clone(),
                direction: e.order.direction,
                offset: e.order.offset,
                volume: e.order.volume_orign,
                placed_at: e.placed_at,
            })
            .collect();
        recent.sort_by_key(|r| r.placed_at);
        recent
    }

    /// Whether any order's `(status, volume_left)` differs from the previous
    /// call, including orders that appeared since then.
    pub fn has_changed(&mut self) -> bool {
        let current: OrderState = self
            .entries
            .iter()
            .map(|e| (e.order.order_id.clone(), (e.order.status, e.order.volume_left)))
            .collect();
        self.state.check_changed(current)
    }
}
