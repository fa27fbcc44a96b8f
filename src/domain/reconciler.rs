//! Matching expected signals against recently placed orders.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::ledger::RecentOrder;
use super::order::{Direction, Offset};
use super::record::{MatchStatus, ValidationLogEntry, audit_timestamp};

pub const ORDER_VALIDATION: &str = "ORDER_VALIDATION";

/// A trading intent the strategy expects to see realised as an order.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpectedSignal {
    pub direction: Direction,
    pub offset: Offset,
    pub volume: i64,
    pub created_at: DateTime<Utc>,
}

impl ExpectedSignal {
    /// Exact equality on (direction, offset, volume).
    pub fn matches(&self, order: &RecentOrder) -> bool {
        self.direction == order.direction
            && self.offset == order.offset
            && self.volume == order.volume
    }
}

/// FIFO queue of expected signals, drained as matching orders appear.
#[derive(Debug)]
pub struct SignalReconciler {
    gateway_name: String,
    pending: Vec<ExpectedSignal>,
}

impl SignalReconciler {
    pub fn new(gateway_name: impl Into<String>) -> Self {
        SignalReconciler {
            gateway_name: gateway_name.into(),
            pending: Vec::new(),
        }
    }

    pub fn record_expected_signal(&mut self, direction: Direction, offset: Offset, volume: i64) {
        debug!(%direction, %offset, volume, "reconciler: expected signal recorded");
        self.pending.push(ExpectedSignal {
            direction,
            offset,
            volume,
            created_at: Utc::now(),
        });
    }

    /// Signals still waiting for an order, in arrival order.
    pub fn pending(&self) -> &[ExpectedSignal] {
        &self.pending
    }

    /// Removes and returns every pending signal.
    pub fn flush(&mut self) -> Vec<ExpectedSignal> {
        std::mem::take(&mut self.pending)
    }

    /// Resolves each pending signal against `pool`, one entry per signal.
    ///
    /// A signal matches the first order in `pool` with the same direction,
    /// offset and volume and is then dropped from the queue. Signals without a
    /// match stay queued and are reported as MISMATCH again on every call.
    pub fn validate_orders(&mut self, pool: &[RecentOrder]) -> Vec<ValidationLogEntry> {
        let mut entries = Vec::with_capacity(self.pending.len());
        let mut still_pending = Vec::new();

        for signal in std::mem::take(&mut self.pending) {
            match pool.iter().find(|order| signal.matches(order)) {
                Some(order) => entries.push(self.matched(&signal, order)),
                None => {
                    entries.push(self.mismatched(&signal));
                    still_pending.push(signal);
                }
            }
        }
        self.pending = still_pending;

        if !entries.is_empty() {
            let matched = entries
                .iter()
                .filter(|e| e.status == MatchStatus::Matched)
                .count();
            info!(
                matched,
                mismatched = entries.len() - matched,
                pool = pool.len(),
                "reconciler: signals validated"
            );
        }
        entries
    }

    fn matched(&self, signal: &ExpectedSignal, order: &RecentOrder) -> ValidationLogEntry {
        ValidationLogEntry {
            gateway_name: self.gateway_name.clone(),
            event_type: ORDER_VALIDATION.to_string(),
            signal_direction: signal.direction,
            signal_offset: signal.offset,
            signal_volume: signal.volume,
            order_id: Some(order.order_id.clone()),
            order_direction: Some(order.direction),
            order_offset: Some(order.offset),
            order_volume: Some(order.volume),
            status: MatchStatus::Matched,
            message: format!("Signal matched order {}", order.order_id),
            ts: audit_timestamp(),
        }
    }

    fn mismatched(&self, signal: &ExpectedSignal) -> ValidationLogEntry {
        ValidationLogEntry {
            gateway_name: self.gateway_name.clone(),
            event_type: ORDER_VALIDATION.to_string(),
            signal_direction: signal.direction,
            signal_offset: signal.offset,
            signal_volume: signal.volume,
            order_id: None,
            order_direction: None,
            order_offset: None,
            order_volume: None,
            status: MatchStatus::Mismatch,
            message: "Expected signal not matched by any order".to_string(),
            ts: audit_timestamp(),
        }
    }
}
