//! Strategy session driver.
//!
//! Runs the polling loop: one validated cycle per venue update, then audit
//! snapshots of whatever changed, order placement for a pending plan,
//! reconciliation whenever the ledger moves, and strategy evaluation on each
//! new daily bar. The venue is closed exactly once however the session ends.

use chrono::NaiveDate;
use tracing::{error, info, warn};

use super::error::{TradecheckError, VenueError};
use super::ledger::OrderLedger;
use super::order::{OrderRequest, PriceType};
use super::poll_cycle::{PollCycleValidator, TrackedStreams};
use super::reconciler::SignalReconciler;
use super::record::{CycleVerdict, MatchStatus};
use crate::ports::audit_port::AuditPort;
use crate::ports::strategy_port::{Intent, StrategyPort};
use crate::ports::venue_port::{Observable, VenuePort};

#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub gateway_name: String,
    pub symbol: String,
    pub daily_interval_secs: u64,
    pub minute_interval_secs: u64,
    /// Age limit of orders offered to the reconciler.
    pub recent_window_secs: u64,
    /// Abort after this many failed cycles in a row; 0 never aborts.
    pub max_consecutive_failures: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            gateway_name: "tqsdk".to_string(),
            symbol: "CFFEX.IC2306".to_string(),
            daily_interval_secs: 86_400,
            minute_interval_secs: 60,
            recent_window_secs: 300,
            max_consecutive_failures: 0,
        }
    }
}

/// An intent waiting for its first eligible minute bar.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderPlan {
    pub intent: Intent,
    pub not_before: NaiveDate,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSummary {
    pub cycles: u64,
    pub failed_cycles: u64,
    pub orders: usize,
    pub matched: usize,
    pub mismatched: usize,
    pub pending_signals: usize,
}

pub struct Session<V: VenuePort, A: AuditPort> {
    config: SessionConfig,
    venue: V,
    audit: A,
    ledger: OrderLedger,
    reconciler: SignalReconciler,
    validator: PollCycleValidator,
    plan: Option<OrderPlan>,
    summary: SessionSummary,
    closed: bool,
}

impl<V: VenuePort, A: AuditPort> Session<V, A> {
    pub fn new(config: SessionConfig, venue: V, audit: A) -> Self {
        let streams = TrackedStreams {
            symbol: config.symbol.clone(),
            daily_interval_secs: config.daily_interval_secs,
            minute_interval_secs: config.minute_interval_secs,
        };
        Session {
            ledger: OrderLedger::new(config.gateway_name.clone()),
            reconciler: SignalReconciler::new(config.gateway_name.clone()),
            validator: PollCycleValidator::new(config.gateway_name.clone(), streams),
            config,
            venue,
            audit,
            plan: None,
            summary: SessionSummary::default(),
            closed: false,
        }
    }

    pub fn venue(&self) -> &V {
        &self.venue
    }

    pub fn audit(&self) -> &A {
        &self.audit
    }

    pub fn ledger(&self) -> &OrderLedger {
        &self.ledger
    }

    pub fn reconciler(&self) -> &SignalReconciler {
        &self.reconciler
    }

    pub fn reconciler_mut(&mut self) -> &mut SignalReconciler {
        &mut self.reconciler
    }

    pub fn validator(&self) -> &PollCycleValidator {
        &self.validator
    }

    pub fn pending_plan(&self) -> Option<&OrderPlan> {
        self.plan.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Runs until the venue finishes or an unrecoverable error occurs.
    ///
    /// Whatever the outcome, pending signals get a last reconciliation pass
    /// and the venue is closed. The first error encountered is returned.
    pub fn run(&mut self, strategy: &mut dyn StrategyPort) -> Result<SessionSummary, TradecheckError> {
        let driven = self.drive(strategy);
        if let Err(err) = &driven {
            error!(error = %err, "session aborted");
        }
        let reconciled = self.final_reconciliation();
        let closed = self.close();
        driven?;
        reconciled?;
        closed?;

        let summary = self.summary();
        info!(
            cycles = summary.cycles,
            failed_cycles = summary.failed_cycles,
            orders = summary.orders,
            matched = summary.matched,
            mismatched = summary.mismatched,
            pending_signals = summary.pending_signals,
            "session finished"
        );
        Ok(summary)
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            cycles: self.validator.cycles(),
            orders: self.ledger.len(),
            pending_signals: self.reconciler.pending().len(),
            ..self.summary.clone()
        }
    }

    /// Releases the venue. Later calls are no-ops.
    pub fn close(&mut self) -> Result<(), TradecheckError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.venue.close()?;
        info!("venue closed");
        Ok(())
    }

    fn drive(&mut self, strategy: &mut dyn StrategyPort) -> Result<(), TradecheckError> {
        let mut consecutive_failures = 0u32;
        loop {
            let updated =
                self.validator
                    .validate(&mut self.venue, &mut self.ledger, &mut self.audit)?;
            // the FAIL row written when a bounded session ends is not counted
            let failed = !self.venue.is_finished()
                && self
                    .validator
                    .last_entry()
                    .is_some_and(|e| e.validation_status == CycleVerdict::Fail);
            if failed {
                self.summary.failed_cycles += 1;
                consecutive_failures += 1;
            } else {
                consecutive_failures = 0;
            }

            if !updated {
                if self.venue.is_finished() {
                    return Ok(());
                }
                let limit = self.config.max_consecutive_failures;
                if failed && limit > 0 && consecutive_failures >= limit {
                    return Err(VenueError::Failure {
                        reason: format!("{consecutive_failures} consecutive failed cycles"),
                    }
                    .into());
                }
                continue;
            }
            self.step(strategy)?;
        }
    }

    fn step(&mut self, strategy: &mut dyn StrategyPort) -> Result<(), TradecheckError> {
        let symbol = self.config.symbol.clone();

        if self
            .venue
            .is_changed(&Observable::Account, &["balance", "available"])
        {
            let account = self.venue.account()?;
            self.audit.write(&account)?;
        }

        if self
            .venue
            .is_changed(&Observable::Position(symbol.clone()), &["pos", "position_profit"])
        {
            let position = self.venue.position(&symbol)?;
            self.audit.write(&position)?;
        }

        let minute = Observable::Series {
            symbol: symbol.clone(),
            interval_secs: self.config.minute_interval_secs,
        };
        if self.plan.is_some() && self.venue.is_changed(&minute, &["datetime"]) {
            self.place_planned_order()?;
        }

        let cycle_saw_orders_change = self
            .validator
            .last_entry()
            .is_some_and(|e| e.orders_changed);
        if self.ledger.has_changed() || cycle_saw_orders_change {
            self.reconcile()?;
        }

        let daily = Observable::Series {
            symbol,
            interval_secs: self.config.daily_interval_secs,
        };
        if self.venue.is_changed(&daily, &["datetime"]) {
            self.on_daily_bar(strategy)?;
        }
        Ok(())
    }

    fn place_planned_order(&mut self) -> Result<(), TradecheckError> {
        let Some(plan) = self.plan.clone() else {
            return Ok(());
        };
        let symbol = &self.config.symbol;
        let (day, price) = match self.venue.last_bar(symbol, self.config.minute_interval_secs)? {
            Some(bar) => (bar.trading_day(), bar.open),
            None => {
                let quote = self.venue.quote(symbol)?;
                let day = chrono::DateTime::<chrono::Utc>::from_timestamp_nanos(quote.datetime)
                    .date_naive();
                (day, quote.last_price)
            }
        };
        if day < plan.not_before {
            return Ok(());
        }

        let request = OrderRequest {
            symbol: symbol.clone(),
            direction: plan.intent.direction,
            offset: plan.intent.offset,
            price_type: PriceType::Limit,
            limit_price: Some(price),
            volume: plan.intent.volume,
        };
        self.plan = None;
        match self.venue.insert_order(&request) {
            Ok(order) => {
                info!(
                    order_id = %order.order_id,
                    direction = %request.direction,
                    offset = %request.offset,
                    volume = request.volume,
                    price,
                    "order placed"
                );
                self.ledger.record(order)
            }
            Err(VenueError::Rejected { reason }) => {
                warn!(%reason, direction = %request.direction, "planned order rejected");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    fn reconcile(&mut self) -> Result<(), TradecheckError> {
        let pool = self.ledger.recent_orders(self.config.recent_window_secs);
        for entry in self.reconciler.validate_orders(&pool) {
            match entry.status {
                MatchStatus::Matched => self.summary.matched += 1,
                MatchStatus::Mismatch => self.summary.mismatched += 1,
            }
            self.audit.write(&entry)?;
        }
        Ok(())
    }

    fn on_daily_bar(&mut self, strategy: &mut dyn StrategyPort) -> Result<(), TradecheckError> {
        let series = self
            .venue
            .series(&self.config.symbol, self.config.daily_interval_secs)?;
        if let Some(bar) = series.last() {
            if let Some(intent) = strategy.on_daily_bar(bar, &series) {
                let day = bar.trading_day();
                let not_before = day.succ_opt().unwrap_or(day);
                info!(
                    direction = %intent.direction,
                    offset = %intent.offset,
                    volume = intent.volume,
                    %not_before,
                    "signal planned"
                );
                self.reconciler
                    .record_expected_signal(intent.direction, intent.offset, intent.volume);
                self.plan = Some(OrderPlan { intent, not_before });
            }
        }
        self.ledger.snapshot_all().write_to(&mut self.audit)
    }

    fn final_reconciliation(&mut self) -> Result<(), TradecheckError> {
        if self.reconciler.pending().is_empty() {
            return Ok(());
        }
        self.reconcile()?;
        let left = self.reconciler.pending().len();
        if left > 0 {
            warn!(pending = left, "signals left unmatched at session end");
        }
        Ok(())
    }
}

impl<V: VenuePort, A: AuditPort> Drop for Session<V, A> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            error!(error = %err, "failed to close venue");
        }
    }
}
