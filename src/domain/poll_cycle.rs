//! One polling cycle: wait for the venue, detect what changed, audit it.
//!
//! Every call to [`PollCycleValidator::validate`] appends exactly one
//! wait-update record, whether the venue delivered data, delivered nothing or
//! failed. Venue failures end up in that record and never reach the caller;
//! only a failure to write the record itself does.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::change_tracker::ChangeTracker;
use super::error::{TradecheckError, VenueError};
use super::ledger::OrderLedger;
use super::record::{CycleVerdict, VenueStatus, WaitUpdateLogEntry, audit_timestamp};
use crate::ports::audit_port::AuditPort;
use crate::ports::venue_port::VenuePort;

/// The market-data series a validator watches.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedStreams {
    pub symbol: String,
    pub daily_interval_secs: u64,
    pub minute_interval_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Awaiting,
}

/// Per-stream change flags for one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleFlags {
    pub d1: bool,
    pub m1: bool,
    pub account: bool,
    pub position: bool,
    pub orders: bool,
}

impl CycleFlags {
    pub fn any(&self) -> bool {
        self.d1 || self.m1 || self.account || self.position || self.orders
    }
}

#[derive(Debug)]
pub struct PollCycleValidator {
    gateway_name: String,
    streams: TrackedStreams,
    update_id: u64,
    state: CycleState,
    d1: ChangeTracker<Option<i64>>,
    m1: ChangeTracker<Option<i64>>,
    account: ChangeTracker<Option<f64>>,
    position: ChangeTracker<Option<i64>>,
    last_entry: Option<WaitUpdateLogEntry>,
}

impl PollCycleValidator {
    pub fn new(gateway_name: impl Into<String>, streams: TrackedStreams) -> Self {
        PollCycleValidator {
            gateway_name: gateway_name.into(),
            streams,
            update_id: 0,
            state: CycleState::Idle,
            d1: ChangeTracker::new(),
            m1: ChangeTracker::new(),
            account: ChangeTracker::new(),
            position: ChangeTracker::new(),
            last_entry: None,
        }
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    /// Number of cycles run so far; also the id of the latest record.
    pub fn cycles(&self) -> u64 {
        self.update_id
    }

    /// The record written by the most recent cycle.
    pub fn last_entry(&self) -> Option<&WaitUpdateLogEntry> {
        self.last_entry.as_ref()
    }

    /// Runs one cycle and returns the venue's "new data arrived" flag.
    ///
    /// Returns `Ok(false)` when the venue failed; the failure is recorded as
    /// an ERROR/FAIL entry. Errors are returned only for audit write failures
    /// and ledger inconsistencies.
    pub fn validate(
        &mut self,
        venue: &mut dyn VenuePort,
        ledger: &mut OrderLedger,
        audit: &mut dyn AuditPort,
    ) -> Result<bool, TradecheckError> {
        self.update_id += 1;
        self.state = CycleState::Awaiting;
        let started = Instant::now();
        let waited = venue.wait_for_update();
        let elapsed = started.elapsed();
        self.state = CycleState::Idle;

        let updated = match waited {
            Ok(updated) => updated,
            Err(err) => {
                self.log_venue_error(&err);
                let entry = self.failed(format!("wait_update failed: {err}"));
                return self.finish(entry, audit);
            }
        };

        let flags = match self.observe(&*venue, ledger) {
            Ok(flags) => flags,
            Err(TradecheckError::Venue(err)) => {
                self.log_venue_error(&err);
                let entry = self.failed(format!("change check failed: {err}"));
                return self.finish(entry, audit);
            }
            Err(other) => return Err(other),
        };

        let entry = self.passed(updated, elapsed, flags);
        self.finish(entry, audit)
    }

    /// Reads every stream first, then updates the trackers, so a failed read
    /// leaves all trackers untouched.
    fn observe(
        &mut self,
        venue: &dyn VenuePort,
        ledger: &mut OrderLedger,
    ) -> Result<CycleFlags, TradecheckError> {
        let symbol = &self.streams.symbol;
        let d1 = venue
            .last_bar(symbol, self.streams.daily_interval_secs)?
            .map(|bar| bar.datetime);
        let m1 = venue
            .last_bar(symbol, self.streams.minute_interval_secs)?
            .map(|bar| bar.datetime);
        let balance = venue.account()?.balance;
        let pos = venue.position(symbol)?.pos;
        ledger.sync_from(venue)?;

        Ok(CycleFlags {
            d1: self.d1.check_changed(d1),
            m1: self.m1.check_changed(m1),
            account: self.account.check_changed(balance),
            position: self.position.check_changed(pos),
            orders: ledger.has_changed(),
        })
    }

    fn passed(&self, updated: bool, elapsed: Duration, flags: CycleFlags) -> WaitUpdateLogEntry {
        WaitUpdateLogEntry {
            gateway_name: self.gateway_name.clone(),
            update_id: self.update_id,
            duration_ms: round_ms(elapsed),
            has_changes: flags.any(),
            d1_changed: flags.d1,
            m1_changed: flags.m1,
            account_changed: flags.account,
            position_changed: flags.position,
            orders_changed: flags.orders,
            tqsdk_status: if updated {
                VenueStatus::Ok
            } else {
                VenueStatus::NoUpdate
            },
            validation_status: CycleVerdict::Pass,
            message: "Validation passed".to_string(),
            ts: audit_timestamp(),
        }
    }

    fn failed(&self, message: String) -> WaitUpdateLogEntry {
        WaitUpdateLogEntry {
            gateway_name: self.gateway_name.clone(),
            update_id: self.update_id,
            duration_ms: 0.0,
            has_changes: false,
            d1_changed: false,
            m1_changed: false,
            account_changed: false,
            position_changed: false,
            orders_changed: false,
            tqsdk_status: VenueStatus::Error,
            validation_status: CycleVerdict::Fail,
            message,
            ts: audit_timestamp(),
        }
    }

    fn finish(
        &mut self,
        entry: WaitUpdateLogEntry,
        audit: &mut dyn AuditPort,
    ) -> Result<bool, TradecheckError> {
        audit.write(&entry)?;
        debug!(
            update_id = entry.update_id,
            duration_ms = entry.duration_ms,
            has_changes = entry.has_changes,
            status = entry.tqsdk_status.as_str(),
            "cycle recorded"
        );
        let updated = entry.tqsdk_status == VenueStatus::Ok;
        self.last_entry = Some(entry);
        Ok(updated)
    }

    fn log_venue_error(&self, err: &VenueError) {
        match err {
            VenueError::SessionFinished => {
                info!(update_id = self.update_id, "venue reports session finished")
            }
            _ => warn!(update_id = self.update_id, error = %err, "venue call failed"),
        }
    }
}

/// Milliseconds rounded to two decimals.
fn round_ms(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 100_000.0).round() / 100.0
}
