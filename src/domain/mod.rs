//! Core domain types and logic.

pub mod change_tracker;
pub mod config_validation;
pub mod error;
pub mod ledger;
pub mod ohlcv;
pub mod order;
pub mod poll_cycle;
pub mod reconciler;
pub mod record;
pub mod session;
