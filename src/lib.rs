//! tradecheck: strategy session runner with a reconciliation audit trail.
//!
//! On every venue update the session records which data streams changed,
//! matches the strategy's expected signals against the orders actually
//! placed, and appends every decision to CSV audit stores.
//!
//! Hexagonal architecture: domain logic in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`].

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod ports;
