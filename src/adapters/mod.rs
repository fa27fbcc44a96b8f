//! Concrete adapter implementations for ports.

pub mod csv_audit_adapter;
pub mod csv_sink;
pub mod file_config_adapter;
pub mod replay_venue;
pub mod scheduled_strategy;
