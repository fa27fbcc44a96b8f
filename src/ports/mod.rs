//! Port traits: the boundaries between the reconciliation core and the outside.

pub mod audit_port;
pub mod config_port;
pub mod strategy_port;
pub mod venue_port;
