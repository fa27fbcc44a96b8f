//! Domain error types.

use std::path::PathBuf;

/// Failure reported by the execution venue.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VenueError {
    /// A bounded (replay/backtest) session has run out of data.
    #[error("session finished")]
    SessionFinished,

    #[error("venue is closed")]
    Closed,

    #[error("unknown symbol {symbol}")]
    UnknownSymbol { symbol: String },

    #[error("order rejected: {reason}")]
    Rejected { reason: String },

    #[error("venue failure: {reason}")]
    Failure { reason: String },
}

/// Top-level error type for tradecheck.
#[derive(Debug, thiserror::Error)]
pub enum TradecheckError {
    #[error(transparent)]
    Venue(#[from] VenueError),

    #[error("order {order_id} is already registered in the ledger")]
    LedgerConflict { order_id: String },

    #[error("order {order_id} violates ledger invariant: {reason}")]
    OrderInvariant { order_id: String, reason: String },

    #[error("cannot open audit store {}: {source}", path.display())]
    SinkIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot append to audit store {}: {source}", path.display())]
    SinkWrite {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("invalid input data: {reason}")]
    Data { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&TradecheckError> for std::process::ExitCode {
    fn from(err: &TradecheckError) -> Self {
        let code: u8 = match err {
            TradecheckError::Io(_)
            | TradecheckError::SinkIo { .. }
            | TradecheckError::SinkWrite { .. } => 1,
            TradecheckError::ConfigParse { .. }
            | TradecheckError::ConfigMissing { .. }
            | TradecheckError::ConfigInvalid { .. } => 2,
            TradecheckError::Venue(_) => 3,
            TradecheckError::LedgerConflict { .. } | TradecheckError::OrderInvariant { .. } => 4,
            TradecheckError::Data { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::ExitCode;

    #[test]
    fn venue_error_converts_transparently() {
        let err: TradecheckError = VenueError::Rejected {
            reason: "no margin".into(),
        }
        .into();
        assert_eq!(err.to_string(), "order rejected: no margin");
    }

    #[test]
    fn sink_io_names_the_path() {
        let err = TradecheckError::SinkIo {
            path: PathBuf::from("/tmp/audit/order.csv"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.to_string().contains("/tmp/audit/order.csv"));
    }

    #[test]
    fn exit_codes_group_by_kind() {
        let conflict = TradecheckError::LedgerConflict {
            order_id: "O1".into(),
        };
        assert_eq!(ExitCode::from(&conflict), ExitCode::from(4));

        let missing = TradecheckError::ConfigMissing {
            section: "session".into(),
            key: "symbol".into(),
        };
        assert_eq!(ExitCode::from(&missing), ExitCode::from(2));
    }
}
