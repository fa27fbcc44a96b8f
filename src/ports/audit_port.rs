//! Audit trail port.

use crate::domain::error::TradecheckError;
use crate::domain::record::{AuditRecord, RecordKind, Row};

/// Object-safe view of an [`AuditRecord`].
pub trait RowSource {
    fn kind(&self) -> RecordKind;
    fn encode(&self) -> Row;
}

impl<R: AuditRecord> RowSource for R {
    fn kind(&self) -> RecordKind {
        R::KIND
    }

    fn encode(&self) -> Row {
        self.to_row()
    }
}

/// Append-only destination for audit rows, one store per record kind.
pub trait AuditPort {
    fn append(&mut self, kind: RecordKind, row: &Row) -> Result<(), TradecheckError>;

    fn write(&mut self, record: &dyn RowSource) -> Result<(), TradecheckError> {
        self.append(record.kind(), &record.encode())
    }
}
