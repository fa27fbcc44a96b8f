//! Directory of CSV audit stores implementing [`AuditPort`].

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use super::csv_sink::CsvSink;
use crate::domain::error::{TradecheckError, VenueError};
use crate::domain::record::{CycleVerdict, MatchStatus, RecordKind, Row};
use crate::ports::audit_port::AuditPort;

pub struct CsvAuditAdapter {
    dir: PathBuf,
    sinks: HashMap<RecordKind, CsvSink>,
}

impl CsvAuditAdapter {
    /// Opens (or creates) all six stores under `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, TradecheckError> {
        let dir = dir.into();
        let mut sinks = HashMap::new();
        for kind in RecordKind::ALL {
            let sink = CsvSink::open(dir.join(kind.file_name()), kind.columns())?;
            sinks.insert(kind, sink);
        }
        info!(dir = %dir.display(), stores = sinks.len(), "audit stores opened");
        Ok(CsvAuditAdapter { dir, sinks })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn store_path(&self, kind: RecordKind) -> PathBuf {
        self.dir.join(kind.file_name())
    }
}

impl AuditPort for CsvAuditAdapter {
    fn append(&mut self, kind: RecordKind, row: &Row) -> Result<(), TradecheckError> {
        match self.sinks.get_mut(&kind) {
            Some(sink) => sink.append(row),
            None => Err(TradecheckError::SinkIo {
                path: self.dir.join(kind.file_name()),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "store not open"),
            }),
        }
    }
}

/// Row counts and verdict tallies read back from an audit directory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditInspection {
    pub rows: Vec<(RecordKind, usize)>,
    pub matched: usize,
    pub mismatched: usize,
    pub failed_cycles: usize,
}

impl AuditInspection {
    pub fn rows_for(&self, kind: RecordKind) -> usize {
        self.rows
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    }
}

/// Reads every store under `dir`; missing stores count as empty.
pub fn inspect(dir: &Path) -> Result<AuditInspection, TradecheckError> {
    if !dir.is_dir() {
        return Err(TradecheckError::Data {
            reason: format!("{} is not a directory", dir.display()),
        });
    }

    let mut inspection = AuditInspection::default();
    for kind in RecordKind::ALL {
        let rows = read_rows(&dir.join(kind.file_name()))?;
        match kind {
            RecordKind::ValidationLog => {
                for row in &rows {
                    match row.get("status").map(String::as_str) {
                        Some(s) if s == MatchStatus::Matched.as_str() => inspection.matched += 1,
                        Some(s) if s == MatchStatus::Mismatch.as_str() => {
                            inspection.mismatched += 1
                        }
                        _ => {}
                    }
                }
            }
            RecordKind::WaitUpdateLog => {
                let session_end = VenueError::SessionFinished.to_string();
                inspection.failed_cycles = rows
                    .iter()
                    .filter(|row| {
                        row.get("validation_status").map(String::as_str)
                            == Some(CycleVerdict::Fail.as_str())
                            && !row
                                .get("message")
                                .is_some_and(|m| m.ends_with(session_end.as_str()))
                    })
                    .count();
            }
            _ => {}
        }
        inspection.rows.push((kind, rows.len()));
    }
    Ok(inspection)
}

/// Reads a store back into rows keyed by its header.
pub fn read_rows(path: &Path) -> Result<Vec<Row>, TradecheckError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path).map_err(|source| TradecheckError::SinkIo {
        path: path.to_path_buf(),
        source,
    })?;

    let mut rdr = csv::Reader::from_reader(content.as_bytes());
    let headers = rdr
        .headers()
        .map_err(|e| TradecheckError::Data {
            reason: format!("{}: {}", path.display(), e),
        })?
        .clone();

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(|e| TradecheckError::Data {
            reason: format!("{}: {}", path.display(), e),
        })?;
        rows.push(
            headers
                .iter()
                .zip(record.iter())
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
    }
    Ok(rows)
}
