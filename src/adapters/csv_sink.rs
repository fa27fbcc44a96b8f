//! Append-only CSV store for one audit record kind.

use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::domain::error::TradecheckError;
use crate::domain::record::Row;

pub struct CsvSink {
    path: PathBuf,
    columns: Vec<&'static str>,
    writer: csv::Writer<File>,
}

impl CsvSink {
    /// Opens `path` for appending, writing the header only when the file is
    /// new or empty. Existing rows are never truncated.
    pub fn open(path: impl Into<PathBuf>, columns: Vec<&'static str>) -> Result<Self, TradecheckError> {
        let path = path.into();
        let io_err = |source| TradecheckError::SinkIo {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let needs_header = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => true,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                fs::metadata(&path).map_err(io_err)?.len() == 0
            }
            Err(e) => return Err(io_err(e)),
        };

        let file = OpenOptions::new().append(true).open(&path).map_err(io_err)?;
        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        let mut sink = CsvSink {
            path,
            columns,
            writer,
        };
        if needs_header {
            let header = sink.columns.clone();
            sink.write_record(&header)?;
            debug!(path = %sink.path.display(), "audit store created");
        }
        Ok(sink)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn columns(&self) -> &[&'static str] {
        &self.columns
    }

    /// Appends `row` projected onto the declared columns. Unknown keys are
    /// dropped and missing keys become empty cells.
    pub fn append(&mut self, row: &Row) -> Result<(), TradecheckError> {
        let cells: Vec<&str> = self
            .columns
            .iter()
            .map(|column| row.get(*column).map(String::as_str).unwrap_or(""))
            .collect();
        self.write_record(&cells)
    }

    fn write_record(&mut self, cells: &[&str]) -> Result<(), TradecheckError> {
        self.writer
            .write_record(cells)
            .map_err(|source| TradecheckError::SinkWrite {
                path: self.path.clone(),
                source,
            })?;
        self.writer.flush().map_err(|source| TradecheckError::SinkIo {
            path: self.path.clone(),
            source,
        })
    }
}
