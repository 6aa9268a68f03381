//! Destinations for finished rows.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use tracing::info;

use super::row::CsvRow;
use crate::types::ScoutError;

/// Receives finished rows in pipeline order.
pub trait RowSink {
    fn write_row(&mut self, row: &CsvRow) -> Result<(), ScoutError>;

    /// Flush anything buffered. Called once after the last row.
    fn finish(&mut self) -> Result<(), ScoutError>;
}

/// CSV file sink. The header is written on creation, so a run that finds
/// nothing still leaves a valid, empty table behind.
pub struct CsvSink {
    writer: csv::Writer<File>,
    path: PathBuf,
    rows: usize,
}

impl CsvSink {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, ScoutError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| sink_error(&path, e))?;
        }

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&path)
            .map_err(|e| sink_error(&path, e))?;
        writer
            .write_record(CsvRow::HEADERS)
            .map_err(|e| sink_error(&path, e))?;

        Ok(Self {
            writer,
            path,
            rows: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rows(&self) -> usize {
        self.rows
    }
}

impl RowSink for CsvSink {
    fn write_row(&mut self, row: &CsvRow) -> Result<(), ScoutError> {
        self.writer
            .serialize(row)
            .map_err(|e| sink_error(&self.path, e))?;
        self.rows += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), ScoutError> {
        self.writer.flush().map_err(|e| sink_error(&self.path, e))?;
        info!(rows = self.rows, path = %self.path.display(), "CSV written");
        Ok(())
    }
}

fn sink_error(path: &Path, e: impl std::fmt::Display) -> ScoutError {
    ScoutError::Storage(format!("{}: {e}", path.display()))
}

/// Collects rows in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub rows: Vec<CsvRow>,
    pub finished: bool,
}

impl RowSink for MemorySink {
    fn write_row(&mut self, row: &CsvRow) -> Result<(), ScoutError> {
        self.rows.push(row.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<(), ScoutError> {
        self.finished = true;
        Ok(())
    }
}
