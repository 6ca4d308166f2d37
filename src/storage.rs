//! Appending readings to the monthly logs and reading them back.
//!
//! The store is deliberately plain: one semicolon-delimited text file per
//! calendar month, append-only, header row written once when the file is
//! born. Columns are sorted by name (see
//! [`crate::telemetry::TelemetryReading`]) so downstream tooling can rely on
//! the layout.

use std::fs::{File, OpenOptions};
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

use chrono::Local;

use crate::error::StorageError;
use crate::telemetry::TelemetryReading;

/// Log file name, one file per calendar month of local time.
pub const LOG_FILE_PATTERN: &str = "GROWATT_DATA_%Y_%m.csv";

/// Column separator in the log files.
pub const DELIMITER: u8 = b';';

/// Append-only store of decoded readings, keyed by calendar month.
#[derive(Debug, Clone)]
pub struct MonthlyLog {
    dir: PathBuf,
}

impl MonthlyLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the log file a reading belongs to, derived from its sample
    /// time in local time.
    pub fn path_for(&self, reading: &TelemetryReading) -> PathBuf {
        let name = reading
            .sample_time
            .with_timezone(&Local)
            .format(LOG_FILE_PATTERN)
            .to_string();
        self.dir.join(name)
    }

    /// Append one reading to its monthly file.
    ///
    /// A newborn file gets the header row first; existing files are only
    /// ever appended to.
    pub fn append(&self, reading: &TelemetryReading) -> Result<(), StorageError> {
        let path = self.path_for(reading);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let new_file = file.metadata()?.len() == 0;
        if new_file {
            log::info!("starting new log file {}", path.display());
        }

        let mut writer = csv::WriterBuilder::new()
            .delimiter(DELIMITER)
            .has_headers(new_file)
            .from_writer(file);
        writer.serialize(reading)?;
        writer.flush()?;
        Ok(())
    }
}

/// Read a stored log back into readings, lazily.
///
/// Rows containing NUL bytes are partial writes from an interrupted logger
/// and are discarded before parsing. Rows that still fail to parse are
/// skipped with a warning rather than aborting the pass; the log has no
/// integrity guarantees to begin with.
pub fn read_log<R: Read>(
    mut input: R,
) -> Result<impl Iterator<Item = TelemetryReading>, StorageError> {
    let mut raw = Vec::new();
    input.read_to_end(&mut raw)?;

    let text = String::from_utf8_lossy(&raw);
    let cleaned = text
        .lines()
        .filter(|line| !line.contains('\0'))
        .collect::<Vec<_>>()
        .join("\n");

    let reader = csv::ReaderBuilder::new()
        .delimiter(DELIMITER)
        .from_reader(Cursor::new(cleaned));

    Ok(reader
        .into_deserialize::<TelemetryReading>()
        .filter_map(|row| match row {
            Ok(reading) => Some(reading),
            Err(e) => {
                log::warn!("skipping unparseable log row: {e}");
                None
            }
        }))
}

/// Open and read a stored log file. See [`read_log`].
pub fn read_log_file(
    path: impl AsRef<Path>,
) -> Result<impl Iterator<Item = TelemetryReading>, StorageError> {
    read_log(File::open(path)?)
}

/// Write readings to `sink` in the log format, optionally with the header
/// row. Used by the analysis export, which prints the header only for the
/// first of several input files.
pub fn write_rows<W: Write>(
    sink: W,
    rows: impl IntoIterator<Item = TelemetryReading>,
    headers: bool,
) -> Result<(), StorageError> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(DELIMITER)
        .has_headers(headers)
        .from_writer(sink);
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}
