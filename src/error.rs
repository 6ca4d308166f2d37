//! Our error types for inverter communication and log handling.

use thiserror::Error;

pub type Result<T, I> = core::result::Result<T, Error<I>>;

/// Custom error type for Growatt inverter sessions.
#[derive(Error, Debug)]
pub enum Error<I: embedded_io::Error> {
    #[error("serial communication error")]
    Serial(I),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors raised while appending to or reading back a telemetry log.
///
/// Kept separate from [`Error`] so the storage and analysis paths, which
/// never touch the serial transport, are not generic over its error type.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("log file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("record encoding error: {0}")]
    Csv(#[from] csv::Error),
}
