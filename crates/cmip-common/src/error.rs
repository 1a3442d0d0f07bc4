//! Error types shared across the cmip-ensembles crates.

use thiserror::Error;

/// Result type alias using CmipError.
pub type CmipResult<T> = Result<T, CmipError>;

/// Errors raised while interpreting archive identifiers, keys and time axes.
#[derive(Debug, Error)]
pub enum CmipError {
    // === Identifier Errors ===
    #[error("Unknown archive identifier: {0}")]
    UnknownMipId(String),

    #[error("Invalid dataset key '{key}': {message}")]
    InvalidDatasetKey { key: String, message: String },

    // === Time Errors ===
    #[error("Invalid CF time units: {0}")]
    InvalidTimeUnits(String),

    #[error("Non-finite time value at index {0}")]
    NonFiniteTime(usize),

    #[error("Time value {value} at index {index} is too far from the epoch")]
    TimeOffsetOutOfRange { index: usize, value: f64 },

    #[error("Unsupported calendar: {0}")]
    UnsupportedCalendar(String),

    #[error("Invalid date {year:04}-{month:02}-{day:02}")]
    InvalidDate { year: i32, month: u32, day: u32 },

    #[error("Invalid time slice: {0}")]
    InvalidTimeSlice(String),

    #[error("Time slice {0} selects no timestamps")]
    EmptyTimeSelection(String),

    #[error("Time axis is not sorted; cannot select {0}")]
    UnsortedTimeAxis(String),
}
