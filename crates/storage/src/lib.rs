//! Storage Layer
//!
//! Records which plates passed which gate, keyed by plate number.

mod repository;

pub use repository::{Repository, SightingRecord};

use chrono::{DateTime, Utc};
use plate_tracker::Panel;
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),
    #[error("Record not found")]
    NotFound,
}

/// Append-or-update log of confirmed plates
pub trait SightingLedger: Send + Sync {
    /// New plates get `input_time = output_time = at`; known plates get
    /// their `output_time` moved to `at`.
    fn record(&self, plate: &str, panel: Panel, at: DateTime<Utc>) -> Result<(), StorageError>;
}
