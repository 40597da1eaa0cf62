//! Error kinds surfaced by the record store and the timer.

use rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackerError {
    /// Input rejected before anything was written.
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("time slot {0} not found")]
    NotFound(i64),

    /// Underlying SQLite or worker-thread failure.
    #[error("storage error: {0:#}")]
    Storage(anyhow::Error),

    /// Malformed date or timestamp at the boundary.
    #[error("could not parse {field} '{value}': {reason}")]
    Parse {
        field: &'static str,
        value: String,
        reason: String,
    },
}

impl TrackerError {
    pub fn storage(message: impl std::fmt::Display) -> Self {
        TrackerError::Storage(anyhow::anyhow!("{message}"))
    }

    pub fn parse(field: &'static str, value: &str, reason: impl std::fmt::Display) -> Self {
        TrackerError::Parse {
            field,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, TrackerError::NotFound(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, TrackerError::Validation(_))
    }
}

impl From<rusqlite::Error> for TrackerError {
    fn from(err: rusqlite::Error) -> Self {
        // The only unique constraint on time_slots is the single-open-slot index.
        if let rusqlite::Error::SqliteFailure(failure, _) = &err {
            if failure.extended_code == SQLITE_CONSTRAINT_UNIQUE {
                return TrackerError::Validation(
                    "another time slot is already active".to_string(),
                );
            }
        }
        TrackerError::Storage(anyhow::Error::new(err))
    }
}

pub type TrackerResult<T> = Result<T, TrackerError>;
