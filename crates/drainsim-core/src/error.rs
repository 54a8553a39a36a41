//! Error types for core data validation.

use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised while building topology or meeting records.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("fleet topology has no nodes")]
    EmptyTopology,

    #[error("island {island} has zero nodes")]
    EmptyIsland { island: usize },

    #[error("island {island} out of range (fleet has {islands} islands)")]
    IslandOutOfRange { island: usize, islands: usize },

    #[error("index {index} out of range for island {island} of {size} nodes")]
    IndexOutOfRange { island: usize, index: usize, size: usize },

    #[error("invalid meeting {meeting}: {reason}")]
    InvalidMeeting { meeting: String, reason: String },
}
