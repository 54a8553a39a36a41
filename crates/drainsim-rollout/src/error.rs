//! Rollout error types.

use thiserror::Error;

use drainsim_core::{CoreError, MeetingId, NodeId, Timestamp};
use drainsim_ledger::LedgerError;
use drainsim_placement::PlacementError;

/// Errors that abort a simulation run.
#[derive(Debug, Error, PartialEq)]
pub enum RolloutError {
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("placement error: {0}")]
    Placement(#[from] PlacementError),

    #[error("input error: {0}")]
    Core(#[from] CoreError),

    #[error("{stream} stream went back in time: {attempted} after {last}")]
    StreamOrder {
        stream: &'static str,
        last: Timestamp,
        attempted: Timestamp,
    },

    #[error("grace queue out of order at slot {slot}")]
    GraceQueueUnordered { slot: usize },

    #[error("node {node} has no pending grace entry")]
    UnknownGraceEntry { node: NodeId },

    #[error("node {node} already has a pending grace entry")]
    DuplicateGraceEntry { node: NodeId },

    #[error("node {node} cannot wait {secs}s past {at}: clock overflow")]
    ClockOverflow { node: NodeId, at: Timestamp, secs: u64 },

    #[error("node {node} returned at {at} with no disruption outstanding")]
    DisruptionUnderflow { node: NodeId, at: Timestamp },

    #[error("meeting {meeting} has no host at {at}")]
    MeetingNotHosted { meeting: MeetingId, at: Timestamp },

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type RolloutResult<T> = Result<T, RolloutError>;
