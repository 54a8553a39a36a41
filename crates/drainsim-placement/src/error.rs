//! Placement error types.

use thiserror::Error;

use drainsim_core::{CoreError, MeetingId, NodeId, Timestamp};

/// Errors that can occur while selecting nodes or tracking load.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlacementError {
    #[error("no eligible node for meeting {meeting} at {at}: all {total} nodes are in maintenance")]
    Exhausted {
        meeting: MeetingId,
        at: Timestamp,
        total: usize,
    },

    #[error("load underflow on node {node} for meeting {meeting}")]
    LoadUnderflow { node: NodeId, meeting: MeetingId },

    #[error("topology error: {0}")]
    Topology(#[from] CoreError),
}

pub type PlacementResult<T> = Result<T, PlacementError>;
