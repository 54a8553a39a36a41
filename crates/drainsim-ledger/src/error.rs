//! Error types for the assignment ledger.

use std::fmt;

use thiserror::Error;

use drainsim_core::{MeetingId, NodeId, Timestamp};

/// Result type alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// The timeline a ledger write or query targeted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entity {
    Node(NodeId),
    Meeting(MeetingId),
    Maintenance,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entity::Node(node) => write!(f, "node {node}"),
            Entity::Meeting(id) => write!(f, "meeting {id}"),
            Entity::Maintenance => f.write_str("maintenance set"),
        }
    }
}

/// Fatal ledger errors. Both indicate events fed out of causal order or
/// a corrupted ledger; a run cannot continue past either.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("causality violation on {entity}: last written at {last}, got {attempted}")]
    Causality {
        entity: Entity,
        last: Timestamp,
        attempted: Timestamp,
    },

    #[error("meeting {meeting} is not held by node {node} at {at}")]
    NotOnNode {
        meeting: MeetingId,
        node: NodeId,
        at: Timestamp,
    },
}
