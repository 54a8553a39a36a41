//! Shared types used across drainsim crates.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Dense global node index in `[0, total_nodes)`.
pub type NodeId = usize;

/// Unique identifier for a room meeting.
pub type MeetingId = String;

/// Simulated wall-clock instant, in milliseconds since the Unix epoch.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Whole seconds since the epoch, saturating at the far end of the clock.
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(1000))
    }

    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// This instant shifted forward by `secs` seconds, or `None` if that
    /// runs past the end of the clock.
    pub const fn checked_add_secs(self, secs: u64) -> Option<Self> {
        match secs.checked_mul(1000) {
            Some(millis) => match self.0.checked_add(millis) {
                Some(total) => Some(Self(total)),
                None => None,
            },
            None => None,
        }
    }

    /// Milliseconds elapsed since `earlier`, or zero if `earlier` is later.
    pub const fn saturating_sub(self, earlier: Timestamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:03}s", self.0 / 1000, self.0 % 1000)
    }
}

// ── Meetings ───────────────────────────────────────────────────────

/// One participant's join/leave span within a meeting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub meeting_id: MeetingId,
    pub peer_id: String,
    pub joined: Timestamp,
    pub left: Timestamp,
}

/// A bounded-duration group session, hosted on one node at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meeting {
    pub id: MeetingId,
    pub room_id: String,
    pub start: Timestamp,
    pub finish: Timestamp,
    pub connections: Vec<Connection>,
}

impl Meeting {
    /// Build a meeting whose bounds span all of its connections.
    ///
    /// The start is the earliest join and the finish the latest leave.
    pub fn from_connections(
        id: impl Into<MeetingId>,
        room_id: impl Into<String>,
        connections: Vec<Connection>,
    ) -> CoreResult<Self> {
        let id = id.into();
        let start = connections.iter().map(|c| c.joined).min();
        let finish = connections.iter().map(|c| c.left).max();
        let (Some(start), Some(finish)) = (start, finish) else {
            return Err(CoreError::InvalidMeeting {
                meeting: id,
                reason: "no connections".to_string(),
            });
        };
        let meeting = Self {
            id,
            room_id: room_id.into(),
            start,
            finish,
            connections,
        };
        meeting.validate()?;
        Ok(meeting)
    }

    /// Check the meeting's time bounds and connection ownership.
    pub fn validate(&self) -> CoreResult<()> {
        let invalid = |reason: String| CoreError::InvalidMeeting {
            meeting: self.id.clone(),
            reason,
        };

        if self.start > self.finish {
            return Err(invalid(format!(
                "start {} is after finish {}",
                self.start, self.finish
            )));
        }
        for conn in &self.connections {
            if conn.meeting_id != self.id {
                return Err(invalid(format!(
                    "connection of peer {} belongs to meeting {}",
                    conn.peer_id, conn.meeting_id
                )));
            }
            if conn.joined > conn.left {
                return Err(invalid(format!(
                    "peer {} joins at {} after leaving at {}",
                    conn.peer_id, conn.joined, conn.left
                )));
            }
            if conn.joined < self.start || conn.left > self.finish {
                return Err(invalid(format!(
                    "peer {} span {}..{} is outside the meeting",
                    conn.peer_id, conn.joined, conn.left
                )));
            }
        }
        Ok(())
    }

    /// Whether the meeting is in progress at `at` (bounds inclusive).
    pub fn is_active_at(&self, at: Timestamp) -> bool {
        self.start <= at && at <= self.finish
    }
}
