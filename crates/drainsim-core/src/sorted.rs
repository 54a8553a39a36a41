//! Sorted meeting indices, built once per run.
//!
//! The orchestrator turns these into its fixed event streams, and
//! downtime models reuse them for their own time bucketing. All sorts
//! are stable: ties keep input order.

use serde::Serialize;

use crate::types::{Connection, Meeting, Timestamp};

/// Position of one connection inside [`SortedMeetings::meetings`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnectionRef {
    pub meeting: usize,
    pub connection: usize,
}

/// Meetings plus index vectors ordered by start, finish, join and leave.
#[derive(Debug, Clone, Serialize)]
pub struct SortedMeetings {
    meetings: Vec<Meeting>,
    by_start: Vec<usize>,
    by_finish: Vec<usize>,
    by_join: Vec<ConnectionRef>,
    by_leave: Vec<ConnectionRef>,
}

impl SortedMeetings {
    pub fn new(meetings: Vec<Meeting>) -> Self {
        let mut by_start: Vec<usize> = (0..meetings.len()).collect();
        by_start.sort_by_key(|&i| meetings[i].start);

        let mut by_finish: Vec<usize> = (0..meetings.len()).collect();
        by_finish.sort_by_key(|&i| meetings[i].finish);

        let refs: Vec<ConnectionRef> = meetings
            .iter()
            .enumerate()
            .flat_map(|(meeting, m)| {
                (0..m.connections.len()).map(move |connection| ConnectionRef {
                    meeting,
                    connection,
                })
            })
            .collect();

        let mut by_join = refs.clone();
        by_join.sort_by_key(|r| meetings[r.meeting].connections[r.connection].joined);
        let mut by_leave = refs;
        by_leave.sort_by_key(|r| meetings[r.meeting].connections[r.connection].left);

        Self {
            meetings,
            by_start,
            by_finish,
            by_join,
            by_leave,
        }
    }

    pub fn meetings(&self) -> &[Meeting] {
        &self.meetings
    }

    pub fn meeting(&self, idx: usize) -> &Meeting {
        &self.meetings[idx]
    }

    pub fn connection(&self, r: ConnectionRef) -> &Connection {
        &self.meetings[r.meeting].connections[r.connection]
    }

    pub fn len(&self) -> usize {
        self.meetings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meetings.is_empty()
    }

    /// Meeting indices in ascending start order.
    pub fn by_start(&self) -> &[usize] {
        &self.by_start
    }

    /// Meeting indices in ascending finish order.
    pub fn by_finish(&self) -> &[usize] {
        &self.by_finish
    }

    /// Connections in ascending join order.
    pub fn by_join(&self) -> &[ConnectionRef] {
        &self.by_join
    }

    /// Connections in ascending leave order.
    pub fn by_leave(&self) -> &[ConnectionRef] {
        &self.by_leave
    }

    /// Meetings in progress at `at`, in start order.
    pub fn active_at(&self, at: Timestamp) -> impl Iterator<Item = &Meeting> + '_ {
        self.by_start
            .iter()
            .map(|&i| &self.meetings[i])
            .take_while(move |m| m.start <= at)
            .filter(move |m| m.finish >= at)
    }

    /// Earliest meeting start and latest meeting finish.
    pub fn span(&self) -> Option<(Timestamp, Timestamp)> {
        let first = self.by_start.first().map(|&i| self.meetings[i].start)?;
        let last = self.by_finish.last().map(|&i| self.meetings[i].finish)?;
        Some((first, last))
    }
}
