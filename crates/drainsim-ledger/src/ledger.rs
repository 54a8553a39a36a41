//! AssignmentLedger — who hosts what, as of when.
//!
//! The ledger is written in simulated-time order by the rollout
//! orchestrator. Every write checks that it does not predate the last
//! write to the timeline it touches and fails with
//! [`LedgerError::Causality`] otherwise. Read accessors answer with the
//! last snapshot at or before the queried instant.

use std::collections::BTreeMap;

use im::OrdSet;
use serde::Serialize;
use tracing::debug;

use drainsim_core::{MeetingId, NodeId, Timestamp};

use crate::error::{Entity, LedgerError, LedgerResult};
use crate::timeline::{Snapshot, Timeline};

/// Versioned node ↔ meeting assignments plus the maintenance set.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AssignmentLedger {
    /// Node → meetings it holds over time.
    nodes: BTreeMap<NodeId, Timeline<OrdSet<MeetingId>>>,
    /// Meeting → hosting node over time; `None` once released.
    meetings: BTreeMap<MeetingId, Timeline<Option<NodeId>>>,
    /// Nodes in maintenance over time.
    maintenance: Timeline<OrdSet<NodeId>>,
}

impl AssignmentLedger {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Meetings ───────────────────────────────────────────────────

    /// Node hosting `meeting` at `at`, or `None` if unassigned.
    ///
    /// `at` must not predate the meeting's last recorded write.
    pub fn current_node(&self, meeting: &str, at: Timestamp) -> LedgerResult<Option<NodeId>> {
        let Some(timeline) = self.meetings.get(meeting) else {
            return Ok(None);
        };
        timeline.ensure_not_before_last(|| Entity::Meeting(meeting.to_string()), at)?;
        Ok(timeline.last().and_then(|s| s.value))
    }

    /// Move `meeting` onto `node` as of `at`.
    ///
    /// No-op if the meeting is already there. Otherwise the meeting is
    /// released from its current node first.
    pub fn assign(&mut self, meeting: &str, node: NodeId, at: Timestamp) -> LedgerResult<()> {
        if self.current_node(meeting, at)? == Some(node) {
            return Ok(());
        }
        if let Some(timeline) = self.nodes.get(&node) {
            timeline.ensure_not_before_last(|| Entity::Node(node), at)?;
        }

        let previous = self.release(meeting, at)?;

        let timeline = self.nodes.entry(node).or_default();
        let mut held = latest_set(timeline);
        held.insert(meeting.to_string());
        timeline.record(|| Entity::Node(node), at, held)?;

        self.meetings
            .entry(meeting.to_string())
            .or_default()
            .record(|| Entity::Meeting(meeting.to_string()), at, Some(node))?;

        debug!(meeting, node, ?previous, %at, "meeting assigned");
        Ok(())
    }

    /// Remove `meeting` from its current node as of `at`.
    ///
    /// Returns the node it was released from, or `None` if it was not
    /// assigned anywhere.
    pub fn release(&mut self, meeting: &str, at: Timestamp) -> LedgerResult<Option<NodeId>> {
        let Some(node) = self.current_node(meeting, at)? else {
            return Ok(None);
        };

        let timeline = self.nodes.entry(node).or_default();
        timeline.ensure_not_before_last(|| Entity::Node(node), at)?;
        let held = latest_set(timeline);
        if !held.contains(meeting) {
            return Err(LedgerError::NotOnNode {
                meeting: meeting.to_string(),
                node,
                at,
            });
        }
        timeline.record(|| Entity::Node(node), at, held.without(meeting))?;

        self.meetings
            .entry(meeting.to_string())
            .or_default()
            .record(|| Entity::Meeting(meeting.to_string()), at, None)?;

        debug!(meeting, node, %at, "meeting released");
        Ok(Some(node))
    }

    /// Node hosting `meeting` at any past or present instant.
    pub fn hosted_on(&self, meeting: &str, at: Timestamp) -> Option<NodeId> {
        self.meetings
            .get(meeting)
            .and_then(|timeline| timeline.value_at(at).copied().flatten())
    }

    // ── Nodes ──────────────────────────────────────────────────────

    pub fn meetings_on_node(&self, node: NodeId, at: Timestamp) -> OrdSet<MeetingId> {
        self.nodes
            .get(&node)
            .and_then(|timeline| timeline.value_at(at).cloned())
            .unwrap_or_default()
    }

    pub fn node_has_meetings(&self, node: NodeId, at: Timestamp) -> bool {
        self.nodes
            .get(&node)
            .and_then(|timeline| timeline.value_at(at))
            .is_some_and(|held| !held.is_empty())
    }

    // ── Maintenance ────────────────────────────────────────────────

    pub fn nodes_in_maintenance(&self, at: Timestamp) -> OrdSet<NodeId> {
        self.maintenance.value_at(at).cloned().unwrap_or_default()
    }

    pub fn is_in_maintenance(&self, node: NodeId, at: Timestamp) -> bool {
        self.maintenance
            .value_at(at)
            .is_some_and(|nodes| nodes.contains(&node))
    }

    pub fn start_maintenance(&mut self, node: NodeId, at: Timestamp) -> LedgerResult<()> {
        let current = latest_set(&self.maintenance);
        let next = current.update(node);
        self.record_maintenance(current, next, at)?;
        debug!(node, %at, "maintenance started");
        Ok(())
    }

    pub fn end_maintenance(&mut self, node: NodeId, at: Timestamp) -> LedgerResult<()> {
        let current = latest_set(&self.maintenance);
        let next = current.without(&node);
        self.record_maintenance(current, next, at)?;
        debug!(node, %at, "maintenance ended");
        Ok(())
    }

    fn record_maintenance(
        &mut self,
        current: OrdSet<NodeId>,
        next: OrdSet<NodeId>,
        at: Timestamp,
    ) -> LedgerResult<()> {
        self.maintenance
            .ensure_not_before_last(|| Entity::Maintenance, at)?;
        if next != current {
            self.maintenance.record(|| Entity::Maintenance, at, next)?;
        }
        Ok(())
    }

    // ── History ────────────────────────────────────────────────────

    pub fn node_history(&self, node: NodeId) -> &[Snapshot<OrdSet<MeetingId>>] {
        self.nodes.get(&node).map(|t| t.entries()).unwrap_or(&[])
    }

    pub fn meeting_history(&self, meeting: &str) -> &[Snapshot<Option<NodeId>>] {
        self.meetings.get(meeting).map(|t| t.entries()).unwrap_or(&[])
    }

    pub fn maintenance_history(&self) -> &[Snapshot<OrdSet<NodeId>>] {
        self.maintenance.entries()
    }

    /// Number of meetings ever assigned.
    pub fn meeting_count(&self) -> usize {
        self.meetings.len()
    }
}

/// Latest snapshot of a set timeline, or the empty set.
fn latest_set<T: Ord + Clone>(timeline: &Timeline<OrdSet<T>>) -> OrdSet<T> {
    timeline
        .last()
        .map(|s| s.value.clone())
        .unwrap_or_default()
}
