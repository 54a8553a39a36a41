//! Run results.

use serde::Serialize;

use drainsim_core::{MeetingId, NodeId, SortedMeetings, Timestamp};
use drainsim_ledger::AssignmentLedger;

/// A meeting forcibly moved off a node whose grace period expired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Downtime {
    pub at: Timestamp,
    pub meeting: MeetingId,
    pub from: NodeId,
    pub to: NodeId,
}

/// One pass over the fleet, started at a scheduled rollout time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rollout {
    /// Position in the run's rollout sequence.
    pub id: usize,
    pub start: Timestamp,
    /// Set when every node has returned or the next rollout begins.
    pub finish: Option<Timestamp>,
    pub downtimes: Vec<Downtime>,
}

impl Rollout {
    pub fn new(id: usize, start: Timestamp) -> Self {
        Self {
            id,
            start,
            finish: None,
            downtimes: Vec::new(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finish.is_some()
    }

    /// Milliseconds from start to finish, if finished.
    pub fn duration_millis(&self) -> Option<u64> {
        self.finish.map(|f| f.saturating_sub(self.start))
    }
}

/// Everything a run produces.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationOutcome {
    pub rollouts: Vec<Rollout>,
    pub ledger: AssignmentLedger,
    pub meetings: SortedMeetings,
    /// Highest number of nodes draining or restarting at once.
    pub peak_disruption: usize,
}

impl SimulationOutcome {
    pub fn total_downtimes(&self) -> usize {
        self.rollouts.iter().map(|r| r.downtimes.len()).sum()
    }

    /// All downtimes across rollouts, in rollout then time order.
    pub fn downtimes(&self) -> impl Iterator<Item = &Downtime> + '_ {
        self.rollouts.iter().flat_map(|r| r.downtimes.iter())
    }
}
