//! Rollout orchestrator — drives the simulation state machine.
//!
//! Nodes move Active → Draining → Restarting → Active, or straight from
//! Active to Restarting when they hold no meetings. A cursor walks the
//! fleet in global index order and takes nodes out of service while
//! fewer than `disruption_budget` nodes are draining or restarting.
//! Starting a new rollout resets the cursor to node 0.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, info};

use drainsim_core::{
    ConnectionRef, Meeting, MeetingId, NodeId, RolloutConfig, ShardTopology, SimulationConfig,
    SortedMeetings, Timestamp,
};
use drainsim_ledger::AssignmentLedger;
use drainsim_placement::{NodeSelectionPolicy, PlacementContext, build_policy};

use crate::error::{RolloutError, RolloutResult};
use crate::grace::{GraceEntry, GraceQueue};
use crate::outcome::{Downtime, Rollout, SimulationOutcome};
use crate::traversal::{ActionStream, Scheduled, Traversal};

/// One step of the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Index into the run's meetings.
    StartMeeting(usize),
    ConnectPeer(ConnectionRef),
    StartRollout,
    FinishGrace { node: NodeId, rollout: usize },
    FinishStartup { node: NodeId },
    ReleasePeer(ConnectionRef),
    FinishMeeting(usize),
}

/// Where a node is in its restart cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NodePhase {
    /// Serving and eligible for new meetings.
    Active,
    /// In maintenance, waiting for its meetings to end or its grace to expire.
    Draining,
    /// In maintenance, empty, coming back on the new version.
    Restarting,
}

/// Stream names in priority order; ties between streams fire in this order.
const STREAM_NAMES: [&str; 7] = [
    "meeting-start",
    "peer-connect",
    "rollout-start",
    "grace-finish",
    "node-startup",
    "peer-leave",
    "meeting-finish",
];

const STARTUP_STREAM: usize = 4;

impl ActionStream<Action> for GraceQueue {
    fn len(&self) -> usize {
        self.entries().len()
    }

    fn timestamp_at(&self, idx: usize) -> Timestamp {
        self.entries()[idx].at
    }

    fn action_at(&self, idx: usize) -> Action {
        let entry = self.entries()[idx];
        Action::FinishGrace {
            node: entry.node,
            rollout: entry.rollout,
        }
    }
}

// ── Streams ────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Streams {
    meeting_starts: Vec<Scheduled<Action>>,
    peer_connects: Vec<Scheduled<Action>>,
    rollout_starts: Vec<Scheduled<Action>>,
    grace: GraceQueue,
    startups: Vec<Scheduled<Action>>,
    peer_leaves: Vec<Scheduled<Action>>,
    meeting_finishes: Vec<Scheduled<Action>>,
}

impl Streams {
    /// Build the fixed streams; `schedule` must be sorted.
    fn build(meetings: &SortedMeetings, schedule: &[Timestamp]) -> Self {
        let meeting_starts = meetings
            .by_start()
            .iter()
            .map(|&i| Scheduled::new(meetings.meeting(i).start, Action::StartMeeting(i)))
            .collect();
        let meeting_finishes = meetings
            .by_finish()
            .iter()
            .map(|&i| Scheduled::new(meetings.meeting(i).finish, Action::FinishMeeting(i)))
            .collect();
        let peer_connects = meetings
            .by_join()
            .iter()
            .map(|&r| Scheduled::new(meetings.connection(r).joined, Action::ConnectPeer(r)))
            .collect();
        let peer_leaves = meetings
            .by_leave()
            .iter()
            .map(|&r| Scheduled::new(meetings.connection(r).left, Action::ReleasePeer(r)))
            .collect();
        let rollout_starts = schedule
            .iter()
            .map(|&at| Scheduled::new(at, Action::StartRollout))
            .collect();

        Self {
            meeting_starts,
            peer_connects,
            rollout_starts,
            grace: GraceQueue::new(),
            startups: Vec::new(),
            peer_leaves,
            meeting_finishes,
        }
    }

    fn in_priority_order(&self) -> [&dyn ActionStream<Action>; 7] {
        [
            &self.meeting_starts,
            &self.peer_connects,
            &self.rollout_starts,
            &self.grace,
            &self.startups,
            &self.peer_leaves,
            &self.meeting_finishes,
        ]
    }

    fn push_startup(&mut self, at: Timestamp, node: NodeId) -> RolloutResult<()> {
        if let Some(last) = self.startups.last() {
            if at < last.at {
                return Err(RolloutError::StreamOrder {
                    stream: STREAM_NAMES[STARTUP_STREAM],
                    last: last.at,
                    attempted: at,
                });
            }
        }
        self.startups.push(Scheduled::new(at, Action::FinishStartup { node }));
        Ok(())
    }
}

// ── Orchestrator ───────────────────────────────────────────────────

/// Owns all mutable simulation state for one run.
pub struct RolloutOrchestrator {
    meetings: SortedMeetings,
    meeting_index: HashMap<MeetingId, usize>,
    topology: ShardTopology,
    policy: Box<dyn NodeSelectionPolicy>,
    ledger: AssignmentLedger,
    streams: Streams,
    traversal: Traversal,
    phases: Vec<NodePhase>,
    /// Next node the current rollout will take out of service.
    next_node: NodeId,
    /// Nodes currently draining or restarting.
    disrupted: usize,
    peak_disruption: usize,
    budget: usize,
    restart_secs: u64,
    rollouts: Vec<Rollout>,
    now: Timestamp,
}

impl RolloutOrchestrator {
    /// Prepare a run over `meetings` with the rollout times in `config`.
    pub fn new(
        meetings: Vec<Meeting>,
        config: &RolloutConfig,
        topology: ShardTopology,
        policy: Box<dyn NodeSelectionPolicy>,
    ) -> RolloutResult<Self> {
        if config.disruption_budget == 0 {
            return Err(RolloutError::InvalidInput(
                "disruption budget must be at least 1".to_string(),
            ));
        }

        let mut meeting_index = HashMap::with_capacity(meetings.len());
        for (idx, meeting) in meetings.iter().enumerate() {
            meeting.validate()?;
            if meeting_index.insert(meeting.id.clone(), idx).is_some() {
                return Err(RolloutError::InvalidInput(format!(
                    "duplicate meeting id {}",
                    meeting.id
                )));
            }
        }

        let meetings = SortedMeetings::new(meetings);
        let schedule = config.sorted_start_times();
        let streams = Streams::build(&meetings, &schedule);
        let total = topology.total_nodes();

        info!(
            meetings = meetings.len(),
            nodes = total,
            islands = topology.island_count(),
            rollouts = schedule.len(),
            budget = config.disruption_budget,
            policy = policy.name(),
            "simulation prepared"
        );

        Ok(Self {
            meetings,
            meeting_index,
            topology,
            policy,
            ledger: AssignmentLedger::new(),
            streams,
            traversal: Traversal::new(),
            phases: vec![NodePhase::Active; total],
            next_node: total,
            disrupted: 0,
            peak_disruption: 0,
            budget: config.disruption_budget,
            restart_secs: config.node_restart_secs,
            rollouts: Vec::new(),
            now: Timestamp::default(),
        })
    }

    /// Build topology and policy from a full simulation config.
    pub fn from_config(meetings: Vec<Meeting>, config: &SimulationConfig) -> RolloutResult<Self> {
        let topology = config.topology()?;
        let policy = build_policy(&config.policy, &topology)?;
        Self::new(meetings, &config.rollout, topology, policy)
    }

    /// Execute every action in time order and return the result.
    pub fn run(mut self) -> RolloutResult<SimulationOutcome> {
        loop {
            let next = self.traversal.next(&self.streams.in_priority_order());
            let Some((stream, scheduled)) = next else {
                break;
            };
            if scheduled.at < self.now {
                return Err(RolloutError::StreamOrder {
                    stream: STREAM_NAMES[stream],
                    last: self.now,
                    attempted: scheduled.at,
                });
            }
            self.now = scheduled.at;
            self.execute(scheduled)?;
        }

        let outcome = SimulationOutcome {
            rollouts: self.rollouts,
            ledger: self.ledger,
            meetings: self.meetings,
            peak_disruption: self.peak_disruption,
        };
        info!(
            actions = self.traversal.fired(),
            rollouts = outcome.rollouts.len(),
            downtimes = outcome.total_downtimes(),
            peak_disruption = outcome.peak_disruption,
            "simulation finished"
        );
        Ok(outcome)
    }

    pub fn phase(&self, node: NodeId) -> Option<NodePhase> {
        self.phases.get(node).copied()
    }

    pub fn ledger(&self) -> &AssignmentLedger {
        &self.ledger
    }

    fn execute(&mut self, scheduled: Scheduled<Action>) -> RolloutResult<()> {
        let at = scheduled.at;
        match scheduled.action {
            Action::StartMeeting(idx) => self.meeting_started(idx, at),
            Action::ConnectPeer(conn) => self.peer_connected(conn, at),
            Action::StartRollout => self.start_rollout(at),
            Action::FinishGrace { node, rollout } => self.node_grace_finished(node, at, rollout),
            Action::FinishStartup { node } => self.return_node_to_duty(node, at),
            Action::ReleasePeer(conn) => self.peer_left(conn, at),
            Action::FinishMeeting(idx) => self.meeting_finished(idx, at),
        }
    }

    // ── Meetings ───────────────────────────────────────────────────

    fn meeting_started(&mut self, idx: usize, at: Timestamp) -> RolloutResult<()> {
        let meeting = self.meetings.meeting(idx);
        let ctx = PlacementContext {
            ledger: &self.ledger,
            topology: &self.topology,
        };
        let node = self.policy.pick_node(meeting, at, &ctx)?;
        self.ledger.assign(&meeting.id, node, at)?;
        debug!(meeting = %meeting.id, node, %at, "meeting started");
        Ok(())
    }

    fn peer_connected(&mut self, conn: ConnectionRef, at: Timestamp) -> RolloutResult<()> {
        let meeting = &self.meetings.meeting(conn.meeting).id;
        let node = hosting_node(&self.ledger, meeting, at)?;
        self.policy.on_connection_joined(node, meeting)?;
        Ok(())
    }

    fn peer_left(&mut self, conn: ConnectionRef, at: Timestamp) -> RolloutResult<()> {
        let meeting = &self.meetings.meeting(conn.meeting).id;
        let node = hosting_node(&self.ledger, meeting, at)?;
        self.policy.on_connection_released(node, meeting)?;
        Ok(())
    }

    fn meeting_finished(&mut self, idx: usize, at: Timestamp) -> RolloutResult<()> {
        let meeting = &self.meetings.meeting(idx).id;
        let node = self
            .ledger
            .release(meeting, at)?
            .ok_or_else(|| RolloutError::MeetingNotHosted {
                meeting: meeting.clone(),
                at,
            })?;
        debug!(meeting = %meeting, node, %at, "meeting finished");

        if self.phases[node] == NodePhase::Draining && !self.ledger.node_has_meetings(node, at) {
            self.streams.grace.pull_forward(node, at)?;
            debug!(node, %at, "node drained before grace expiry");
        }
        Ok(())
    }

    // ── Rollouts ───────────────────────────────────────────────────

    fn start_rollout(&mut self, at: Timestamp) -> RolloutResult<()> {
        if let Some(previous) = self.rollouts.last_mut() {
            if previous.finish.is_none() {
                previous.finish = Some(at);
                info!(rollout = previous.id, %at, "rollout superseded");
            }
        }

        let id = self.rollouts.len();
        self.rollouts.push(Rollout::new(id, at));
        self.next_node = 0;
        info!(rollout = id, %at, disrupted = self.disrupted, "rollout started");
        self.disrupt_nodes(at)
    }

    /// Take nodes out of service until the budget is used up.
    fn disrupt_nodes(&mut self, at: Timestamp) -> RolloutResult<()> {
        let Some(rollout) = self.rollouts.len().checked_sub(1) else {
            return Ok(());
        };
        let total = self.topology.total_nodes();

        while self.disrupted < self.budget && self.next_node < total {
            let node = self.next_node;
            // Still out from an earlier rollout; resume once it returns.
            if self.phases[node] != NodePhase::Active {
                debug!(node, rollout, phase = ?self.phases[node], "waiting for node to return");
                break;
            }
            self.next_node += 1;

            self.ledger.start_maintenance(node, at)?;
            self.disrupted += 1;
            self.peak_disruption = self.peak_disruption.max(self.disrupted);

            let held = self.ledger.meetings_on_node(node, at).len();
            if held > 0 {
                let ctx = PlacementContext {
                    ledger: &self.ledger,
                    topology: &self.topology,
                };
                let grace_secs = self.policy.grace_period_secs(node, at, &ctx);
                self.phases[node] = NodePhase::Draining;
                self.streams.grace.schedule(GraceEntry {
                    at: shifted(node, at, grace_secs)?,
                    node,
                    rollout,
                })?;
                info!(node, rollout, meetings = held, grace_secs, %at, "node draining");
            } else {
                self.begin_restart(node, at)?;
            }
        }

        if self.next_node == total && self.disrupted == 0 {
            let current = &mut self.rollouts[rollout];
            if current.finish.is_none() {
                current.finish = Some(at);
                info!(
                    rollout,
                    %at,
                    downtimes = current.downtimes.len(),
                    "rollout finished"
                );
            }
        }
        Ok(())
    }

    /// Evict whatever is still on `node` and start its restart.
    fn node_grace_finished(&mut self, node: NodeId, at: Timestamp, rollout: usize) -> RolloutResult<()> {
        self.streams.grace.complete(node)?;

        let evicted = self.ledger.meetings_on_node(node, at);
        for meeting_id in evicted.iter() {
            let idx = self.meeting_index.get(meeting_id).copied().ok_or_else(|| {
                RolloutError::InvalidInput(format!("node {node} holds unknown meeting {meeting_id}"))
            })?;
            let meeting = self.meetings.meeting(idx);
            let ctx = PlacementContext {
                ledger: &self.ledger,
                topology: &self.topology,
            };
            let to = self.policy.pick_node(meeting, at, &ctx)?;
            self.ledger.assign(meeting_id, to, at)?;
            self.policy.on_meeting_migrated(node, to, meeting_id)?;
            debug!(meeting = %meeting_id, from = node, to, %at, "meeting migrated");

            self.rollouts[rollout].downtimes.push(Downtime {
                at,
                meeting: meeting_id.clone(),
                from: node,
                to,
            });
        }
        if !evicted.is_empty() {
            info!(node, rollout, evicted = evicted.len(), %at, "grace expired");
        }

        self.begin_restart(node, at)
    }

    fn begin_restart(&mut self, node: NodeId, at: Timestamp) -> RolloutResult<()> {
        self.phases[node] = NodePhase::Restarting;
        let back_at = shifted(node, at, self.restart_secs)?;
        self.streams.push_startup(back_at, node)?;
        debug!(node, %at, %back_at, "node restarting");
        Ok(())
    }

    fn return_node_to_duty(&mut self, node: NodeId, at: Timestamp) -> RolloutResult<()> {
        self.disrupted = self
            .disrupted
            .checked_sub(1)
            .ok_or(RolloutError::DisruptionUnderflow { node, at })?;
        self.ledger.end_maintenance(node, at)?;
        self.phases[node] = NodePhase::Active;
        info!(node, %at, "node back in service");
        self.disrupt_nodes(at)
    }
}

fn shifted(node: NodeId, at: Timestamp, secs: u64) -> RolloutResult<Timestamp> {
    at.checked_add_secs(secs)
        .ok_or(RolloutError::ClockOverflow { node, at, secs })
}

fn hosting_node(ledger: &AssignmentLedger, meeting: &str, at: Timestamp) -> RolloutResult<NodeId> {
    ledger
        .current_node(meeting, at)?
        .ok_or_else(|| RolloutError::MeetingNotHosted {
            meeting: meeting.to_string(),
            at,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use drainsim_core::{Connection, GracePeriod};
    use drainsim_placement::{PlacementError, RoundRobinPolicy};

    fn ts(secs: u64) -> Timestamp {
        Timestamp::from_secs(secs)
    }

    fn meeting(id: &str, start: u64, finish: u64) -> Meeting {
        Meeting::from_connections(
            id,
            "room",
            vec![Connection {
                meeting_id: id.to_string(),
                peer_id: "peer".to_string(),
                joined: ts(start),
                left: ts(finish),
            }],
        )
        .unwrap()
    }

    fn rollout_config(start_times: Vec<u64>, budget: usize) -> RolloutConfig {
        RolloutConfig {
            start_times: start_times.into_iter().map(ts).collect(),
            disruption_budget: budget,
            node_restart_secs: 120,
        }
    }

    fn orchestrator(
        meetings: Vec<Meeting>,
        config: &RolloutConfig,
        islands: Vec<usize>,
    ) -> RolloutResult<RolloutOrchestrator> {
        RolloutOrchestrator::new(
            meetings,
            config,
            ShardTopology::new(islands).unwrap(),
            Box::new(RoundRobinPolicy::new(GracePeriod::Fixed { secs: 60 })),
        )
    }

    #[test]
    fn rejects_zero_budget() {
        let result = orchestrator(vec![], &rollout_config(vec![], 0), vec![2]);
        assert!(matches!(result, Err(RolloutError::InvalidInput(_))));
    }

    #[test]
    fn rejects_duplicate_meeting_ids() {
        let meetings = vec![meeting("m", 0, 10), meeting("m", 20, 30)];
        let result = orchestrator(meetings, &rollout_config(vec![], 1), vec![2]);
        assert!(matches!(result, Err(RolloutError::InvalidInput(msg)) if msg.contains("duplicate")));
    }

    #[test]
    fn rejects_malformed_meetings() {
        let mut bad = meeting("m", 0, 10);
        bad.finish = ts(5);
        let result = orchestrator(vec![bad], &rollout_config(vec![], 1), vec![2]);
        assert!(matches!(result, Err(RolloutError::Core(_))));
    }

    #[test]
    fn nodes_start_active() {
        let orch = orchestrator(vec![], &rollout_config(vec![], 1), vec![2, 1]).unwrap();
        assert_eq!(orch.phase(0), Some(NodePhase::Active));
        assert_eq!(orch.phase(2), Some(NodePhase::Active));
        assert_eq!(orch.phase(3), None);
        assert_eq!(orch.ledger().meeting_count(), 0);
    }

    #[test]
    fn run_without_rollouts_only_places_meetings() {
        let meetings = vec![meeting("a", 0, 100), meeting("b", 10, 50)];
        let outcome = orchestrator(meetings, &rollout_config(vec![], 1), vec![3])
            .unwrap()
            .run()
            .unwrap();

        assert!(outcome.rollouts.is_empty());
        assert_eq!(outcome.peak_disruption, 0);
        assert_eq!(outcome.ledger.hosted_on("a", ts(20)), Some(0));
        assert_eq!(outcome.ledger.hosted_on("b", ts(20)), Some(1));
        assert_eq!(outcome.ledger.hosted_on("a", ts(100)), None);
    }

    #[test]
    fn single_node_fleet_cannot_evict() {
        let meetings = vec![meeting("m", 0, 1000)];
        let result = orchestrator(meetings, &rollout_config(vec![10], 1), vec![1])
            .unwrap()
            .run();
        match result {
            Err(RolloutError::Placement(PlacementError::Exhausted { meeting, at, total })) => {
                assert_eq!(meeting, "m");
                assert_eq!(at, ts(70));
                assert_eq!(total, 1);
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[test]
    fn oversized_restart_time_is_reported() {
        let config = RolloutConfig {
            start_times: vec![ts(10)],
            disruption_budget: 1,
            node_restart_secs: u64::MAX / 100,
        };
        let result = orchestrator(vec![], &config, vec![2]).unwrap().run();
        assert_eq!(
            result.unwrap_err(),
            RolloutError::ClockOverflow {
                node: 0,
                at: ts(10),
                secs: u64::MAX / 100,
            }
        );
    }

    #[test]
    fn oversized_grace_period_is_reported() {
        let err = RolloutOrchestrator::new(
            vec![meeting("m", 0, 100)],
            &rollout_config(vec![10], 1),
            ShardTopology::new(vec![2]).unwrap(),
            Box::new(RoundRobinPolicy::new(GracePeriod::Fixed { secs: u64::MAX })),
        )
        .unwrap()
        .run()
        .unwrap_err();
        assert!(matches!(err, RolloutError::ClockOverflow { node: 0, secs: u64::MAX, .. }));
    }

    #[test]
    fn return_without_outstanding_disruption_fails() {
        let mut orch = orchestrator(vec![], &rollout_config(vec![], 1), vec![2]).unwrap();
        let err = orch.return_node_to_duty(0, ts(5)).unwrap_err();
        assert_eq!(err, RolloutError::DisruptionUnderflow { node: 0, at: ts(5) });
        assert_eq!(orch.phase(0), Some(NodePhase::Active));
    }

    #[test]
    fn empty_fleet_restarts_without_downtime() {
        let outcome = orchestrator(vec![], &rollout_config(vec![0], 2), vec![3])
            .unwrap()
            .run()
            .unwrap();
        // Nodes 0 and 1 restart together, node 2 follows node 0.
        assert_eq!(outcome.rollouts.len(), 1);
        assert_eq!(outcome.rollouts[0].finish, Some(ts(240)));
        assert_eq!(outcome.rollouts[0].duration_millis(), Some(240_000));
        assert_eq!(outcome.total_downtimes(), 0);
        assert_eq!(outcome.peak_disruption, 2);
    }
}
