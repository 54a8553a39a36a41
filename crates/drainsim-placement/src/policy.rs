//! Node selection policies.
//!
//! A policy answers two questions for the orchestrator: which node should
//! host a meeting that is starting or being evicted, and how long a node
//! slated for restart may drain. Every policy excludes nodes the ledger
//! shows in maintenance at the query time and fails with
//! [`PlacementError::Exhausted`] rather than pick an ineligible node.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::debug;

use drainsim_core::{GracePeriod, Meeting, NodeId, PolicyConfig, PolicyKind, ShardTopology, Timestamp};
use drainsim_ledger::AssignmentLedger;

use crate::error::{PlacementError, PlacementResult};
use crate::load_index::{LoadScope, ShardToConnectionCount};
use crate::round_robin::RoundRobinCounter;

/// Read-only state a policy consults, owned by the orchestrator.
#[derive(Clone, Copy)]
pub struct PlacementContext<'a> {
    pub ledger: &'a AssignmentLedger,
    pub topology: &'a ShardTopology,
}

/// Chooses target nodes and grace periods.
///
/// The `on_*` hooks let load-aware policies keep their index in step with
/// connection joins, leaves, and forced migrations.
pub trait NodeSelectionPolicy {
    fn name(&self) -> &'static str;

    /// Node that should host `meeting` from `at` on.
    fn pick_node(
        &mut self,
        meeting: &Meeting,
        at: Timestamp,
        ctx: &PlacementContext<'_>,
    ) -> PlacementResult<NodeId>;

    /// Seconds `node` may drain before its remaining meetings are evicted.
    fn grace_period_secs(&self, node: NodeId, at: Timestamp, ctx: &PlacementContext<'_>) -> u64;

    fn on_connection_joined(&mut self, _node: NodeId, _meeting: &str) -> PlacementResult<()> {
        Ok(())
    }

    fn on_connection_released(&mut self, _node: NodeId, _meeting: &str) -> PlacementResult<()> {
        Ok(())
    }

    fn on_meeting_migrated(&mut self, _from: NodeId, _to: NodeId, _meeting: &str) -> PlacementResult<()> {
        Ok(())
    }

    /// The policy's load index, if it keeps one.
    fn load_index(&self) -> Option<&ShardToConnectionCount> {
        None
    }
}

/// Build the policy described by `config` for `topology`.
pub fn build_policy(
    config: &PolicyConfig,
    topology: &ShardTopology,
) -> PlacementResult<Box<dyn NodeSelectionPolicy>> {
    let grace = config.grace.clone();
    let policy: Box<dyn NodeSelectionPolicy> = match config.kind {
        PolicyKind::RoundRobin => Box::new(RoundRobinPolicy::new(grace)),
        PolicyKind::Random => Box::new(RandomPolicy::new(grace, config.seed)),
        PolicyKind::LeastLoaded => Box::new(LeastLoadedPolicy::new(topology, grace, config.seed)?),
        PolicyKind::IslandLeastLoaded => {
            Box::new(IslandLeastLoadedPolicy::new(topology, grace, config.seed)?)
        }
    };
    Ok(policy)
}

fn grace_for(grace: &GracePeriod, node: NodeId, at: Timestamp, ctx: &PlacementContext<'_>) -> u64 {
    grace.secs_for(ctx.ledger.meetings_on_node(node, at).len())
}

fn exhausted(meeting: &Meeting, at: Timestamp, ctx: &PlacementContext<'_>) -> PlacementError {
    PlacementError::Exhausted {
        meeting: meeting.id.clone(),
        at,
        total: ctx.topology.total_nodes(),
    }
}

// ── Round robin ────────────────────────────────────────────────────

/// Picks nodes in sequence, skipping nodes in maintenance. Load-blind.
#[derive(Debug)]
pub struct RoundRobinPolicy {
    counter: RoundRobinCounter,
    grace: GracePeriod,
}

impl RoundRobinPolicy {
    pub fn new(grace: GracePeriod) -> Self {
        Self {
            counter: RoundRobinCounter::new(),
            grace,
        }
    }
}

impl NodeSelectionPolicy for RoundRobinPolicy {
    fn name(&self) -> &'static str {
        PolicyKind::RoundRobin.label()
    }

    fn pick_node(
        &mut self,
        meeting: &Meeting,
        at: Timestamp,
        ctx: &PlacementContext<'_>,
    ) -> PlacementResult<NodeId> {
        let maintenance = ctx.ledger.nodes_in_maintenance(at);
        let node = self
            .counter
            .next_eligible(ctx.topology.total_nodes(), |n| !maintenance.contains(&n))
            .ok_or_else(|| exhausted(meeting, at, ctx))?;
        debug!(meeting = %meeting.id, node, position = self.counter.position(), "round-robin pick");
        Ok(node)
    }

    fn grace_period_secs(&self, node: NodeId, at: Timestamp, ctx: &PlacementContext<'_>) -> u64 {
        grace_for(&self.grace, node, at, ctx)
    }
}

// ── Random ─────────────────────────────────────────────────────────

/// Picks uniformly among nodes not in maintenance.
#[derive(Debug)]
pub struct RandomPolicy {
    rng: StdRng,
    grace: GracePeriod,
}

impl RandomPolicy {
    pub fn new(grace: GracePeriod, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            grace,
        }
    }
}

impl NodeSelectionPolicy for RandomPolicy {
    fn name(&self) -> &'static str {
        PolicyKind::Random.label()
    }

    fn pick_node(
        &mut self,
        meeting: &Meeting,
        at: Timestamp,
        ctx: &PlacementContext<'_>,
    ) -> PlacementResult<NodeId> {
        let maintenance = ctx.ledger.nodes_in_maintenance(at);
        let eligible: Vec<NodeId> = (0..ctx.topology.total_nodes())
            .filter(|n| !maintenance.contains(n))
            .collect();
        let node = eligible
            .choose(&mut self.rng)
            .copied()
            .ok_or_else(|| exhausted(meeting, at, ctx))?;
        debug!(meeting = %meeting.id, node, in_maintenance = maintenance.len(), "random pick");
        Ok(node)
    }

    fn grace_period_secs(&self, node: NodeId, at: Timestamp, ctx: &PlacementContext<'_>) -> u64 {
        grace_for(&self.grace, node, at, ctx)
    }
}

// ── Least loaded (global) ──────────────────────────────────────────

/// Picks the node with the fewest live connections across the fleet.
#[derive(Debug)]
pub struct LeastLoadedPolicy {
    index: ShardToConnectionCount,
    rng: StdRng,
    grace: GracePeriod,
}

impl LeastLoadedPolicy {
    pub fn new(topology: &ShardTopology, grace: GracePeriod, seed: u64) -> PlacementResult<Self> {
        Ok(Self {
            index: ShardToConnectionCount::new(topology, LoadScope::Global)?,
            rng: StdRng::seed_from_u64(seed),
            grace,
        })
    }
}

impl NodeSelectionPolicy for LeastLoadedPolicy {
    fn name(&self) -> &'static str {
        PolicyKind::LeastLoaded.label()
    }

    fn pick_node(
        &mut self,
        meeting: &Meeting,
        at: Timestamp,
        ctx: &PlacementContext<'_>,
    ) -> PlacementResult<NodeId> {
        let maintenance = ctx.ledger.nodes_in_maintenance(at);
        let node = self
            .index
            .least_loaded_in(0, |n| !maintenance.contains(&n), &mut self.rng)
            .ok_or_else(|| exhausted(meeting, at, ctx))?;
        debug!(meeting = %meeting.id, node, load = self.index.node_load(node), "least-loaded pick");
        Ok(node)
    }

    fn grace_period_secs(&self, node: NodeId, at: Timestamp, ctx: &PlacementContext<'_>) -> u64 {
        grace_for(&self.grace, node, at, ctx)
    }

    fn on_connection_joined(&mut self, node: NodeId, meeting: &str) -> PlacementResult<()> {
        self.index.connect(node, meeting);
        Ok(())
    }

    fn on_connection_released(&mut self, node: NodeId, meeting: &str) -> PlacementResult<()> {
        self.index.disconnect(node, meeting)
    }

    fn on_meeting_migrated(&mut self, from: NodeId, to: NodeId, meeting: &str) -> PlacementResult<()> {
        self.index.transfer(from, to, meeting).map(|_| ())
    }

    fn load_index(&self) -> Option<&ShardToConnectionCount> {
        Some(&self.index)
    }
}

// ── Least loaded within a random island ────────────────────────────

/// Picks an island uniformly at random, then its least-loaded node.
///
/// Islands with no eligible node are skipped in a random order.
#[derive(Debug)]
pub struct IslandLeastLoadedPolicy {
    index: ShardToConnectionCount,
    rng: StdRng,
    grace: GracePeriod,
}

impl IslandLeastLoadedPolicy {
    pub fn new(topology: &ShardTopology, grace: GracePeriod, seed: u64) -> PlacementResult<Self> {
        Ok(Self {
            index: ShardToConnectionCount::new(topology, LoadScope::PerIsland)?,
            rng: StdRng::seed_from_u64(seed),
            grace,
        })
    }
}

impl NodeSelectionPolicy for IslandLeastLoadedPolicy {
    fn name(&self) -> &'static str {
        PolicyKind::IslandLeastLoaded.label()
    }

    fn pick_node(
        &mut self,
        meeting: &Meeting,
        at: Timestamp,
        ctx: &PlacementContext<'_>,
    ) -> PlacementResult<NodeId> {
        let maintenance = ctx.ledger.nodes_in_maintenance(at);
        let mut islands: Vec<usize> = (0..self.index.scope_count()).collect();
        islands.shuffle(&mut self.rng);

        for island in islands {
            if let Some(node) =
                self.index
                    .least_loaded_in(island, |n| !maintenance.contains(&n), &mut self.rng)
            {
                debug!(meeting = %meeting.id, island, node, load = self.index.node_load(node), "island pick");
                return Ok(node);
            }
        }
        Err(exhausted(meeting, at, ctx))
    }

    fn grace_period_secs(&self, node: NodeId, at: Timestamp, ctx: &PlacementContext<'_>) -> u64 {
        grace_for(&self.grace, node, at, ctx)
    }

    fn on_connection_joined(&mut self, node: NodeId, meeting: &str) -> PlacementResult<()> {
        self.index.connect(node, meeting);
        Ok(())
    }

    fn on_connection_released(&mut self, node: NodeId, meeting: &str) -> PlacementResult<()> {
        self.index.disconnect(node, meeting)
    }

    fn on_meeting_migrated(&mut self, from: NodeId, to: NodeId, meeting: &str) -> PlacementResult<()> {
        self.index.transfer(from, to, meeting).map(|_| ())
    }

    fn load_index(&self) -> Option<&ShardToConnectionCount> {
        Some(&self.index)
    }
}
