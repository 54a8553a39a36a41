//! Connection-count load index.
//!
//! Each scope keeps `node → load` and the inverse `load → nodes` bucket
//! map. Empty buckets are dropped, so the first bucket is always the
//! lowest load present and the least-loaded lookup never walks the
//! whole fleet.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use rand::Rng;
use rand::seq::SliceRandom;
use tracing::debug;

use drainsim_core::{MeetingId, NodeId, ShardTopology};

use crate::error::{PlacementError, PlacementResult};

/// Load buckets for one scope.
#[derive(Debug, Clone, Default)]
pub struct LoadBuckets {
    node_load: BTreeMap<NodeId, u32>,
    by_load: BTreeMap<u32, BTreeSet<NodeId>>,
}

impl LoadBuckets {
    /// Start every node in `nodes` at load zero.
    pub fn new(nodes: impl IntoIterator<Item = NodeId>) -> Self {
        let node_load: BTreeMap<NodeId, u32> = nodes.into_iter().map(|n| (n, 0)).collect();
        let mut by_load = BTreeMap::new();
        if !node_load.is_empty() {
            by_load.insert(0, node_load.keys().copied().collect());
        }
        Self { node_load, by_load }
    }

    pub fn load(&self, node: NodeId) -> Option<u32> {
        self.node_load.get(&node).copied()
    }

    pub fn add(&mut self, node: NodeId, count: u32) {
        let from = self.node_load.get(&node).copied().unwrap_or(0);
        self.set_load(node, from, from + count);
    }

    /// Subtract `count`; returns false (and changes nothing) on underflow.
    pub fn subtract(&mut self, node: NodeId, count: u32) -> bool {
        let from = self.node_load.get(&node).copied().unwrap_or(0);
        let Some(to) = from.checked_sub(count) else {
            return false;
        };
        self.set_load(node, from, to);
        true
    }

    fn set_load(&mut self, node: NodeId, from: u32, to: u32) {
        if let Some(bucket) = self.by_load.get_mut(&from) {
            bucket.remove(&node);
            if bucket.is_empty() {
                self.by_load.remove(&from);
            }
        }
        self.by_load.entry(to).or_default().insert(node);
        self.node_load.insert(node, to);
    }

    /// Lowest-load eligible node; ties are broken uniformly at random.
    pub fn least_loaded<R: Rng + ?Sized>(
        &self,
        eligible: impl Fn(NodeId) -> bool,
        rng: &mut R,
    ) -> Option<NodeId> {
        for nodes in self.by_load.values() {
            let candidates: Vec<NodeId> = nodes.iter().copied().filter(|&n| eligible(n)).collect();
            if let Some(&node) = candidates.choose(rng) {
                return Some(node);
            }
        }
        None
    }

    /// Sum of all node loads.
    pub fn total(&self) -> u64 {
        self.node_load.values().map(|&l| u64::from(l)).sum()
    }

    /// Every node sits in exactly the bucket matching its load.
    pub fn is_consistent(&self) -> bool {
        let bucketed: usize = self.by_load.values().map(BTreeSet::len).sum();
        bucketed == self.node_load.len()
            && self.by_load.values().all(|b| !b.is_empty())
            && self
                .node_load
                .iter()
                .all(|(node, load)| self.by_load.get(load).is_some_and(|b| b.contains(node)))
    }
}

/// How nodes are grouped into load scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadScope {
    /// One scope covering the whole fleet.
    Global,
    /// One scope per island.
    PerIsland,
}

/// Live connection counts per node, grouped by scope, plus per-meeting
/// counts so a migrated meeting moves all of its connections at once.
#[derive(Debug, Clone)]
pub struct ShardToConnectionCount {
    scope: LoadScope,
    topology: ShardTopology,
    scopes: Vec<LoadBuckets>,
    meeting_connections: HashMap<MeetingId, u32>,
}

impl ShardToConnectionCount {
    pub fn new(topology: &ShardTopology, scope: LoadScope) -> PlacementResult<Self> {
        let scopes = match scope {
            LoadScope::Global => vec![LoadBuckets::new(0..topology.total_nodes())],
            LoadScope::PerIsland => (0..topology.island_count())
                .map(|island| topology.island_nodes(island).map(LoadBuckets::new))
                .collect::<Result<_, _>>()?,
        };
        Ok(Self {
            scope,
            topology: topology.clone(),
            scopes,
            meeting_connections: HashMap::new(),
        })
    }

    pub fn scope(&self) -> LoadScope {
        self.scope
    }

    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }

    /// Scope index holding `node`.
    pub fn scope_of(&self, node: NodeId) -> usize {
        match self.scope {
            LoadScope::Global => 0,
            LoadScope::PerIsland => self.topology.island_of(node),
        }
    }

    /// One more connection of `meeting` on `node`.
    pub fn connect(&mut self, node: NodeId, meeting: &str) {
        let scope = self.scope_of(node);
        self.scopes[scope].add(node, 1);
        *self
            .meeting_connections
            .entry(meeting.to_string())
            .or_insert(0) += 1;
    }

    /// One connection of `meeting` left `node`.
    pub fn disconnect(&mut self, node: NodeId, meeting: &str) -> PlacementResult<()> {
        let underflow = || PlacementError::LoadUnderflow {
            node,
            meeting: meeting.to_string(),
        };
        let live = self.meeting_connections(meeting);
        if live == 0 {
            return Err(underflow());
        }
        let scope = self.scope_of(node);
        if !self.scopes[scope].subtract(node, 1) {
            return Err(underflow());
        }
        if live == 1 {
            self.meeting_connections.remove(meeting);
        } else {
            self.meeting_connections.insert(meeting.to_string(), live - 1);
        }
        Ok(())
    }

    /// Move every live connection of `meeting` from `from` to `to`.
    ///
    /// Returns the number of connections moved.
    pub fn transfer(&mut self, from: NodeId, to: NodeId, meeting: &str) -> PlacementResult<u32> {
        let count = self.meeting_connections(meeting);
        if count == 0 || from == to {
            return Ok(count);
        }
        let from_scope = self.scope_of(from);
        if !self.scopes[from_scope].subtract(from, count) {
            return Err(PlacementError::LoadUnderflow {
                node: from,
                meeting: meeting.to_string(),
            });
        }
        let to_scope = self.scope_of(to);
        self.scopes[to_scope].add(to, count);
        debug!(meeting, from, to, count, "transferred connections");
        Ok(count)
    }

    pub fn node_load(&self, node: NodeId) -> u32 {
        self.scopes[self.scope_of(node)].load(node).unwrap_or(0)
    }

    pub fn meeting_connections(&self, meeting: &str) -> u32 {
        self.meeting_connections.get(meeting).copied().unwrap_or(0)
    }

    /// Least-loaded eligible node within scope `scope`.
    pub fn least_loaded_in<R: Rng + ?Sized>(
        &self,
        scope: usize,
        eligible: impl Fn(NodeId) -> bool,
        rng: &mut R,
    ) -> Option<NodeId> {
        self.scopes.get(scope)?.least_loaded(eligible, rng)
    }

    /// Sum of node loads across all scopes.
    pub fn total_connections(&self) -> u64 {
        self.scopes.iter().map(LoadBuckets::total).sum()
    }

    /// Bucket invariants hold in every scope and node loads add up to the
    /// per-meeting connection counts.
    pub fn is_consistent(&self) -> bool {
        let live: u64 = self.meeting_connections.values().map(|&c| u64::from(c)).sum();
        self.scopes.iter().all(LoadBuckets::is_consistent) && live == self.total_connections()
    }
}
