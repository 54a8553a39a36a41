//! Fleet topology — islands of nodes over a flat global index space.
//!
//! Island `i` owns the contiguous global range starting right after the
//! last node of island `i - 1`.

use std::ops::Range;

use crate::error::{CoreError, CoreResult};
use crate::types::NodeId;

/// Maps global node indices to `(island, index-in-island)` and back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardTopology {
    island_sizes: Vec<usize>,
    /// Global index of each island's first node.
    offsets: Vec<usize>,
    total: usize,
}

impl ShardTopology {
    /// Build a topology from ordered per-island node counts.
    pub fn new(island_sizes: Vec<usize>) -> CoreResult<Self> {
        if let Some(island) = island_sizes.iter().position(|&size| size == 0) {
            return Err(CoreError::EmptyIsland { island });
        }
        let mut offsets = Vec::with_capacity(island_sizes.len());
        let mut total = 0;
        for size in &island_sizes {
            offsets.push(total);
            total += size;
        }
        if total == 0 {
            return Err(CoreError::EmptyTopology);
        }
        Ok(Self {
            island_sizes,
            offsets,
            total,
        })
    }

    pub fn total_nodes(&self) -> usize {
        self.total
    }

    pub fn island_count(&self) -> usize {
        self.island_sizes.len()
    }

    pub fn island_size(&self, island: usize) -> CoreResult<usize> {
        self.island_sizes
            .get(island)
            .copied()
            .ok_or(CoreError::IslandOutOfRange {
                island,
                islands: self.island_count(),
            })
    }

    /// Island holding `node`. Panics if the node is outside the fleet.
    pub fn island_of(&self, node: NodeId) -> usize {
        assert!(node < self.total, "node {node} outside fleet of {}", self.total);
        // Offsets are strictly increasing, so the owner is the last offset <= node.
        self.offsets.partition_point(|&offset| offset <= node) - 1
    }

    pub fn index_in_island(&self, node: NodeId) -> usize {
        node - self.offsets[self.island_of(node)]
    }

    pub fn global_index(&self, island: usize, index: usize) -> CoreResult<NodeId> {
        let size = self.island_size(island)?;
        if index >= size {
            return Err(CoreError::IndexOutOfRange { island, index, size });
        }
        Ok(self.offsets[island] + index)
    }

    /// Global node range covered by `island`.
    pub fn island_nodes(&self, island: usize) -> CoreResult<Range<NodeId>> {
        let size = self.island_size(island)?;
        let start = self.offsets[island];
        Ok(start..start + size)
    }

    pub fn island_sizes(&self) -> &[usize] {
        &self.island_sizes
    }
}
