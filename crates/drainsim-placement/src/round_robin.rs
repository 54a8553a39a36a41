//! Round-robin cursor over the fleet.

use drainsim_core::NodeId;

/// Walks node indices in order, wrapping at the fleet size.
///
/// The cursor advances past every node it inspects, eligible or not, so
/// a skipped node is not retried until the walk comes back around.
#[derive(Debug, Default)]
pub struct RoundRobinCounter {
    position: usize,
}

impl RoundRobinCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next node in `0..total` accepted by `eligible`, inspecting each
    /// node at most once. `None` if no node qualifies or `total` is zero.
    pub fn next_eligible(&mut self, total: usize, eligible: impl Fn(NodeId) -> bool) -> Option<NodeId> {
        for _ in 0..total {
            let node = self.position % total;
            self.position = self.position.wrapping_add(1);
            if eligible(node) {
                return Some(node);
            }
        }
        None
    }

    /// Number of nodes inspected so far.
    pub fn position(&self) -> usize {
        self.position
    }
}
