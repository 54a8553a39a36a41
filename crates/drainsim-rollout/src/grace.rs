//! Grace-expiry queue.
//!
//! Entries are kept in one ascending sequence that doubles as the
//! traversal's grace stream: consumed entries stay in place ahead of the
//! read cursor, pending ones follow it. A node→slot map locates each
//! node's pending entry so an early drain can move it forward in time.

use std::collections::HashMap;

use drainsim_core::{NodeId, Timestamp};

use crate::error::{RolloutError, RolloutResult};

/// A node whose grace period expires at `at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraceEntry {
    pub at: Timestamp,
    pub node: NodeId,
    /// Rollout that took the node out of service.
    pub rollout: usize,
}

#[derive(Debug, Clone, Default)]
pub struct GraceQueue {
    entries: Vec<GraceEntry>,
    /// Pending entries only.
    slots: HashMap<NodeId, usize>,
}

impl GraceQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a pending entry, keeping the sequence sorted.
    pub fn schedule(&mut self, entry: GraceEntry) -> RolloutResult<usize> {
        if self.slots.contains_key(&entry.node) {
            return Err(RolloutError::DuplicateGraceEntry { node: entry.node });
        }
        self.entries.push(entry);
        self.slots.insert(entry.node, self.entries.len() - 1);
        let slot = self.settle(self.entries.len() - 1);
        self.verify()?;
        Ok(slot)
    }

    /// Move `node`'s pending expiry earlier to `now`.
    ///
    /// Does nothing if the entry is already due at or before `now`.
    pub fn pull_forward(&mut self, node: NodeId, now: Timestamp) -> RolloutResult<usize> {
        let slot = self.pending_slot(node)?;
        if self.entries[slot].at <= now {
            return Ok(slot);
        }
        self.entries[slot].at = now;
        let slot = self.settle(slot);
        self.verify()?;
        Ok(slot)
    }

    /// Mark `node`'s pending entry as consumed.
    pub fn complete(&mut self, node: NodeId) -> RolloutResult<GraceEntry> {
        let slot = self
            .slots
            .remove(&node)
            .ok_or(RolloutError::UnknownGraceEntry { node })?;
        Ok(self.entries[slot])
    }

    pub fn pending_slot(&self, node: NodeId) -> RolloutResult<usize> {
        self.slots
            .get(&node)
            .copied()
            .ok_or(RolloutError::UnknownGraceEntry { node })
    }

    pub fn is_pending(&self, node: NodeId) -> bool {
        self.slots.contains_key(&node)
    }

    pub fn pending_count(&self) -> usize {
        self.slots.len()
    }

    pub fn entries(&self) -> &[GraceEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Walk the entry at `from` backwards past every strictly later
    /// entry, shifting those one slot up. Returns the entry's final slot.
    fn settle(&mut self, from: usize) -> usize {
        let entry = self.entries[from];
        let mut slot = from;
        while slot > 0 && self.entries[slot - 1].at > entry.at {
            let shifted = self.entries[slot - 1];
            self.entries[slot] = shifted;
            if let Some(s) = self.slots.get_mut(&shifted.node) {
                *s = slot;
            }
            slot -= 1;
        }
        self.entries[slot] = entry;
        self.slots.insert(entry.node, slot);
        slot
    }

    fn verify(&self) -> RolloutResult<()> {
        match self.entries.windows(2).position(|w| w[0].at > w[1].at) {
            Some(i) => Err(RolloutError::GraceQueueUnordered { slot: i + 1 }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(secs: u64, node: NodeId) -> GraceEntry {
        GraceEntry {
            at: Timestamp::from_secs(secs),
            node,
            rollout: 0,
        }
    }

    fn order(queue: &GraceQueue) -> Vec<(u64, NodeId)> {
        queue
            .entries()
            .iter()
            .map(|e| (e.at.as_millis() / 1000, e.node))
            .collect()
    }

    fn assert_slots_match(queue: &GraceQueue) {
        for (slot, e) in queue.entries().iter().enumerate() {
            if queue.is_pending(e.node) {
                assert_eq!(queue.pending_slot(e.node).unwrap(), slot, "node {}", e.node);
            }
        }
    }

    #[test]
    fn varying_grace_lengths_stay_sorted() {
        let mut queue = GraceQueue::new();
        assert_eq!(queue.schedule(entry(100, 0)).unwrap(), 0);
        assert_eq!(queue.schedule(entry(300, 1)).unwrap(), 1);
        assert_eq!(queue.schedule(entry(200, 2)).unwrap(), 1);
        // Equal timestamps keep scheduling order.
        assert_eq!(queue.schedule(entry(200, 3)).unwrap(), 2);

        assert_eq!(order(&queue), vec![(100, 0), (200, 2), (200, 3), (300, 1)]);
        assert_slots_match(&queue);
    }

    #[test]
    fn pull_forward_relocates_entry() {
        let mut queue = GraceQueue::new();
        queue.schedule(entry(100, 0)).unwrap();
        queue.schedule(entry(200, 1)).unwrap();
        queue.schedule(entry(300, 2)).unwrap();
        queue.schedule(entry(400, 3)).unwrap();

        assert_eq!(queue.pull_forward(3, Timestamp::from_secs(150)).unwrap(), 1);
        assert_eq!(order(&queue), vec![(100, 0), (150, 3), (200, 1), (300, 2)]);
        assert_slots_match(&queue);
        assert_eq!(queue.pending_slot(2).unwrap(), 3);
    }

    #[test]
    fn pull_forward_stops_at_consumed_entries() {
        let mut queue = GraceQueue::new();
        queue.schedule(entry(100, 0)).unwrap();
        queue.schedule(entry(500, 1)).unwrap();
        assert_eq!(queue.complete(0).unwrap(), entry(100, 0));

        // Now is after the consumed entry, so it never moves.
        assert_eq!(queue.pull_forward(1, Timestamp::from_secs(120)).unwrap(), 1);
        assert_eq!(order(&queue), vec![(100, 0), (120, 1)]);
    }

    #[test]
    fn pull_forward_to_a_later_time_is_noop() {
        let mut queue = GraceQueue::new();
        queue.schedule(entry(100, 0)).unwrap();
        assert_eq!(queue.pull_forward(0, Timestamp::from_secs(150)).unwrap(), 0);
        assert_eq!(order(&queue), vec![(100, 0)]);
    }

    #[test]
    fn node_can_be_rescheduled_after_completion() {
        let mut queue = GraceQueue::new();
        queue.schedule(entry(100, 4)).unwrap();
        assert_eq!(
            queue.schedule(entry(150, 4)),
            Err(RolloutError::DuplicateGraceEntry { node: 4 })
        );
        queue.complete(4).unwrap();
        assert_eq!(queue.schedule(entry(400, 4)).unwrap(), 1);
        assert_eq!(queue.pending_count(), 1);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn unknown_nodes_are_rejected() {
        let mut queue = GraceQueue::new();
        assert_eq!(
            queue.pull_forward(7, Timestamp::from_secs(1)),
            Err(RolloutError::UnknownGraceEntry { node: 7 })
        );
        assert_eq!(queue.complete(7), Err(RolloutError::UnknownGraceEntry { node: 7 }));
    }
}
