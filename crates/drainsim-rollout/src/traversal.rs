//! Event traversal — k-way merge over time-ordered action streams.
//!
//! Each call to [`Traversal::next`] looks at the head of every stream
//! that still has unconsumed entries and yields the one with the
//! smallest timestamp. Ties go to the stream listed first, so the
//! caller's stream order is a priority order.
//!
//! Streams may grow between calls. Entries appended while the
//! traversal runs must not be earlier than the action that appended
//! them; the traversal never re-sorts.

use drainsim_core::Timestamp;

/// An action due at `at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scheduled<A> {
    pub at: Timestamp,
    pub action: A,
}

impl<A> Scheduled<A> {
    pub fn new(at: Timestamp, action: A) -> Self {
        Self { at, action }
    }
}

/// A sequence of actions sorted ascending by timestamp.
pub trait ActionStream<A> {
    fn len(&self) -> usize;

    fn timestamp_at(&self, idx: usize) -> Timestamp;

    fn action_at(&self, idx: usize) -> A;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<A: Copy> ActionStream<A> for Vec<Scheduled<A>> {
    fn len(&self) -> usize {
        self.as_slice().len()
    }

    fn timestamp_at(&self, idx: usize) -> Timestamp {
        self[idx].at
    }

    fn action_at(&self, idx: usize) -> A {
        self[idx].action
    }
}

/// Per-stream read cursors.
#[derive(Debug, Clone, Default)]
pub struct Traversal {
    cursors: Vec<usize>,
    fired: u64,
}

impl Traversal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume and return the earliest head across `streams`, with the
    /// index of the stream it came from.
    ///
    /// `streams` must be passed in the same order on every call.
    pub fn next<A>(&mut self, streams: &[&dyn ActionStream<A>]) -> Option<(usize, Scheduled<A>)> {
        if self.cursors.len() < streams.len() {
            self.cursors.resize(streams.len(), 0);
        }

        let mut best: Option<(usize, Timestamp)> = None;
        for (idx, stream) in streams.iter().enumerate() {
            let cursor = self.cursors[idx];
            if cursor >= stream.len() {
                continue;
            }
            let at = stream.timestamp_at(cursor);
            // Strict comparison keeps the earlier stream on ties.
            if best.is_none_or(|(_, best_at)| at < best_at) {
                best = Some((idx, at));
            }
        }

        let (idx, at) = best?;
        let action = streams[idx].action_at(self.cursors[idx]);
        self.cursors[idx] += 1;
        self.fired += 1;
        Some((idx, Scheduled { at, action }))
    }

    /// Entries consumed so far from stream `idx`.
    pub fn cursor(&self, idx: usize) -> usize {
        self.cursors.get(idx).copied().unwrap_or(0)
    }

    /// Total actions yielded.
    pub fn fired(&self) -> u64 {
        self.fired
    }
}

/// Drive `exec` over owned `Vec` streams until all are exhausted.
///
/// The executor receives the stream index, the action, and mutable
/// access to every stream so it can schedule follow-up actions.
pub fn traverse<A, E>(
    streams: &mut [Vec<Scheduled<A>>],
    mut exec: impl FnMut(usize, Scheduled<A>, &mut [Vec<Scheduled<A>>]) -> Result<(), E>,
) -> Result<u64, E>
where
    A: Copy,
{
    let mut traversal = Traversal::new();
    loop {
        let next = {
            let views: Vec<&dyn ActionStream<A>> =
                streams.iter().map(|s| s as &dyn ActionStream<A>).collect();
            traversal.next(&views)
        };
        let Some((idx, scheduled)) = next else {
            return Ok(traversal.fired());
        };
        exec(idx, scheduled, streams)?;
    }
}
