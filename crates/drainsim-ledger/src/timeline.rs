//! Append-only, last-known-before timelines.

use serde::Serialize;

use drainsim_core::Timestamp;

use crate::error::{Entity, LedgerError, LedgerResult};

/// A value as of `at`, valid until the next snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot<T> {
    pub at: Timestamp,
    pub value: T,
}

/// Time-ordered sequence of snapshots for one entity.
///
/// Snapshot timestamps are strictly increasing: a write at the same
/// instant as the last snapshot replaces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Timeline<T> {
    entries: Vec<Snapshot<T>>,
}

impl<T> Default for Timeline<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T> Timeline<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<&Snapshot<T>> {
        self.entries.last()
    }

    pub fn last_written(&self) -> Option<Timestamp> {
        self.entries.last().map(|s| s.at)
    }

    /// Value of the latest snapshot taken at or before `at`.
    pub fn value_at(&self, at: Timestamp) -> Option<&T> {
        let idx = self.entries.partition_point(|s| s.at <= at);
        idx.checked_sub(1).map(|i| &self.entries[i].value)
    }

    /// Fail if `at` predates the last write to this timeline.
    pub fn ensure_not_before_last(&self, entity: impl FnOnce() -> Entity, at: Timestamp) -> LedgerResult<()> {
        match self.last_written() {
            Some(last) if at < last => Err(LedgerError::Causality {
                entity: entity(),
                last,
                attempted: at,
            }),
            _ => Ok(()),
        }
    }

    /// Append a snapshot at `at`, replacing one already taken at `at`.
    pub fn record(&mut self, entity: impl FnOnce() -> Entity, at: Timestamp, value: T) -> LedgerResult<()> {
        self.ensure_not_before_last(entity, at)?;
        match self.entries.last_mut() {
            Some(last) if last.at == at => last.value = value,
            _ => self.entries.push(Snapshot { at, value }),
        }
        Ok(())
    }

    pub fn entries(&self) -> &[Snapshot<T>] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
