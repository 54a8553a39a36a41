//! drainsim-ledger — temporal assignment ledger.
//!
//! Records, for every node and every meeting, the full history of which
//! node hosts which meeting, plus the fleet-wide maintenance set over time.
//!
//! # Architecture
//!
//! Each history is a [`Timeline`]: an append-only vector of
//! `(timestamp, value)` snapshots. Writes must never go back in time for
//! the timeline they touch; reads return the last snapshot at or before
//! the queried instant. Node and maintenance snapshots are `im::OrdSet`s,
//! so each copy-on-write step shares structure with its predecessor.

pub mod error;
pub mod ledger;
pub mod timeline;

pub use error::{Entity, LedgerError, LedgerResult};
pub use ledger::AssignmentLedger;
pub use timeline::{Snapshot, Timeline};
