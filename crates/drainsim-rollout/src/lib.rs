//! drainsim-rollout — rolling restart simulation.
//!
//! The orchestrator merges seven time-ordered action streams (meeting
//! starts, peer joins, rollout starts, grace expiries, node startups,
//! peer leaves, meeting finishes) and executes them in global time
//! order. Draining nodes lose their remaining meetings when grace
//! expires; each forced move is recorded as a downtime on the rollout
//! that took the node out of service.
//!
//! # Components
//!
//! - **`traversal`** — k-way merge over growable action streams
//! - **`grace`** — sorted grace-expiry queue with early relocation
//! - **`controller`** — the orchestrator state machine
//! - **`outcome`** — rollouts, downtimes, and the run result

pub mod controller;
pub mod error;
pub mod grace;
pub mod outcome;
pub mod traversal;

pub use controller::{Action, NodePhase, RolloutOrchestrator};
pub use error::{RolloutError, RolloutResult};
pub use grace::{GraceEntry, GraceQueue};
pub use outcome::{Downtime, Rollout, SimulationOutcome};
pub use traversal::{ActionStream, Scheduled, Traversal, traverse};
