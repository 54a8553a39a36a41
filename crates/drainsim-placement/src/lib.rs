//! drainsim-placement — node selection for new and migrated meetings.
//!
//! Policies decide which node receives a meeting and how long a node
//! drains before its meetings are evicted. Load-aware policies keep a
//! bucket index of live connection counts so the least-loaded eligible
//! node is found without scanning the fleet.
//!
//! # Components
//!
//! - **`load_index`** — connection-count buckets, global or per island
//! - **`round_robin`** — wrapping counter used by the round-robin policy
//! - **`policy`** — `NodeSelectionPolicy` and its variants

pub mod error;
pub mod load_index;
pub mod policy;
pub mod round_robin;

pub use error::{PlacementError, PlacementResult};
pub use load_index::{LoadBuckets, LoadScope, ShardToConnectionCount};
pub use policy::{
    IslandLeastLoadedPolicy, LeastLoadedPolicy, NodeSelectionPolicy, PlacementContext,
    RandomPolicy, RoundRobinPolicy, build_policy,
};
pub use round_robin::RoundRobinCounter;
