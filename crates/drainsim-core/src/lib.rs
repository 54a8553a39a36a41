//! drainsim-core — shared types for the rollout simulator.
//!
//! Everything here is plain data or pure arithmetic: timestamps, meetings
//! and their connections, the fleet's island topology, the sorted meeting
//! indices consumers bucket by time, and the TOML simulation config.

pub mod config;
pub mod error;
pub mod sorted;
pub mod topology;
pub mod types;

pub use config::{FleetConfig, GracePeriod, PolicyConfig, PolicyKind, RolloutConfig, SimulationConfig};
pub use error::{CoreError, CoreResult};
pub use sorted::{ConnectionRef, SortedMeetings};
pub use topology::ShardTopology;
pub use types::*;
