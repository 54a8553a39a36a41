//! Simulation config parser (`drainsim.toml`).

use std::path::Path;

use anyhow::bail;
use serde::{Deserialize, Serialize};

use crate::error::CoreResult;
use crate::topology::ShardTopology;
use crate::types::Timestamp;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default)]
    pub fleet: FleetConfig,
    #[serde(default)]
    pub rollout: RolloutConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    /// Node count of each island, in global index order.
    pub islands: Vec<usize>,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            islands: vec![10; 3],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RolloutConfig {
    /// Instants at which a new version rollout begins.
    pub start_times: Vec<Timestamp>,
    /// Maximum number of nodes draining or restarting at once.
    pub disruption_budget: usize,
    /// Seconds a node takes to come back after its restart begins.
    pub node_restart_secs: u64,
}

impl RolloutConfig {
    /// Rollout start times in ascending order.
    pub fn sorted_start_times(&self) -> Vec<Timestamp> {
        let mut times = self.start_times.clone();
        times.sort();
        times
    }
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            start_times: Vec::new(),
            disruption_budget: 3,
            node_restart_secs: 120,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub kind: PolicyKind,
    /// Seed for the policy's tie-breaking RNG.
    pub seed: u64,
    pub grace: GracePeriod,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            kind: PolicyKind::IslandLeastLoaded,
            seed: 0,
            grace: GracePeriod::default(),
        }
    }
}

/// Node-selection policy used for new and migrated meetings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    RoundRobin,
    Random,
    LeastLoaded,
    IslandLeastLoaded,
}

impl PolicyKind {
    pub fn label(&self) -> &'static str {
        match self {
            PolicyKind::RoundRobin => "round_robin",
            PolicyKind::Random => "random",
            PolicyKind::LeastLoaded => "least_loaded",
            PolicyKind::IslandLeastLoaded => "island_least_loaded",
        }
    }
}

/// How long a node holding meetings drains before they are evicted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GracePeriod {
    Fixed {
        secs: u64,
    },
    /// `min(max_secs, base_secs + per_meeting_secs * meetings)`.
    PerMeeting {
        base_secs: u64,
        per_meeting_secs: u64,
        max_secs: u64,
    },
}

impl Default for GracePeriod {
    fn default() -> Self {
        GracePeriod::Fixed { secs: 60 }
    }
}

impl GracePeriod {
    /// Grace length for a node currently holding `meetings` meetings.
    pub fn secs_for(&self, meetings: usize) -> u64 {
        match *self {
            GracePeriod::Fixed { secs } => secs,
            GracePeriod::PerMeeting {
                base_secs,
                per_meeting_secs,
                max_secs,
            } => base_secs
                .saturating_add(per_meeting_secs.saturating_mul(meetings as u64))
                .min(max_secs),
        }
    }
}

impl SimulationConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: SimulationConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject configs the simulator cannot run.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.topology()?;
        if self.rollout.disruption_budget == 0 {
            bail!("rollout.disruption_budget must be at least 1");
        }
        if let GracePeriod::PerMeeting {
            base_secs,
            max_secs,
            ..
        } = self.policy.grace
        {
            if max_secs < base_secs {
                bail!("policy.grace.max_secs ({max_secs}) is below base_secs ({base_secs})");
            }
        }
        Ok(())
    }

    pub fn topology(&self) -> CoreResult<ShardTopology> {
        ShardTopology::new(self.fleet.islands.clone())
    }
}
