//! `drainsim run` — load meetings, simulate, report.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use drainsim_core::Meeting;
use drainsim_rollout::{RolloutOrchestrator, SimulationOutcome};

use super::check::load_config;

/// Run the `drainsim run` command.
pub fn run(config_path: &Path, meetings_path: &Path, dump_ledger: Option<&Path>, format: &str) -> Result<()> {
    let config = load_config(config_path)?;
    let meetings = load_meetings(meetings_path)?;
    info!(meetings = meetings.len(), path = %meetings_path.display(), "loaded meetings");

    let outcome = RolloutOrchestrator::from_config(meetings, &config)
        .context("invalid simulation input")?
        .run()
        .context("simulation failed")?;

    if let Some(path) = dump_ledger {
        let json = serde_json::to_string_pretty(&outcome.ledger)?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write ledger to {}", path.display()))?;
        info!(path = %path.display(), "ledger written");
    }

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&outcome)?),
        _ => println!("{}", format_summary(&outcome)),
    }
    Ok(())
}

fn load_meetings(path: &Path) -> Result<Vec<Meeting>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read meetings {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("failed to parse meetings {}", path.display()))
}

/// Human-readable per-rollout summary.
pub fn format_summary(outcome: &SimulationOutcome) -> String {
    let mut out = format!(
        "{} meetings, {} rollouts, {} downtimes, peak disruption {}\n",
        outcome.meetings.len(),
        outcome.rollouts.len(),
        outcome.total_downtimes(),
        outcome.peak_disruption
    );
    for rollout in &outcome.rollouts {
        let finish = rollout
            .finish
            .map(|f| f.to_string())
            .unwrap_or_else(|| "unfinished".to_string());
        out.push_str(&format!(
            "  rollout {}: start {}, finish {}, downtimes {}\n",
            rollout.id,
            rollout.start,
            finish,
            rollout.downtimes.len()
        ));
    }
    out.trim_end().to_string()
}
