use std::path::Path;

use anyhow::{Context, Result};
use drainsim_core::SimulationConfig;

/// Run the `drainsim check-config` command.
pub fn check_config(path: &Path) -> Result<()> {
    let config = load_config(path)?;
    let topology = config.topology()?;

    println!(
        "✓ {} is valid: {} nodes in {} islands, policy {}",
        path.display(),
        topology.total_nodes(),
        topology.island_count(),
        config.policy.kind.label()
    );
    print!("{}", config.to_toml_string()?);
    Ok(())
}

pub(crate) fn load_config(path: &Path) -> Result<SimulationConfig> {
    SimulationConfig::from_file(path)
        .with_context(|| format!("failed to load config {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn accepts_valid_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drainsim.toml");
        fs::write(&path, "[fleet]\nislands = [2, 2]\n").unwrap();
        check_config(&path).unwrap();
    }

    #[test]
    fn reports_the_failing_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "[rollout]\ndisruption_budget = 0\n").unwrap();

        let err = check_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("bad.toml"));
        assert!(format!("{err:#}").contains("disruption_budget"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(check_config(&dir.path().join("absent.toml")).is_err());
    }
}
