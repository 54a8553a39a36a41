use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "drainsim",
    about = "drainsim — rolling restart simulator for meeting-hosting fleets",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate the configured rollouts over a set of meetings.
    ///
    /// Meetings are read as a JSON array; timestamps are milliseconds
    /// since the Unix epoch.
    Run {
        /// Simulation config (drainsim.toml)
        #[arg(short, long, default_value = "drainsim.toml")]
        config: PathBuf,
        /// Meetings JSON file
        #[arg(short, long)]
        meetings: PathBuf,
        /// Write the final assignment ledger as JSON to this path
        #[arg(long)]
        dump_ledger: Option<PathBuf>,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Parse and validate a config, then print it with defaults filled in
    CheckConfig {
        #[arg(short, long, default_value = "drainsim.toml")]
        config: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json)?;

    match cli.command {
        Commands::Run {
            config,
            meetings,
            dump_ledger,
            format,
        } => commands::run::run(&config, &meetings, dump_ledger.as_deref(), &format),
        Commands::CheckConfig { config } => commands::check::check_config(&config),
    }
}

fn init_tracing(json: bool) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("drainsim=info".parse()?);
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}
