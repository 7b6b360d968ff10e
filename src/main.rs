//! packetd - on-device packet lifecycle daemon CLI

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use packetd::config::Config;
use packetd::daemon::Daemon;
use packetd::pipeline;

#[derive(Parser)]
#[command(name = "packetd")]
#[command(version, about = "On-device packet lifecycle daemon")]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the boot sequence and report the activation list (default)
    Boot,
    /// Initialize and print the packets that would activate
    Select,
    /// Delete decompression outputs no longer linked into the active-data
    /// directory
    Sweep,
    /// Create, resize or delete the decompression space reservation
    Reserve {
        /// Reservation size; zero deletes the reservation
        #[arg(long)]
        bytes: i64,
        /// Directory holding the reservation file
        #[arg(long)]
        dir: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => {
            Config::load(path).with_context(|| format!("failed to load {}", path.display()))?
        }
        None => Config::default(),
    };

    match cli.command.unwrap_or(Commands::Boot) {
        Commands::Boot => boot(config, true),
        Commands::Select => boot(config, false),
        Commands::Sweep => {
            pipeline::sweep_unlinked(&config.decompression_dir, &config.active_data_dir)
                .context("sweep failed")?;
            Ok(())
        }
        Commands::Reserve { bytes, dir } => {
            pipeline::reserve_space(bytes, &dir).context("reservation failed")?;
            Ok(())
        }
    }
}

fn boot(config: Config, cleanup: bool) -> Result<()> {
    let daemon = Daemon::initialize(config).context("boot initialization failed")?;
    let selected = daemon.select_for_activation();
    tracing::info!("{} packet(s) selected for activation", selected.len());
    for packet in &selected {
        println!(
            "{}@{} {}",
            packet.name(),
            packet.version(),
            packet.path().display()
        );
    }
    if cleanup {
        daemon
            .sweep_unlinked_decompressed()
            .context("post-boot cleanup failed")?;
    }
    Ok(())
}
