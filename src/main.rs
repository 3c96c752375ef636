use clap::Parser;
use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::Result;
use env_logger::Env;
use log::info;
use std::path::PathBuf;

use seedemu::config_loader;
use seedemu::emulator::Emulator;
use seedemu::orchestrator;

/// Build layered network emulations and compile them to docker-compose
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the emulation description YAML file
    #[arg(short, long, required_unless_present = "load")]
    config: Option<PathBuf>,

    /// Snapshot to load; repeat to merge several, in order
    #[arg(short, long)]
    load: Vec<PathBuf>,

    /// Prefix for virtual node names of every merged-in emulation
    #[arg(long, default_value = "")]
    vnode_prefix: String,

    /// Write a snapshot to this path instead of compiling
    #[arg(long)]
    dump: Option<PathBuf>,

    /// Output directory for the compiled emulation
    #[arg(short, long, default_value = "output")]
    output: PathBuf,

    /// Replace the output directory if it exists
    #[arg(long)]
    overwrite: bool,
}

fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    let args = Args::parse();

    // The description may set the default log level, so read it before
    // the logger exists; messages logged while loading it are dropped
    let config = args
        .config
        .as_deref()
        .map(config_loader::load_config)
        .transpose()?;
    let default_level = config
        .as_ref()
        .and_then(|config| config.general.log_level.clone())
        .unwrap_or_else(|| "info".to_string());
    env_logger::Builder::from_env(Env::default().default_filter_or(default_level)).init();

    info!("Starting seedemu");
    if let (Some(path), Some(config)) = (&args.config, &config) {
        info!(
            "Loaded emulation '{}' from {:?}: {} autonomous systems, {} bindings",
            config.general.name,
            path,
            config.autonomous_systems.len(),
            config.bindings.len()
        );
    }

    let mut emulator: Option<Emulator> = config
        .as_ref()
        .map(orchestrator::build_emulator)
        .transpose()?;

    if !args.load.is_empty() {
        info!("Loading {} snapshots", args.load.len());
        emulator = Some(orchestrator::merge_snapshots(emulator, &args.load, &args.vnode_prefix)?);
    }

    let emulator = emulator.ok_or_else(|| eyre!("Nothing to build: pass --config or --load"))?;

    if let Some(path) = &args.dump {
        emulator
            .dump(path)
            .wrap_err_with(|| format!("Failed to write snapshot {}", path.display()))?;
        info!("Snapshot written to {:?}", path);
        return Ok(());
    }

    orchestrator::generate(emulator, &args.output, args.overwrite)?;
    info!("Ready to deploy with: docker compose -f {:?} up", args.output.join("docker-compose.yml"));
    Ok(())
}
