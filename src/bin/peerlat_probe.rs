// peerlat probe CLI
// Runs the discovery -> allocation -> copy-timing pipeline against the
// built-in simulated topology and prints the summary.

use anyhow::Context;
use clap::Parser;
use colored::*;
use peerlat::telemetry::TelemetryLogger;
use peerlat::topology::DeviceType;
use peerlat::{load_transfer_profile, run_probe, SimTopologyBuilder, TransferProfile};
use std::path::PathBuf;

#[derive(Parser)]
#[clap(name = "peerlat-probe")]
#[clap(about = "Peer-to-peer copy latency probe", long_about = None)]
struct Cli {
    /// Profile name from the config file
    #[clap(short, long)]
    profile: Option<String>,

    /// Path to the transfer profiles TOML
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Override: source agent index
    #[clap(long)]
    src: Option<usize>,

    /// Override: destination agent index
    #[clap(long)]
    dst: Option<usize>,

    /// Override: transfer size in bytes
    #[clap(long)]
    size: Option<u64>,

    /// Override: repetition count
    #[clap(long)]
    reps: Option<usize>,

    /// Telemetry JSONL output path (disabled when absent)
    #[clap(long)]
    telemetry: Option<String>,

    /// Verbose per-round output
    #[clap(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (name, mut profile) = match (&cli.config, &cli.profile) {
        (None, None) => ("builtin".to_string(), TransferProfile::default()),
        _ => load_transfer_profile(cli.config.as_deref(), cli.profile.as_deref())
            .context("profile loading failed")?,
    };

    if let Some(src) = cli.src {
        profile.src_agent = src;
    }
    if let Some(dst) = cli.dst {
        profile.dst_agent = dst;
    }
    if let Some(size) = cli.size {
        profile.size_bytes = size;
    }
    if let Some(reps) = cli.reps {
        profile.repetitions = reps;
    }
    if cli.verbose {
        profile.verbose = true;
    }

    println!(
        "{} profile '{}': agents {} -> {}, {} B, {} round(s)",
        "Running".green().bold(),
        name,
        profile.src_agent,
        profile.dst_agent,
        profile.size_bytes,
        profile.repetitions
    );

    let telemetry = match &cli.telemetry {
        Some(path) => Some(
            TelemetryLogger::with_path("probe", path).context("telemetry setup failed")?,
        ),
        None => None,
    };

    // Demo topology: one CPU with a system pool, two GPUs. Real backends plug
    // in through the DeviceRuntime trait.
    let runtime = SimTopologyBuilder::new()
        .agent("host-cpu", DeviceType::Cpu, 0)
        .kernarg_pool(16 << 20)
        .pool(256 << 20)
        .agent("gpu-0", DeviceType::Gpu, 1)
        .pool(512 << 20)
        .agent("gpu-1", DeviceType::Gpu, 2)
        .pool(512 << 20)
        .build();

    let summary = run_probe(&runtime, &profile, telemetry.as_ref())?;

    println!();
    println!("{}", summary.format_summary().cyan());

    Ok(())
}
