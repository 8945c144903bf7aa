use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use gearmotor_runtime::config::{RuntimeConfig, LOOP_HZ, MAX_LOOP_HZ};
use gearmotor_runtime::runtime::{self, RunOptions};

/// Cascade motor control runtime
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Motor layout (JSON); the built-in demo layout is used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Control loop frequency in Hz
    #[arg(
        long,
        default_value_t = LOOP_HZ,
        value_parser = clap::value_parser!(u64).range(1..=MAX_LOOP_HZ)
    )]
    hz: u64,

    /// Exit after this many control ticks
    #[arg(long)]
    ticks: Option<u64>,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init(); // installs the subscriber globally

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => match RuntimeConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => {
            info!("No motor layout given, using the demo layout");
            RuntimeConfig::demo()
        }
    };

    let options = RunOptions {
        config,
        loop_hz: args.hz,
        max_ticks: args.ticks,
    };

    if let Err(e) = runtime::run(options).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
