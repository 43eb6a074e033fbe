//! scalesetd — the scaleset daemon.
//!
//! Assembles the load tracker, the inventory provider and the capacity
//! reconciler into one process.
//!
//! # Usage
//!
//! ```text
//! scalesetd simulate --config scaleset.toml --peak-sessions 40
//! scalesetd plan --instances 3 --load 11
//! scalesetd config > scaleset.toml
//! ```

mod simulate;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use scaleset_core::ScaleSetConfig;
use scaleset_reconcile::compute_target_count;

const DEFAULT_LOG_FILTER: &str = "info,scaleset=debug";

#[derive(Parser)]
#[command(name = "scalesetd", about = "Session-driven instance pool reconciler")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Drive a simulated workload against an in-memory inventory.
    Simulate {
        /// Path to scaleset.toml. Built-in defaults when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Sessions to ramp up to before ramping back down.
        #[arg(long, default_value = "20")]
        peak_sessions: u32,

        /// Milliseconds between session events.
        #[arg(long, default_value = "200")]
        tick_ms: u64,
    },
    /// Print the instance count the reconciler would size the pool to.
    Plan {
        /// Path to scaleset.toml. Built-in defaults when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Instances currently tracked.
        #[arg(long)]
        instances: u32,

        /// Sessions currently bound across the pool.
        #[arg(long)]
        load: u32,
    },
    /// Print the default configuration as TOML.
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json)?;

    match cli.command {
        Command::Simulate {
            config,
            peak_sessions,
            tick_ms,
        } => {
            let config = load_config(config)?;
            simulate::run(config, peak_sessions, std::time::Duration::from_millis(tick_ms)).await
        }
        Command::Plan {
            config,
            instances,
            load,
        } => {
            let config = load_config(config)?;
            let target = compute_target_count(instances, load, &config.scaling);
            println!("{target}");
            Ok(())
        }
        Command::Config => {
            print!("{}", ScaleSetConfig::default().to_toml_string()?);
            Ok(())
        }
    }
}

fn init_tracing(json: bool) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(DEFAULT_LOG_FILTER)?,
    };

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

fn load_config(path: Option<PathBuf>) -> anyhow::Result<ScaleSetConfig> {
    match path {
        Some(path) => ScaleSetConfig::from_file(&path)
            .map_err(|e| anyhow::anyhow!("loading {}: {e}", path.display())),
        None => Ok(ScaleSetConfig::default()),
    }
}
