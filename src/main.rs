use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use lsr::protocols::hello::Timers;
use lsr::runtime::config::EmulatorConfig;
use lsr::runtime::daemon::EmulatorDaemon;
use tracing::Level;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "emulator")]
#[command(about = "Link-state routing emulator node")]
struct Args {
    /// UDP port this node binds (2050-65535).
    #[arg(short = 'p', long = "port")]
    port: u16,
    /// Seed topology file.
    #[arg(short = 'f', long = "filename")]
    filename: PathBuf,
    /// Serve JSON state on this HTTP port.
    #[arg(long)]
    status_port: Option<u16>,
    #[arg(long, default_value = "INFO")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    let cfg = EmulatorConfig {
        port: args.port,
        topology_file: args.filename,
        status_port: args.status_port,
        timers: Timers::default(),
    };
    let mut daemon = EmulatorDaemon::new(cfg)?;
    daemon.run_forever()?;
    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let level = level.parse::<Level>()?;
    // Logs go to stderr; stdout is reserved for the topology and
    // forwarding-table reports.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .with_target(true)
        .compact()
        .init();
    Ok(())
}
