//! Albor Space 5G GNodeB Scheduler Test Bench
//!
//! Runs the MAC slot scheduler of one cell against simulated UEs and reports
//! the achieved throughput.

mod bench;
mod config;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use config::GnbConfig;
use interfaces::{BasebandFsm, TokioTaskExecutor};
use scheduler::config::expert_config::PolicyKind;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PolicyArg {
    RoundRobin,
    ProportionalFair,
}

impl From<PolicyArg> for PolicyKind {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::RoundRobin => PolicyKind::RoundRobin,
            PolicyArg::ProportionalFair => PolicyKind::ProportionalFair,
        }
    }
}

/// Albor Space 5G GNodeB scheduler test bench
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file, built-in defaults when absent
    #[arg(short, long)]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error), overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    /// Number of simulated UEs
    #[arg(long)]
    nof_ues: Option<u16>,

    /// Simulated air time in seconds
    #[arg(long)]
    duration: Option<u32>,

    /// Scheduling policy
    #[arg(long, value_enum)]
    policy: Option<PolicyArg>,

    /// Pace slots at air-interface speed
    #[arg(long)]
    realtime: bool,

    /// Seed of the traffic and feedback generator
    #[arg(long)]
    seed: Option<u64>,
}

impl Args {
    fn apply(&self, config: &mut GnbConfig) {
        if let Some(level) = &self.log_level {
            config.log.level = level.clone();
        }
        if let Some(n) = self.nof_ues {
            config.bench.nof_ues = n;
        }
        if let Some(d) = self.duration {
            config.bench.duration_s = d;
        }
        if let Some(p) = self.policy {
            config.cell_cfg.expert.policy = p.into();
        }
        if self.realtime {
            config.bench.realtime = true;
        }
        if let Some(seed) = self.seed {
            config.bench.seed = seed;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => GnbConfig::from_yaml_file(path)?,
        None => GnbConfig::default(),
    };
    args.apply(&mut config);

    // Initialize logging
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log.level));

    fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    info!("Starting Albor Space 5G GNodeB scheduler test bench");
    if let Some(path) = &args.config {
        info!("Configuration file: {}", path);
    }
    config.validate()?;

    let cell = config.cell_configuration()?;
    info!("Cell configuration:");
    info!("  PCI: {}", cell.pci.0);
    info!("  Cell ID: {}", cell.cell_id.0);
    info!("  CRBs: DL {} UL {}", cell.nof_dl_crbs, cell.nof_ul_crbs);
    info!("  Subcarrier spacing: {} kHz", cell.scs_common.to_khz());
    info!("  Duplex: {:?}", cell.duplex_mode());

    let fsm = Arc::new(BasebandFsm::new());
    let executor = TokioTaskExecutor::new(&tokio::runtime::Handle::current(), "metrics", 64)?;

    let (stop_tx, stop_rx) = oneshot::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            let _ = stop_tx.send(());
        }
    });

    let totals = bench::run(&config, &fsm, &executor, stop_rx).await?;
    executor.shutdown().await;

    info!(
        "Test bench finished: DL {} bytes ({} newtx, {} retx), UL {} bytes ({} newtx, {} retx), {} NACKs, {} CRC KOs",
        totals.dl_bytes,
        totals.dl_newtx,
        totals.dl_retx,
        totals.ul_bytes,
        totals.ul_newtx,
        totals.ul_retx,
        totals.harq_nacks,
        totals.crc_ko
    );
    Ok(())
}
