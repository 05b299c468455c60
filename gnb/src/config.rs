//! Test-Bench Configuration
//!
//! YAML layout of the scheduler test bench. Every section is optional and
//! falls back to a 10 MHz FDD cell with a handful of UEs.

use common::types::{CellId, Pci};
use scheduler::config::cell_config::TddPattern;
use scheduler::{CellConfiguration, SchedulerExpertConfig};
use serde::{Deserialize, Serialize};

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GnbConfig {
    #[serde(default)]
    pub cell_cfg: CellConfig,
    #[serde(default)]
    pub bench: BenchConfig,
    #[serde(default)]
    pub radio: RadioConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// Cell parameters exposed to the operator
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CellConfig {
    #[serde(default = "default_cell_id")]
    pub cell_id: u16,
    #[serde(default = "default_pci")]
    pub pci: u16,
    /// TDD pattern, FDD when absent
    #[serde(default)]
    pub tdd_pattern: Option<TddPattern>,
    /// Periodic CSI-RS and CSI reporting
    #[serde(default = "default_true")]
    pub csi_rs: bool,
    #[serde(default)]
    pub expert: SchedulerExpertConfig,
}

fn default_cell_id() -> u16 {
    1
}

fn default_pci() -> u16 {
    1
}

fn default_true() -> bool {
    true
}

impl Default for CellConfig {
    fn default() -> Self {
        Self {
            cell_id: default_cell_id(),
            pci: default_pci(),
            tdd_pattern: None,
            csi_rs: true,
            expert: SchedulerExpertConfig::default(),
        }
    }
}

/// Simulated UE population and traffic
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BenchConfig {
    pub nof_ues: u16,
    /// Run time in seconds of simulated air time
    pub duration_s: u32,
    /// Pace slots at air-interface speed instead of running flat out
    pub realtime: bool,
    /// Offered DL load per UE
    #[serde(rename = "dl_rate_Mbps")]
    pub dl_rate_mbps: f64,
    /// Offered UL load per UE
    #[serde(rename = "ul_rate_Mbps")]
    pub ul_rate_mbps: f64,
    /// Probability that a HARQ-ACK or CRC is positive
    pub ack_probability: f64,
    /// Wideband CQI reported on every CSI occasion
    pub cqi: u8,
    pub seed: u64,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            nof_ues: 4,
            duration_s: 10,
            realtime: false,
            dl_rate_mbps: 2.0,
            ul_rate_mbps: 0.5,
            ack_probability: 0.95,
            cqi: 15,
            seed: 1,
        }
    }
}

/// Loopback radio driven once per slot
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RadioConfig {
    pub samples_per_slot: usize,
    pub nof_buffers: usize,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            samples_per_slot: 15_360,
            nof_buffers: 8,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: default_log_level() }
    }
}

impl GnbConfig {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: GnbConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let bench = &self.bench;
        if bench.nof_ues == 0 || bench.nof_ues > 1024 {
            anyhow::bail!("nof_ues must be in 1..=1024, got {}", bench.nof_ues);
        }
        if !(0.0..=1.0).contains(&bench.ack_probability) {
            anyhow::bail!("ack_probability must be in [0, 1], got {}", bench.ack_probability);
        }
        if bench.dl_rate_mbps < 0.0 || bench.ul_rate_mbps < 0.0 {
            anyhow::bail!("traffic rates cannot be negative");
        }
        if bench.cqi == 0 || bench.cqi > 15 {
            anyhow::bail!("cqi must be in 1..=15, got {}", bench.cqi);
        }
        self.cell_configuration()?;
        Ok(())
    }

    /// Scheduler configuration of the simulated cell
    pub fn cell_configuration(&self) -> anyhow::Result<CellConfiguration> {
        let cell = &self.cell_cfg;
        let pci = Pci::new(cell.pci).ok_or_else(|| anyhow::anyhow!("Invalid PCI: {}", cell.pci))?;
        let mut cfg = CellConfiguration {
            cell_id: CellId(cell.cell_id),
            pci,
            tdd_pattern: cell.tdd_pattern.clone(),
            expert: cell.expert.clone(),
            ..Default::default()
        };
        if !cell.csi_rs {
            cfg.csi_rs = None;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}
