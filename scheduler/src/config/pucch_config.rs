//! PUCCH Configuration
//!
//! Cell-wide pool of dedicated PUCCH resources (TS 38.331 PUCCH-Resource) and the
//! per-UE PUCCH-Config referencing them: resource sets, SR and CSI resources.

use crate::{invalid_cfg, SchedulerError};
use common::interval::{OfdmSymbolRange, PrbInterval, NOF_OFDM_SYMBOLS_PER_SLOT};
use serde::{Deserialize, Serialize};

/// Maximum number of PUCCH resources per resource set addressable by the PRI field
pub const MAX_NOF_RES_PER_PUCCH_RES_SET: usize = 8;

/// Maximum HARQ-ACK payload carried by a PUCCH format 0/1 resource
pub const MAX_HARQ_BITS_PUCCH_F0_F1: u32 = 2;

/// PUCCH format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PucchFormat {
    F0,
    F1,
    F2,
    F3,
    F4,
}

impl PucchFormat {
    /// Formats 0 and 1 carry at most two UCI bits
    pub fn is_small_payload(&self) -> bool {
        matches!(self, PucchFormat::F0 | PucchFormat::F1)
    }
}

/// Maximum code rate for PUCCH formats 2/3/4 (TS 38.213 Table 9.2.5.2-1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PucchMaxCodeRate {
    Dot08,
    Dot15,
    Dot25,
    Dot35,
    Dot45,
    Dot60,
    Dot80,
}

impl PucchMaxCodeRate {
    /// Code rate as a float
    pub fn to_float(&self) -> f32 {
        match self {
            PucchMaxCodeRate::Dot08 => 0.08,
            PucchMaxCodeRate::Dot15 => 0.15,
            PucchMaxCodeRate::Dot25 => 0.25,
            PucchMaxCodeRate::Dot35 => 0.35,
            PucchMaxCodeRate::Dot45 => 0.45,
            PucchMaxCodeRate::Dot60 => 0.60,
            PucchMaxCodeRate::Dot80 => 0.80,
        }
    }
}

/// A dedicated PUCCH resource of the cell-wide pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PucchResource {
    /// Cell-wide resource identifier
    pub res_id: u16,
    /// PUCCH format
    pub format: PucchFormat,
    /// First PRB (first hop)
    pub starting_prb: u32,
    /// First PRB of the second hop, if intra-slot hopping is enabled
    #[serde(default)]
    pub second_hop_prb: Option<u32>,
    /// OFDM symbols occupied by the resource
    pub symbols: OfdmSymbolRange,
    /// Maximum number of PRBs (formats 2/3); 1 for the other formats
    #[serde(default = "default_nof_prbs")]
    pub nof_prbs: u32,
    /// Initial cyclic shift (formats 0/1)
    #[serde(default)]
    pub initial_cyclic_shift: u8,
    /// Time domain orthogonal cover code index (format 1)
    #[serde(default)]
    pub time_domain_occ: u8,
}

fn default_nof_prbs() -> u32 {
    1
}

impl PucchResource {
    /// PRBs of the first hop when using `nof_prbs` PRBs
    pub fn prbs(&self, nof_prbs: u32) -> PrbInterval {
        PrbInterval::from_length(self.starting_prb, nof_prbs)
    }

    /// PRBs of the second hop when using `nof_prbs` PRBs
    pub fn second_hop_prbs(&self, nof_prbs: u32) -> Option<PrbInterval> {
        self.second_hop_prb
            .map(|prb| PrbInterval::from_length(prb, nof_prbs))
    }

    /// Number of UCI bits (including CRC) the resource can carry with `nof_prbs` PRBs.
    ///
    /// Formats 0/1 carry up to two HARQ-ACK bits plus SR. Format 2 maps 8 data REs per
    /// PRB and symbol with QPSK. Format 3 uses 12 data REs per PRB on the non-DMRS symbols.
    pub fn payload_capacity(&self, nof_prbs: u32, max_code_rate: PucchMaxCodeRate) -> u32 {
        let nof_symbols = self.symbols.length() as u32;
        let raw_bits = match self.format {
            PucchFormat::F0 | PucchFormat::F1 => return MAX_HARQ_BITS_PUCCH_F0_F1 + 1,
            PucchFormat::F2 => nof_prbs * nof_symbols * 8 * 2,
            PucchFormat::F3 => nof_prbs * nof_symbols.saturating_sub(2) * 12 * 2,
            PucchFormat::F4 => nof_symbols.saturating_sub(2) * 12 * 2 / 2,
        };
        (raw_bits as f32 * max_code_rate.to_float()).floor() as u32
    }

    /// Smallest PRB count able to carry `payload_bits` UCI bits plus CRC
    pub fn required_nof_prbs(&self, payload_bits: u32, max_code_rate: PucchMaxCodeRate) -> Option<u32> {
        if self.format.is_small_payload() || self.format == PucchFormat::F4 {
            return (payload_bits <= self.payload_capacity(1, max_code_rate)).then_some(1);
        }
        let total_bits = payload_bits + uci_crc_bits(payload_bits);
        (1..=self.nof_prbs).find(|&n| self.payload_capacity(n, max_code_rate) >= total_bits)
    }

    fn validate(&self, nof_ul_crbs: u32) -> Result<(), SchedulerError> {
        if self.symbols.is_empty() || self.symbols.stop() > NOF_OFDM_SYMBOLS_PER_SLOT {
            return Err(invalid_cfg("pucch", format!("resource {} has invalid symbols {}", self.res_id, self.symbols)));
        }
        let last_prb = self.starting_prb.max(self.second_hop_prb.unwrap_or(0)) + self.nof_prbs;
        if self.nof_prbs == 0 || last_prb > nof_ul_crbs {
            return Err(invalid_cfg("pucch", format!("resource {} exceeds the UL bandwidth", self.res_id)));
        }
        if self.format.is_small_payload() && self.nof_prbs != 1 {
            return Err(invalid_cfg("pucch", format!("resource {} of format {:?} must use one PRB", self.res_id, self.format)));
        }
        Ok(())
    }
}

/// CRC bits appended to a UCI payload of format 2/3/4 (TS 38.212 §6.3.1.2.1)
pub fn uci_crc_bits(payload_bits: u32) -> u32 {
    match payload_bits {
        0..=11 => 0,
        12..=19 => 6,
        _ => 11,
    }
}

/// Validate the cell-wide dedicated PUCCH pool
pub fn validate_pucch_pool(pool: &[PucchResource], nof_ul_crbs: u32) -> Result<(), SchedulerError> {
    for (i, res) in pool.iter().enumerate() {
        res.validate(nof_ul_crbs)?;
        if pool[..i].iter().any(|other| other.res_id == res.res_id) {
            return Err(invalid_cfg("pucch", format!("duplicate resource id {}", res.res_id)));
        }
    }
    Ok(())
}

/// Scheduling Request configuration (TS 38.331 SchedulingRequestResourceConfig)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SrConfiguration {
    /// Periodicity in slots
    pub period_slots: u32,
    /// Offset in slots
    pub offset: u32,
    /// PUCCH resource (format 0 or 1)
    pub pucch_res_id: u16,
}

/// Periodic CSI report configuration on PUCCH
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsiReportConfiguration {
    /// Periodicity in slots
    pub period_slots: u32,
    /// Offset in slots
    pub offset: u32,
    /// PUCCH resource (format 2/3/4)
    pub pucch_res_id: u16,
    /// CSI part 1 payload in bits (wideband CQI, RI, PMI)
    #[serde(default = "default_csi_part1_bits")]
    pub csi_part1_bits: u32,
}

fn default_csi_part1_bits() -> u32 {
    4
}

/// UE dedicated PUCCH configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PucchConfig {
    /// Resource set 0: formats 0/1, up to two HARQ-ACK bits. Indexed by PRI.
    pub res_set0: Vec<u16>,
    /// Resource set 1: formats 2/3/4, more than two UCI bits. Indexed by PRI.
    pub res_set1: Vec<u16>,
    /// Maximum code rate for formats 2/3/4
    #[serde(default = "default_max_code_rate")]
    pub max_code_rate: PucchMaxCodeRate,
    /// Whether HARQ-ACK and CSI may be multiplexed in the same resource
    #[serde(default = "default_true")]
    pub simultaneous_harq_ack_csi: bool,
}

fn default_max_code_rate() -> PucchMaxCodeRate {
    PucchMaxCodeRate::Dot35
}

fn default_true() -> bool {
    true
}

impl PucchConfig {
    /// Check the resource sets against the cell pool
    pub fn validate(&self, pool: &[PucchResource]) -> Result<(), SchedulerError> {
        if self.res_set0.is_empty() || self.res_set0.len() > MAX_NOF_RES_PER_PUCCH_RES_SET {
            return Err(invalid_cfg("pucch", "resource set 0 must hold 1 to 8 resources"));
        }
        if self.res_set1.len() > MAX_NOF_RES_PER_PUCCH_RES_SET {
            return Err(invalid_cfg("pucch", "resource set 1 holds more than 8 resources"));
        }
        for id in &self.res_set0 {
            match find_pucch_resource(pool, *id) {
                Some(res) if res.format.is_small_payload() => {}
                Some(_) => return Err(invalid_cfg("pucch", format!("resource {} in set 0 must be format 0/1", id))),
                None => return Err(invalid_cfg("pucch", format!("unknown resource {} in set 0", id))),
            }
        }
        for id in &self.res_set1 {
            match find_pucch_resource(pool, *id) {
                Some(res) if !res.format.is_small_payload() => {}
                Some(_) => return Err(invalid_cfg("pucch", format!("resource {} in set 1 must be format 2/3/4", id))),
                None => return Err(invalid_cfg("pucch", format!("unknown resource {} in set 1", id))),
            }
        }
        Ok(())
    }
}

/// Look up a resource of the pool by identifier
pub fn find_pucch_resource(pool: &[PucchResource], res_id: u16) -> Option<&PucchResource> {
    pool.iter().find(|r| r.res_id == res_id)
}

/// Identifiers of the default pool layout built by [`make_default_pucch_pool`]
pub mod default_pool {
    /// Resource set 0 (format 1, shared PRB, orthogonal codes)
    pub const RES_SET0_FIRST_ID: u16 = 0;
    /// Resource set 1 (format 2)
    pub const RES_SET1_FIRST_ID: u16 = 8;
    /// SR resources (format 1)
    pub const SR_FIRST_ID: u16 = 16;
    /// Number of SR resources
    pub const NOF_SR_RESOURCES: u16 = 8;
    /// CSI resources (format 2)
    pub const CSI_FIRST_ID: u16 = 24;
    /// Number of CSI resources
    pub const NOF_CSI_RESOURCES: u16 = 4;
}

/// Build the default dedicated PUCCH pool for a UL carrier of `nof_ul_crbs` CRBs.
///
/// The common PUCCH resource set occupies the four outermost PRBs at each band edge.
/// Formats 0/1 resources sit right after the lower edge and are code multiplexed
/// (cyclic shift and OCC). Format 2 resources sit right before the upper edge.
pub fn make_default_pucch_pool(nof_ul_crbs: u32) -> Vec<PucchResource> {
    use default_pool::*;

    let mut pool = Vec::new();
    let f1_symbols = OfdmSymbolRange::new(0, NOF_OFDM_SYMBOLS_PER_SLOT);
    let cs_occ = |i: u16| ((i % 4) as u8 * 3, (i / 4) as u8);

    // Resource set 0: format 1 on PRB 4.
    for i in 0..8u16 {
        let (cs, occ) = cs_occ(i);
        pool.push(PucchResource {
            res_id: RES_SET0_FIRST_ID + i,
            format: PucchFormat::F1,
            starting_prb: 4,
            second_hop_prb: None,
            symbols: f1_symbols,
            nof_prbs: 1,
            initial_cyclic_shift: cs,
            time_domain_occ: occ,
        });
    }

    // Resource set 1: format 2, PRB pairs below the upper PUCCH common region.
    let f2_top = nof_ul_crbs - 4;
    for i in 0..8u16 {
        let prb = f2_top - 2 * (1 + (i / 2) as u32);
        let symbols = if i % 2 == 0 {
            OfdmSymbolRange::new(12, 14)
        } else {
            OfdmSymbolRange::new(10, 12)
        };
        pool.push(PucchResource {
            res_id: RES_SET1_FIRST_ID + i,
            format: PucchFormat::F2,
            starting_prb: prb,
            second_hop_prb: None,
            symbols,
            nof_prbs: 2,
            initial_cyclic_shift: 0,
            time_domain_occ: 0,
        });
    }

    // SR: format 1 on PRB 5.
    for i in 0..NOF_SR_RESOURCES {
        let (cs, occ) = cs_occ(i);
        pool.push(PucchResource {
            res_id: SR_FIRST_ID + i,
            format: PucchFormat::F1,
            starting_prb: 5,
            second_hop_prb: None,
            symbols: f1_symbols,
            nof_prbs: 1,
            initial_cyclic_shift: cs,
            time_domain_occ: occ,
        });
    }

    // CSI: format 2, PRB pairs below the resource set 1 region.
    let csi_top = f2_top - 8;
    for i in 0..NOF_CSI_RESOURCES {
        let prb = csi_top - 2 * (1 + (i / 2) as u32);
        let symbols = if i % 2 == 0 {
            OfdmSymbolRange::new(12, 14)
        } else {
            OfdmSymbolRange::new(10, 12)
        };
        pool.push(PucchResource {
            res_id: CSI_FIRST_ID + i,
            format: PucchFormat::F2,
            starting_prb: prb,
            second_hop_prb: None,
            symbols,
            nof_prbs: 2,
            initial_cyclic_shift: 0,
            time_domain_occ: 0,
        });
    }

    pool
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pool_is_valid() {
        let pool = make_default_pucch_pool(52);
        assert_eq!(pool.len(), 28);
        assert!(validate_pucch_pool(&pool, 52).is_ok());
        let f2 = find_pucch_resource(&pool, default_pool::RES_SET1_FIRST_ID).unwrap();
        assert_eq!(f2.starting_prb, 46);
        let csi = find_pucch_resource(&pool, default_pool::CSI_FIRST_ID).unwrap();
        assert_eq!(csi.starting_prb, 38);
    }

    #[test]
    fn test_duplicate_resource_rejected() {
        let mut pool = make_default_pucch_pool(52);
        pool[1].res_id = 0;
        assert!(validate_pucch_pool(&pool, 52).is_err());
    }

    #[test]
    fn test_f2_required_prbs() {
        let pool = make_default_pucch_pool(52);
        let f2 = find_pucch_resource(&pool, default_pool::RES_SET1_FIRST_ID).unwrap();
        // 2 symbols, 1 PRB, 0.35 -> floor(32 * 0.35) = 11 bits.
        assert_eq!(f2.payload_capacity(1, PucchMaxCodeRate::Dot35), 11);
        assert_eq!(f2.required_nof_prbs(5, PucchMaxCodeRate::Dot35), Some(1));
        // 13 bits need a 6-bit CRC: 19 bits -> 2 PRBs (22 bits).
        assert_eq!(f2.required_nof_prbs(13, PucchMaxCodeRate::Dot35), Some(2));
        assert_eq!(f2.required_nof_prbs(30, PucchMaxCodeRate::Dot35), None);
    }

    #[test]
    fn test_uci_crc_bits() {
        assert_eq!(uci_crc_bits(11), 0);
        assert_eq!(uci_crc_bits(12), 6);
        assert_eq!(uci_crc_bits(20), 11);
    }
}
