//! Cell Configuration
//!
//! Static per-cell configuration: carrier, CORESETs, search spaces, time-domain
//! resource lists, PUCCH resources and the common channel settings. Validated once
//! and then shared read-only among all allocators of the cell.

use super::expert_config::SchedulerExpertConfig;
use super::pucch_config::{make_default_pucch_pool, validate_pucch_pool, PucchResource};
use crate::support::pdcch_candidates::AggregationLevel;
use crate::{invalid_cfg, SchedulerError};
use common::interval::{CrbInterval, OfdmSymbolRange, NOF_OFDM_SYMBOLS_PER_SLOT};
use common::slot_point::SlotPoint;
use common::types::{CellId, DuplexMode, Pci, SubcarrierSpacing};
use serde::{Deserialize, Serialize};

/// CORESET identifier
pub type CoresetId = u8;

/// Search space identifier
pub type SearchSpaceId = u8;

/// Number of REGs in a CCE
pub const NOF_REGS_PER_CCE: u32 = 6;

/// Maximum CORESET duration in symbols
pub const MAX_CORESET_DURATION: u8 = 3;

/// Number of CRBs occupied by an SS/PBCH block
pub const NOF_SSB_CRBS: u32 = 20;

/// CORESET#0 configuration based on 3GPP TS 38.213
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coreset0Config {
    /// Number of resource blocks
    pub num_rbs: u32,
    /// Number of symbols
    pub num_symbols: u8,
    /// RB offset between the CORESET start and the SSB
    pub rb_offset: u32,
}

impl Coreset0Config {
    /// Get CORESET#0 configuration from table index
    /// Based on 3GPP TS 38.213 Table 13-1 for {15, 15} kHz SCS
    pub fn from_index(index: u8) -> Result<Self, SchedulerError> {
        let (num_rbs, num_symbols, rb_offset) = match index {
            0 => (24, 2, 0),
            1 => (24, 2, 2),
            2 => (24, 2, 4),
            3 => (24, 3, 0),
            4 => (24, 3, 2),
            5 => (24, 3, 4),
            6 => (48, 1, 12),
            7 => (48, 1, 16),
            8 => (48, 2, 12),
            9 => (48, 2, 16),
            10 => (48, 3, 12),
            11 => (48, 3, 16),
            12 => (96, 1, 38),
            13 => (96, 2, 38),
            14 => (96, 3, 38),
            _ => return Err(invalid_cfg("coreset0", format!("Invalid CORESET#0 index: {}", index))),
        };
        Ok(Self { num_rbs, num_symbols, rb_offset })
    }
}

/// CORESET configuration with non-interleaved CCE-to-REG mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoresetConfiguration {
    /// CORESET identifier
    pub id: CoresetId,
    /// CRBs spanned by the CORESET
    pub crbs: CrbInterval,
    /// Duration in OFDM symbols (1 to 3), starting at symbol 0
    pub duration: u8,
}

impl CoresetConfiguration {
    /// Number of CCEs in the CORESET
    pub fn nof_cces(&self) -> u32 {
        self.crbs.length() * self.duration as u32 / NOF_REGS_PER_CCE
    }

    /// CRBs occupied by the CCE range `[cce_start, cce_start + nof_cces)`.
    ///
    /// REGs are numbered time-first, so each CCE spans `6 / duration` PRBs over all
    /// CORESET symbols.
    pub fn cces_to_crbs(&self, cce_start: u32, nof_cces: u32) -> CrbInterval {
        let d = self.duration as u32;
        let start = self.crbs.start() + cce_start * NOF_REGS_PER_CCE / d;
        let stop = self.crbs.start() + (cce_start + nof_cces) * NOF_REGS_PER_CCE / d;
        CrbInterval::new(start, stop)
    }

    /// OFDM symbols occupied by the CORESET
    pub fn symbols(&self) -> OfdmSymbolRange {
        OfdmSymbolRange::new(0, self.duration)
    }
}

/// Search space type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchSpaceType {
    /// Common search space (DCI formats 1_0/0_0)
    Common,
    /// UE-specific search space (DCI formats 1_1/0_1)
    UeSpecific,
}

/// Search space configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchSpaceConfiguration {
    /// Search space identifier
    pub id: SearchSpaceId,
    /// CORESET where the search space is monitored
    pub coreset_id: CoresetId,
    /// Search space type
    pub kind: SearchSpaceType,
    /// Number of candidates for aggregation levels 1, 2, 4, 8 and 16
    pub nof_candidates: [u8; 5],
    /// Monitoring periodicity in slots
    #[serde(default = "default_one")]
    pub period_slots: u32,
    /// Monitoring offset in slots
    #[serde(default)]
    pub offset_slots: u32,
}

fn default_one() -> u32 {
    1
}

impl SearchSpaceConfiguration {
    /// Number of configured candidates for an aggregation level
    pub fn nof_candidates(&self, aggr_lvl: AggregationLevel) -> u8 {
        self.nof_candidates[aggr_lvl.index()]
    }

    /// Whether the search space is monitored in the given slot
    pub fn is_monitored(&self, sl: SlotPoint) -> bool {
        sl.is_occasion(self.period_slots, self.offset_slots)
    }
}

/// PDSCH time domain resource (TS 38.214 §5.1.2.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdschTimeDomainResource {
    /// Slot offset between PDCCH and PDSCH
    pub k0: u8,
    /// OFDM symbols of the PDSCH
    pub symbols: OfdmSymbolRange,
}

/// PUSCH time domain resource (TS 38.214 §6.1.2.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PuschTimeDomainResource {
    /// Slot offset between PDCCH and PUSCH
    pub k2: u8,
    /// OFDM symbols of the PUSCH
    pub symbols: OfdmSymbolRange,
}

/// TDD UL-DL pattern with full DL and UL slots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TddPattern {
    /// Pattern periodicity in slots
    pub period_slots: u32,
    /// Number of DL slots at the start of the period
    pub nof_dl_slots: u32,
    /// Number of UL slots at the end of the period
    pub nof_ul_slots: u32,
}

/// SS/PBCH block configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SsbConfiguration {
    /// SSB periodicity in milliseconds
    #[serde(default = "default_ssb_period")]
    pub period_ms: u32,
    /// First CRB of the SSB, relative to point A
    #[serde(default = "default_ssb_crb")]
    pub offset_to_point_a: u32,
    /// OFDM symbols of the SSB within its slot
    #[serde(default = "default_ssb_symbols")]
    pub symbols: OfdmSymbolRange,
}

fn default_ssb_period() -> u32 {
    20
}

fn default_ssb_crb() -> u32 {
    16
}

fn default_ssb_symbols() -> OfdmSymbolRange {
    OfdmSymbolRange::new(2, 6)
}

impl Default for SsbConfiguration {
    fn default() -> Self {
        Self {
            period_ms: default_ssb_period(),
            offset_to_point_a: default_ssb_crb(),
            symbols: default_ssb_symbols(),
        }
    }
}

impl SsbConfiguration {
    /// CRBs occupied by the SSB
    pub fn crbs(&self) -> CrbInterval {
        CrbInterval::from_length(self.offset_to_point_a, NOF_SSB_CRBS)
    }
}

/// SIB1 broadcast configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sib1Configuration {
    /// SIB1 retransmission periodicity in milliseconds
    #[serde(default = "default_sib1_period")]
    pub retx_period_ms: u32,
    /// Slot offset within the retransmission period
    #[serde(default = "default_sib1_slot_offset")]
    pub slot_offset: u32,
    /// SIB1 payload size in bytes
    #[serde(default = "default_sib1_payload")]
    pub payload_size: u32,
    /// MCS of the SIB1 PDSCH
    #[serde(default = "default_sib1_mcs")]
    pub mcs: u8,
    /// Aggregation level of the SI-RNTI PDCCH
    #[serde(default = "default_common_al")]
    pub aggregation_level: AggregationLevel,
}

fn default_sib1_period() -> u32 {
    20
}

fn default_sib1_slot_offset() -> u32 {
    2
}

fn default_sib1_payload() -> u32 {
    100
}

fn default_sib1_mcs() -> u8 {
    5
}

fn default_common_al() -> AggregationLevel {
    AggregationLevel::N4
}

impl Default for Sib1Configuration {
    fn default() -> Self {
        Self {
            retx_period_ms: default_sib1_period(),
            slot_offset: default_sib1_slot_offset(),
            payload_size: default_sib1_payload(),
            mcs: default_sib1_mcs(),
            aggregation_level: default_common_al(),
        }
    }
}

/// Random access configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RachConfiguration {
    /// RAR window length in slots
    #[serde(default = "default_ra_window")]
    pub ra_resp_window_slots: u32,
    /// Maximum number of Msg3 HARQ retransmissions
    #[serde(default = "default_msg3_retx")]
    pub max_msg3_harq_retxs: u8,
    /// MCS of the Msg3 PUSCH
    #[serde(default)]
    pub msg3_mcs: u8,
    /// Number of PRBs of the Msg3 PUSCH
    #[serde(default = "default_msg3_rbs")]
    pub msg3_nof_rbs: u32,
    /// MCS of the RAR PDSCH
    #[serde(default)]
    pub rar_mcs: u8,
}

fn default_ra_window() -> u32 {
    10
}

fn default_msg3_retx() -> u8 {
    4
}

fn default_msg3_rbs() -> u32 {
    3
}

impl Default for RachConfiguration {
    fn default() -> Self {
        Self {
            ra_resp_window_slots: default_ra_window(),
            max_msg3_harq_retxs: default_msg3_retx(),
            msg3_mcs: 0,
            msg3_nof_rbs: default_msg3_rbs(),
            rar_mcs: 0,
        }
    }
}

/// Paging configuration (TS 38.304 §7.1)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagingConfiguration {
    /// Default paging cycle in radio frames
    #[serde(default = "default_paging_cycle")]
    pub default_paging_cycle_rf: u32,
    /// Number of paging frames per paging cycle (N)
    #[serde(default = "default_paging_cycle")]
    pub nof_pf_per_paging_cycle: u32,
    /// Paging frame offset
    #[serde(default)]
    pub paging_frame_offset: u32,
    /// Number of paging occasions per paging frame (Ns)
    #[serde(default = "default_nof_po")]
    pub nof_po_per_pf: u32,
    /// MCS of the paging PDSCH
    #[serde(default)]
    pub mcs: u8,
}

fn default_paging_cycle() -> u32 {
    128
}

fn default_nof_po() -> u32 {
    1
}

impl Default for PagingConfiguration {
    fn default() -> Self {
        Self {
            default_paging_cycle_rf: default_paging_cycle(),
            nof_pf_per_paging_cycle: default_paging_cycle(),
            paging_frame_offset: 0,
            nof_po_per_pf: default_nof_po(),
            mcs: 0,
        }
    }
}

/// Periodic NZP CSI-RS configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsiRsConfiguration {
    /// Periodicity in slots
    pub period_slots: u32,
    /// Offset in slots
    pub offset_slots: u32,
    /// OFDM symbol carrying the CSI-RS
    pub symbol: u8,
}

impl Default for CsiRsConfiguration {
    fn default() -> Self {
        Self {
            period_slots: 80,
            offset_slots: 2,
            symbol: 12,
        }
    }
}

/// Cell configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellConfiguration {
    /// Cell identifier
    pub cell_id: CellId,
    /// Physical Cell Identity
    pub pci: Pci,
    /// Common subcarrier spacing
    pub scs_common: SubcarrierSpacing,
    /// Number of DL CRBs of the initial BWP
    pub nof_dl_crbs: u32,
    /// Number of UL CRBs of the initial BWP
    pub nof_ul_crbs: u32,
    /// TDD pattern, absent for FDD
    #[serde(default)]
    pub tdd_pattern: Option<TddPattern>,
    /// CORESET#0 table index signalled in the MIB
    pub coreset0_index: u8,
    /// Dedicated CORESETs (identifier > 0)
    pub coresets: Vec<CoresetConfiguration>,
    /// Search spaces, common and UE-specific
    pub search_spaces: Vec<SearchSpaceConfiguration>,
    /// Search space used for SIB1
    pub sib1_search_space: SearchSpaceId,
    /// Search space used for RAR, paging and fallback DCIs
    pub common_search_space: SearchSpaceId,
    /// PDSCH time domain resource allocation list
    pub pdsch_td_alloc_list: Vec<PdschTimeDomainResource>,
    /// PUSCH time domain resource allocation list
    pub pusch_td_alloc_list: Vec<PuschTimeDomainResource>,
    /// Candidate PDSCH-to-HARQ-ACK delays (k1)
    pub dl_harq_k1_candidates: Vec<u8>,
    /// Common PUCCH resource set index (TS 38.213 Table 9.2.1-1)
    pub pucch_resource_common: u8,
    /// Cell-wide pool of dedicated PUCCH resources
    pub pucch_resources: Vec<PucchResource>,
    /// SSB configuration
    #[serde(default)]
    pub ssb: SsbConfiguration,
    /// SIB1 configuration
    #[serde(default)]
    pub sib1: Sib1Configuration,
    /// Random access configuration
    #[serde(default)]
    pub ra: RachConfiguration,
    /// Paging configuration
    #[serde(default)]
    pub paging: PagingConfiguration,
    /// Periodic CSI-RS, if configured
    #[serde(default)]
    pub csi_rs: Option<CsiRsConfiguration>,
    /// Scheduler tunables
    #[serde(default)]
    pub expert: SchedulerExpertConfig,
}

impl Default for CellConfiguration {
    /// FDD cell, 10 MHz at 15 kHz SCS (52 CRBs)
    fn default() -> Self {
        let nof_crbs = 52;
        Self {
            cell_id: CellId(0),
            pci: Pci(1),
            scs_common: SubcarrierSpacing::Scs15,
            nof_dl_crbs: nof_crbs,
            nof_ul_crbs: nof_crbs,
            tdd_pattern: None,
            coreset0_index: 8,
            coresets: vec![CoresetConfiguration {
                id: 1,
                crbs: CrbInterval::new(0, 48),
                duration: 2,
            }],
            search_spaces: vec![
                SearchSpaceConfiguration {
                    id: 0,
                    coreset_id: 0,
                    kind: SearchSpaceType::Common,
                    nof_candidates: [0, 0, 4, 2, 1],
                    period_slots: 1,
                    offset_slots: 0,
                },
                SearchSpaceConfiguration {
                    id: 1,
                    coreset_id: 0,
                    kind: SearchSpaceType::Common,
                    nof_candidates: [0, 0, 2, 1, 0],
                    period_slots: 1,
                    offset_slots: 0,
                },
                SearchSpaceConfiguration {
                    id: 2,
                    coreset_id: 1,
                    kind: SearchSpaceType::UeSpecific,
                    nof_candidates: [0, 4, 4, 2, 0],
                    period_slots: 1,
                    offset_slots: 0,
                },
            ],
            sib1_search_space: 0,
            common_search_space: 1,
            pdsch_td_alloc_list: vec![PdschTimeDomainResource {
                k0: 0,
                symbols: OfdmSymbolRange::new(2, NOF_OFDM_SYMBOLS_PER_SLOT),
            }],
            pusch_td_alloc_list: vec![PuschTimeDomainResource {
                k2: 4,
                symbols: OfdmSymbolRange::new(0, NOF_OFDM_SYMBOLS_PER_SLOT),
            }],
            dl_harq_k1_candidates: vec![4, 5, 6, 7, 8],
            pucch_resource_common: 11,
            pucch_resources: make_default_pucch_pool(nof_crbs),
            ssb: SsbConfiguration::default(),
            sib1: Sib1Configuration::default(),
            ra: RachConfiguration::default(),
            paging: PagingConfiguration::default(),
            csi_rs: Some(CsiRsConfiguration::default()),
            expert: SchedulerExpertConfig::default(),
        }
    }
}

impl CellConfiguration {
    /// Duplex mode of the cell
    pub fn duplex_mode(&self) -> DuplexMode {
        if self.tdd_pattern.is_some() {
            DuplexMode::Tdd
        } else {
            DuplexMode::Fdd
        }
    }

    /// Whether DL transmissions are possible in the slot
    pub fn is_dl_enabled(&self, sl: SlotPoint) -> bool {
        match &self.tdd_pattern {
            None => true,
            Some(tdd) => sl.to_uint() % tdd.period_slots < tdd.nof_dl_slots,
        }
    }

    /// Whether UL transmissions are possible in the slot
    pub fn is_ul_enabled(&self, sl: SlotPoint) -> bool {
        match &self.tdd_pattern {
            None => true,
            Some(tdd) => sl.to_uint() % tdd.period_slots >= tdd.period_slots - tdd.nof_ul_slots,
        }
    }

    /// CORESET#0 derived from the MIB index and the SSB position
    pub fn coreset0(&self) -> Result<CoresetConfiguration, SchedulerError> {
        let cs0 = Coreset0Config::from_index(self.coreset0_index)?;
        let start = self
            .ssb
            .offset_to_point_a
            .checked_sub(cs0.rb_offset)
            .ok_or_else(|| invalid_cfg("coreset0", "CORESET#0 starts before point A"))?;
        Ok(CoresetConfiguration {
            id: 0,
            crbs: CrbInterval::from_length(start, cs0.num_rbs),
            duration: cs0.num_symbols,
        })
    }

    /// Look up a CORESET, including CORESET#0
    pub fn coreset(&self, id: CoresetId) -> Option<CoresetConfiguration> {
        if id == 0 {
            return self.coreset0().ok();
        }
        self.coresets.iter().find(|c| c.id == id).copied()
    }

    /// Look up a search space
    pub fn search_space(&self, id: SearchSpaceId) -> Option<&SearchSpaceConfiguration> {
        self.search_spaces.iter().find(|ss| ss.id == id)
    }

    /// DL CRBs usable by PDSCHs scheduled with DCI 1_0 in a common search space
    pub fn coreset0_crbs(&self) -> CrbInterval {
        self.coreset0()
            .map(|c| c.crbs)
            .unwrap_or_else(|_| CrbInterval::new(0, self.nof_dl_crbs))
    }

    /// Largest k0 of the PDSCH time domain list
    pub fn max_k0(&self) -> u8 {
        self.pdsch_td_alloc_list.iter().map(|td| td.k0).max().unwrap_or(0)
    }

    /// Largest k1 candidate
    pub fn max_k1(&self) -> u8 {
        self.dl_harq_k1_candidates.iter().copied().max().unwrap_or(0)
    }

    /// Largest k2 of the PUSCH time domain list
    pub fn max_k2(&self) -> u8 {
        self.pusch_td_alloc_list.iter().map(|td| td.k2).max().unwrap_or(0)
    }

    /// Msg3 scheduling delay Δ (TS 38.214 Table 6.1.2.1.1-5)
    pub fn msg3_delta(&self) -> u8 {
        match self.scs_common.numerology() {
            0 => 2,
            1 => 3,
            2 => 4,
            _ => 6,
        }
    }

    /// Validate the configuration. Must succeed before the cell is activated.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.nof_dl_crbs == 0 || self.nof_ul_crbs == 0 || self.nof_dl_crbs > 275 || self.nof_ul_crbs > 275 {
            return Err(invalid_cfg("carrier", "number of CRBs must be in 1..=275"));
        }
        if let Some(tdd) = &self.tdd_pattern {
            if tdd.period_slots == 0 || tdd.nof_dl_slots + tdd.nof_ul_slots > tdd.period_slots {
                return Err(invalid_cfg("tdd", "DL and UL slots exceed the pattern period"));
            }
            if tdd.nof_dl_slots == 0 || tdd.nof_ul_slots == 0 {
                return Err(invalid_cfg("tdd", "pattern needs at least one DL and one UL slot"));
            }
        }

        let coreset0 = self.coreset0()?;
        if coreset0.crbs.stop() > self.nof_dl_crbs {
            return Err(invalid_cfg("coreset0", format!("CORESET#0 {} exceeds the DL carrier", coreset0.crbs)));
        }
        if self.ssb.crbs().stop() > self.nof_dl_crbs || self.ssb.symbols.stop() > NOF_OFDM_SYMBOLS_PER_SLOT {
            return Err(invalid_cfg("ssb", "SSB outside of the DL carrier"));
        }
        for cs in &self.coresets {
            if cs.id == 0 {
                return Err(invalid_cfg("coreset", "CORESET#0 is derived from the MIB index"));
            }
            if cs.duration == 0 || cs.duration > MAX_CORESET_DURATION || cs.crbs.stop() > self.nof_dl_crbs {
                return Err(invalid_cfg("coreset", format!("CORESET {} has invalid resources", cs.id)));
            }
            if cs.nof_cces() == 0 {
                return Err(invalid_cfg("coreset", format!("CORESET {} holds no CCE", cs.id)));
            }
        }

        for ss in &self.search_spaces {
            let cs = self
                .coreset(ss.coreset_id)
                .ok_or_else(|| invalid_cfg("search_space", format!("SS {} uses unknown CORESET {}", ss.id, ss.coreset_id)))?;
            if ss.period_slots == 0 {
                return Err(invalid_cfg("search_space", format!("SS {} has zero periodicity", ss.id)));
            }
            for al in AggregationLevel::ALL {
                if ss.nof_candidates(al) as u32 > cs.nof_cces() / al.nof_cces() {
                    return Err(invalid_cfg(
                        "search_space",
                        format!("SS {} has more AL{} candidates than CORESET {} fits", ss.id, al.nof_cces(), cs.id),
                    ));
                }
            }
        }
        for (name, id) in [("sib1", self.sib1_search_space), ("common", self.common_search_space)] {
            match self.search_space(id) {
                Some(ss) if ss.kind == SearchSpaceType::Common && ss.coreset_id == 0 => {}
                _ => return Err(invalid_cfg("search_space", format!("{} search space {} must be common on CORESET#0", name, id))),
            }
        }

        let max_coreset_duration = self
            .coresets
            .iter()
            .map(|c| c.duration)
            .chain(std::iter::once(coreset0.duration))
            .max()
            .unwrap_or(0);
        if self.pdsch_td_alloc_list.is_empty() || self.pusch_td_alloc_list.is_empty() {
            return Err(invalid_cfg("time_domain", "PDSCH and PUSCH time domain lists cannot be empty"));
        }
        for td in &self.pdsch_td_alloc_list {
            if td.symbols.start() < max_coreset_duration || td.symbols.stop() > NOF_OFDM_SYMBOLS_PER_SLOT || td.symbols.is_empty() {
                return Err(invalid_cfg("pdsch", format!("PDSCH symbols {} overlap the CORESETs", td.symbols)));
            }
        }
        for td in &self.pusch_td_alloc_list {
            if td.symbols.stop() > NOF_OFDM_SYMBOLS_PER_SLOT || td.symbols.is_empty() {
                return Err(invalid_cfg("pusch", format!("Invalid PUSCH symbols {}", td.symbols)));
            }
        }
        if self.dl_harq_k1_candidates.is_empty() || self.dl_harq_k1_candidates.contains(&0) {
            return Err(invalid_cfg("pucch", "k1 candidates must be non-empty and positive"));
        }

        if self.pucch_resource_common > 15 {
            return Err(invalid_cfg("pucch", format!("Invalid common PUCCH resource set {}", self.pucch_resource_common)));
        }
        validate_pucch_pool(&self.pucch_resources, self.nof_ul_crbs)?;
        if self.ra.msg3_nof_rbs == 0 || self.ra.ra_resp_window_slots == 0 {
            return Err(invalid_cfg("ra", "Msg3 PRBs and RAR window must be positive"));
        }
        if self.paging.default_paging_cycle_rf == 0
            || self.paging.nof_pf_per_paging_cycle == 0
            || self.paging.nof_pf_per_paging_cycle > self.paging.default_paging_cycle_rf
            || self.paging.nof_po_per_pf == 0
        {
            return Err(invalid_cfg("paging", "invalid paging frame configuration"));
        }
        if let Some(csi_rs) = &self.csi_rs {
            if csi_rs.period_slots == 0 || csi_rs.symbol >= NOF_OFDM_SYMBOLS_PER_SLOT {
                return Err(invalid_cfg("csi_rs", "invalid CSI-RS periodicity or symbol"));
            }
        }
        self.expert.validate(self.nof_dl_crbs, self.nof_ul_crbs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coreset0_config() {
        let config = Coreset0Config::from_index(1).unwrap();
        assert_eq!(config.num_rbs, 24);
        assert_eq!(config.num_symbols, 2);
        assert_eq!(config.rb_offset, 2);
        assert!(Coreset0Config::from_index(20).is_err());
    }

    #[test]
    fn test_default_cell_is_valid() {
        let cfg = CellConfiguration::default();
        cfg.validate().unwrap();
        let cs0 = cfg.coreset0().unwrap();
        assert_eq!(cs0.crbs, CrbInterval::new(4, 52));
        assert_eq!(cs0.nof_cces(), 16);
        assert_eq!(cfg.coreset(1).unwrap().nof_cces(), 16);
        assert_eq!(cfg.duplex_mode(), DuplexMode::Fdd);
    }

    #[test]
    fn test_cce_to_crb_mapping() {
        let cs = CoresetConfiguration {
            id: 1,
            crbs: CrbInterval::new(0, 48),
            duration: 2,
        };
        assert_eq!(cs.cces_to_crbs(0, 1), CrbInterval::new(0, 3));
        assert_eq!(cs.cces_to_crbs(4, 4), CrbInterval::new(12, 24));
    }

    #[test]
    fn test_tdd_slots() {
        let cfg = CellConfiguration {
            tdd_pattern: Some(TddPattern {
                period_slots: 10,
                nof_dl_slots: 7,
                nof_ul_slots: 2,
            }),
            ..Default::default()
        };
        let sl = SlotPoint::new(SubcarrierSpacing::Scs15, 0, 0);
        assert!(cfg.is_dl_enabled(sl + 6));
        assert!(!cfg.is_dl_enabled(sl + 7));
        assert!(!cfg.is_ul_enabled(sl + 7));
        assert!(cfg.is_ul_enabled(sl + 8));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_invalid_pdsch_symbols_rejected() {
        let mut cfg = CellConfiguration::default();
        cfg.pdsch_td_alloc_list[0].symbols = OfdmSymbolRange::new(1, 14);
        assert!(matches!(cfg.validate(), Err(SchedulerError::InvalidConfiguration("pdsch", _))));
    }

    #[test]
    fn test_yaml_round_trip() {
        let cfg = CellConfiguration::default();
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        let parsed: CellConfiguration = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, cfg);
    }
}
