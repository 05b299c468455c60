//! Scheduling Result
//!
//! Per-slot output of the scheduler, handed to the PHY once the slot becomes the
//! transmission slot. Consumers receive it by shared reference and never mutate it.

use crate::config::cell_config::{CoresetId, SearchSpaceId};
use crate::config::pucch_config::PucchFormat;
use crate::support::pdcch_candidates::AggregationLevel;
use common::interval::{CceInterval, CrbInterval, OfdmSymbolRange, PrbInterval};
use common::slot_point::SlotPoint;
use common::types::{HarqId, Lcid, Rnti, UeIndex};

/// Type of RNTI scrambling a DCI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DciRntiType {
    SiRnti,
    RaRnti,
    PRnti,
    TcRnti,
    CRnti,
}

/// DL DCI format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DciDlFormat {
    F1_0,
    F1_1,
}

/// UL DCI format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DciUlFormat {
    F0_0,
    F0_1,
}

/// Position of a DCI in the control region
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DciContext {
    pub rnti: Rnti,
    pub rnti_type: DciRntiType,
    pub coreset_id: CoresetId,
    pub ss_id: SearchSpaceId,
    pub aggr_lvl: AggregationLevel,
    /// CCEs of the candidate
    pub cces: CceInterval,
    /// Number of CCEs of the CORESET
    pub coreset_nof_cces: u32,
    /// CRBs occupied in the CORESET symbols
    pub crbs: CrbInterval,
    pub symbols: OfdmSymbolRange,
}

/// DL DCI fields, completed when the PDSCH is finalized
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DlDciPayload {
    pub time_resource: u8,
    pub crbs: CrbInterval,
    pub mcs: u8,
    pub harq_id: HarqId,
    pub ndi: bool,
    pub rv: u8,
    /// PDSCH-to-HARQ-ACK timing
    pub k1: u8,
    /// PUCCH resource indicator
    pub pucch_res_indicator: u8,
    /// Downlink assignment index (HARQ-ACK codebook position)
    pub dai: u8,
}

/// UL DCI fields, completed when the PUSCH is finalized
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UlDciPayload {
    pub time_resource: u8,
    pub crbs: CrbInterval,
    pub mcs: u8,
    pub harq_id: HarqId,
    pub ndi: bool,
    pub rv: u8,
}

/// DL PDCCH
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdcchDlInformation {
    pub ctx: DciContext,
    pub format: DciDlFormat,
    pub dci: DlDciPayload,
}

/// UL PDCCH
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdcchUlInformation {
    pub ctx: DciContext,
    pub format: DciUlFormat,
    pub dci: UlDciPayload,
}

/// PDSCH codeword and resources
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdschInformation {
    pub rnti: Rnti,
    pub crbs: CrbInterval,
    pub symbols: OfdmSymbolRange,
    pub mcs: u8,
    pub tbs_bytes: u32,
    pub harq_id: HarqId,
    pub is_new_data: bool,
    pub rv: u8,
}

/// Bytes of one logical channel scheduled in a MAC PDU
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LcGrant {
    pub lcid: Lcid,
    pub nof_bytes: u32,
}

/// PDSCH for a UE
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DlMsgAlloc {
    pub ue_index: UeIndex,
    pub pdsch: PdschInformation,
    /// MAC SDUs per logical channel (empty for retransmissions)
    pub lc_grants: Vec<LcGrant>,
    /// Whether the PDU carries a UE Contention Resolution Identity CE
    pub conres_ce: bool,
    /// Whether the PDSCH was scheduled with DCI 1_0 in a common search space
    pub is_fallback: bool,
}

/// SIB1 broadcast
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SibInformation {
    pub pdsch: PdschInformation,
    pub payload_size: u32,
}

/// Msg3 UL grant carried in a RAR
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RarUlGrant {
    pub preamble_id: u8,
    pub tc_rnti: Rnti,
    pub timing_advance: u16,
    pub crbs: CrbInterval,
    pub mcs: u8,
    pub msg3_slot: SlotPoint,
}

/// Random access response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RarInformation {
    pub ra_rnti: Rnti,
    pub pdsch: PdschInformation,
    pub grants: Vec<RarUlGrant>,
}

/// Paging record carried in a paging PDSCH
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagingUeInfo {
    pub s_tmsi: u64,
}

/// Paging PDSCH
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagingInformation {
    pub pdsch: PdschInformation,
    pub records: Vec<PagingUeInfo>,
}

/// SS/PBCH block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsbInformation {
    pub ssb_index: u8,
    pub crbs: CrbInterval,
    pub symbols: OfdmSymbolRange,
}

/// NZP CSI-RS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsiRsInformation {
    pub crbs: CrbInterval,
    pub symbols: OfdmSymbolRange,
}

/// DL part of a slot result
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DlSchedResult {
    pub dl_pdcchs: Vec<PdcchDlInformation>,
    pub ul_pdcchs: Vec<PdcchUlInformation>,
    pub ssbs: Vec<SsbInformation>,
    pub csi_rs: Vec<CsiRsInformation>,
    pub sibs: Vec<SibInformation>,
    pub rars: Vec<RarInformation>,
    pub paging: Vec<PagingInformation>,
    pub ue_grants: Vec<DlMsgAlloc>,
}

/// UCI bits multiplexed on a PUSCH
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UciOnPusch {
    pub harq_ack_nof_bits: u32,
    pub csi_part1_nof_bits: u32,
    pub csi_part2_nof_bits: u32,
}

/// PUSCH resources
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PuschInformation {
    pub rnti: Rnti,
    pub crbs: CrbInterval,
    pub symbols: OfdmSymbolRange,
    pub mcs: u8,
    pub tbs_bytes: u32,
    pub harq_id: HarqId,
    pub is_new_data: bool,
    pub rv: u8,
    pub uci: Option<UciOnPusch>,
}

/// PUSCH for a UE or a Msg3
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UlSchedInfo {
    /// UE the PUSCH belongs to, `None` for Msg3 of an unknown UE
    pub ue_index: Option<UeIndex>,
    pub pusch: PuschInformation,
    pub is_msg3: bool,
}

/// UCI bits carried by a PUCCH
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PucchUciBits {
    pub harq_ack_nof_bits: u32,
    pub sr_nof_bits: u32,
    pub csi_part1_nof_bits: u32,
}

impl PucchUciBits {
    /// Total payload
    pub fn total(&self) -> u32 {
        self.harq_ack_nof_bits + self.sr_nof_bits + self.csi_part1_nof_bits
    }

    /// Whether no UCI is carried
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// PUCCH resources of a PUCCH PDU
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PucchResources {
    pub prbs: PrbInterval,
    pub second_hop_prbs: Option<PrbInterval>,
    pub symbols: OfdmSymbolRange,
    pub initial_cyclic_shift: u8,
    pub time_domain_occ: u8,
}

impl PucchResources {
    /// Whether two PUCCHs use the same PRBs and symbols but stay orthogonal through
    /// cyclic shift or OCC (formats 0/1 only)
    pub fn is_code_multiplexed_with(&self, other: &PucchResources) -> bool {
        self.prbs == other.prbs
            && self.second_hop_prbs == other.second_hop_prbs
            && self.symbols == other.symbols
            && (self.initial_cyclic_shift, self.time_domain_occ) != (other.initial_cyclic_shift, other.time_domain_occ)
    }
}

/// PUCCH PDU
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PucchInformation {
    pub rnti: Rnti,
    pub format: PucchFormat,
    pub resources: PucchResources,
    pub uci_bits: PucchUciBits,
    /// Allocated from the common PUCCH resource set
    pub is_common: bool,
}

/// UL part of a slot result
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UlSchedResult {
    pub puschs: Vec<UlSchedInfo>,
    pub pucchs: Vec<PucchInformation>,
}

impl UlSchedResult {
    /// Number of UL grants, PUSCHs and PUCCHs
    pub fn nof_grants(&self) -> usize {
        self.puschs.len() + self.pucchs.len()
    }

    /// PUSCH of an RNTI, if any
    pub fn pusch_for(&self, rnti: Rnti) -> Option<&UlSchedInfo> {
        self.puschs.iter().find(|p| p.pusch.rnti == rnti)
    }
}

/// Scheduling decisions for one slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedResult {
    pub slot: SlotPoint,
    pub dl: DlSchedResult,
    pub ul: UlSchedResult,
}

impl SchedResult {
    /// Empty result for a slot
    pub fn new(slot: SlotPoint) -> Self {
        Self {
            slot,
            dl: DlSchedResult::default(),
            ul: UlSchedResult::default(),
        }
    }

    /// Whether nothing is scheduled
    pub fn is_empty(&self) -> bool {
        self.dl == DlSchedResult::default() && self.ul == UlSchedResult::default()
    }
}
