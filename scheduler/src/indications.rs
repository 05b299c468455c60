//! Scheduler Indications
//!
//! Feedback and requests delivered to the scheduler by the PHY, the MAC and the
//! upper layers. Indications are queued on arrival and applied at the start of
//! the next slot.

use crate::config::UeCellConfiguration;
use common::slot_point::SlotPoint;
use common::types::{CellId, HarqId, Lcg, Lcid, Rnti, UeIndex};
use serde::{Deserialize, Serialize};

/// Add a UE to a cell, after its Msg3 was decoded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UeCreationRequest {
    pub ue_index: UeIndex,
    pub crnti: Rnti,
    pub cfg: UeCellConfiguration,
}

/// Replace the dedicated configuration of a UE
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UeReconfigurationRequest {
    pub ue_index: UeIndex,
    pub cfg: UeCellConfiguration,
}

/// RLC buffer occupancy of a DL logical channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DlBufferStateIndication {
    pub ue_index: UeIndex,
    pub lcid: Lcid,
    /// Absolute number of bytes pending, replaces the previous report
    pub pending_bytes: u32,
}

/// MAC CE to be sent in DL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DlMacCeIndication {
    pub ue_index: UeIndex,
    pub ce: DlMacCe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DlMacCe {
    /// UE Contention Resolution Identity
    ConRes,
}

/// Buffer status of one logical channel group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BsrReport {
    pub lcg: Lcg,
    pub nof_bytes: u32,
}

/// Buffer status report decoded from a PUSCH
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UlBsrIndication {
    pub ue_index: UeIndex,
    pub reports: Vec<BsrReport>,
}

/// CRC of one PUSCH
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrcPdu {
    /// C-RNTI of a UE or TC-RNTI of a Msg3
    pub rnti: Rnti,
    pub harq_id: HarqId,
    pub tb_crc_ok: bool,
}

/// CRCs of the PUSCHs received in a slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UlCrcIndication {
    pub cell_id: CellId,
    pub slot_rx: SlotPoint,
    pub crcs: Vec<CrcPdu>,
}

/// UCI decoded for one UE, on PUCCH or PUSCH
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UciPdu {
    pub rnti: Rnti,
    /// HARQ-ACK bits in codebook order
    pub harq_acks: Vec<bool>,
    pub sr_detected: bool,
    /// Wideband CQI of a CSI report
    pub cqi: Option<u8>,
}

/// UCIs received in a slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UciIndication {
    pub cell_id: CellId,
    pub slot_rx: SlotPoint,
    pub ucis: Vec<UciPdu>,
}

/// Preamble detected on a PRACH occasion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RachPreamble {
    pub preamble_id: u8,
    /// TC-RNTI assigned by the MAC
    pub tc_rnti: Rnti,
    pub timing_advance: u16,
}

/// PRACH occasion with detected preambles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RachOccasion {
    /// First OFDM symbol of the occasion (s_id)
    pub start_symbol: u8,
    /// Frequency index of the occasion (f_id)
    pub frequency_index: u8,
    pub preambles: Vec<RachPreamble>,
}

/// PRACH detections of a slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RachIndication {
    pub cell_id: CellId,
    pub slot_rx: SlotPoint,
    pub occasions: Vec<RachOccasion>,
}

/// Paging request from the core network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagingIndication {
    pub cell_id: CellId,
    /// 5G-S-TMSI of the paged UE
    pub s_tmsi: u64,
    /// UE specific DRX cycle in radio frames
    pub paging_drx_cycle_rf: Option<u32>,
}
