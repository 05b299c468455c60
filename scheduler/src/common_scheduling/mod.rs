//! Common Channel Scheduling
//!
//! Broadcast and random access channels: SSB, CSI-RS, SIB1, RAR with Msg3 and
//! paging. They are placed before any UE grant of the slot. PDSCHs addressed to
//! SI-, RA- and P-RNTI stay within the CORESET#0 bandwidth.

pub mod csi_rs_scheduler;
pub mod paging_scheduler;
pub mod ra_scheduler;
pub mod sib_scheduler;
pub mod ssb_scheduler;

pub use csi_rs_scheduler::CsiRsScheduler;
pub use paging_scheduler::PagingScheduler;
pub use ra_scheduler::RaScheduler;
pub use sib_scheduler::SibScheduler;
pub use ssb_scheduler::SsbScheduler;

use crate::cell::{CellResources, GrantInfo};
use crate::pdcch_scheduling::DlPdcchIndex;
use crate::result::{DlDciPayload, PdschInformation};
use crate::support::mcs_tbs::{compute_tbs_bytes, nof_prbs_for_bytes, TbsParameters};
use crate::support::AggregationLevel;
use common::interval::{CrbInterval, OfdmSymbolRange};
use common::types::{HarqId, Rnti};

/// Aggregation level of RA-RNTI, TC-RNTI and P-RNTI PDCCHs
pub const COMMON_AGGREGATION_LEVEL: AggregationLevel = AggregationLevel::N4;

/// Placement of a common PDSCH found in the grid, not committed yet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CommonPdsch {
    /// Offset of the PDSCH slot from the current slot (k0)
    pub offset: u32,
    pub td_index: u8,
    pub symbols: OfdmSymbolRange,
    pub crbs: CrbInterval,
    pub mcs: u8,
    pub tbs_bytes: u32,
}

/// Free CRBs for `nof_bytes` at `mcs` within CORESET#0, on the first PDSCH
/// time resource landing on a DL slot
pub(crate) fn find_common_pdsch(res: &CellResources, nof_bytes: u32, mcs: u8) -> Option<CommonPdsch> {
    let sl_tx = res.slot_tx();
    let (td_index, td) = res
        .cfg
        .pdsch_td_alloc_list
        .iter()
        .enumerate()
        .find(|(_, td)| res.cfg.is_dl_enabled(sl_tx + td.k0 as u32))?;
    let limits = res.cfg.coreset0_crbs();
    let params = TbsParameters::new(mcs, td.symbols);
    let nof_prbs = nof_prbs_for_bytes(&params, nof_bytes, limits.length())?;
    let used = res.grid[td.k0 as u32].dl_res_grid.used_crbs_within(td.symbols, limits);
    let crbs = used.first_free_interval(nof_prbs, nof_prbs)?;
    Some(CommonPdsch {
        offset: td.k0 as u32,
        td_index: td_index as u8,
        symbols: td.symbols,
        crbs,
        mcs,
        tbs_bytes: compute_tbs_bytes(&params, nof_prbs),
    })
}

/// Fill the grid and the DCI of a common PDSCH scheduled by `pdcch`
pub(crate) fn commit_common_pdsch(
    res: &mut CellResources,
    pdcch: DlPdcchIndex,
    pdsch: &CommonPdsch,
    rnti: Rnti,
) -> PdschInformation {
    res.grid[0].result.dl.dl_pdcchs[pdcch.0].dci = DlDciPayload {
        time_resource: pdsch.td_index,
        crbs: pdsch.crbs,
        mcs: pdsch.mcs,
        ..Default::default()
    };
    res.grid[pdsch.offset]
        .dl_res_grid
        .fill(GrantInfo::new(pdsch.symbols, pdsch.crbs));
    PdschInformation {
        rnti,
        crbs: pdsch.crbs,
        symbols: pdsch.symbols,
        mcs: pdsch.mcs,
        tbs_bytes: pdsch.tbs_bytes,
        harq_id: HarqId(0),
        is_new_data: true,
        rv: 0,
    }
}
