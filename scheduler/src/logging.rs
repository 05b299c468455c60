//! Scheduling Result Logging
//!
//! One `debug` summary line per slot, plus one `trace` line per grant.

use crate::result::SchedResult;
use common::types::CellId;
use tracing::{debug, enabled, trace, Level};

/// Log the result of a slot
pub fn log_sched_result(cell_id: CellId, result: &SchedResult) {
    let dl = &result.dl;
    let ul = &result.ul;
    debug!(
        "Cell {:?} slot {}: dl_pdcchs={} ul_pdcchs={} ssb={} csi_rs={} sib={} rar={} paging={} pdschs={} puschs={} pucchs={}",
        cell_id,
        result.slot,
        dl.dl_pdcchs.len(),
        dl.ul_pdcchs.len(),
        dl.ssbs.len(),
        dl.csi_rs.len(),
        dl.sibs.len(),
        dl.rars.len(),
        dl.paging.len(),
        dl.ue_grants.len(),
        ul.puschs.len(),
        ul.pucchs.len()
    );

    if !enabled!(Level::TRACE) {
        return;
    }
    for pdcch in &dl.dl_pdcchs {
        trace!(
            "  DL PDCCH rnti={} {:?} ss={} al={:?} cces={}",
            pdcch.ctx.rnti,
            pdcch.ctx.rnti_type,
            pdcch.ctx.ss_id,
            pdcch.ctx.aggr_lvl,
            pdcch.ctx.cces
        );
    }
    for pdcch in &dl.ul_pdcchs {
        trace!(
            "  UL PDCCH rnti={} {:?} ss={} al={:?} cces={}",
            pdcch.ctx.rnti,
            pdcch.ctx.rnti_type,
            pdcch.ctx.ss_id,
            pdcch.ctx.aggr_lvl,
            pdcch.ctx.cces
        );
    }
    for rar in &dl.rars {
        trace!("  RAR ra-rnti={} crbs={} msg3s={}", rar.ra_rnti, rar.pdsch.crbs, rar.grants.len());
    }
    for grant in &dl.ue_grants {
        let pdsch = &grant.pdsch;
        trace!(
            "  PDSCH {} rnti={} h={} {} crbs={} mcs={} tbs={} rv={}{}",
            grant.ue_index,
            pdsch.rnti,
            pdsch.harq_id.0,
            if pdsch.is_new_data { "newtx" } else { "retx" },
            pdsch.crbs,
            pdsch.mcs,
            pdsch.tbs_bytes,
            pdsch.rv,
            if grant.conres_ce { " conres" } else { "" }
        );
    }
    for grant in &ul.puschs {
        let pusch = &grant.pusch;
        trace!(
            "  PUSCH rnti={} h={} {} crbs={} mcs={} tbs={} rv={} msg3={} uci={:?}",
            pusch.rnti,
            pusch.harq_id.0,
            if pusch.is_new_data { "newtx" } else { "retx" },
            pusch.crbs,
            pusch.mcs,
            pusch.tbs_bytes,
            pusch.rv,
            grant.is_msg3,
            pusch.uci
        );
    }
    for pucch in &ul.pucchs {
        trace!(
            "  PUCCH rnti={} {:?} prbs={} symbols={} harq={} sr={} csi={}{}",
            pucch.rnti,
            pucch.format,
            pucch.resources.prbs,
            pucch.resources.symbols,
            pucch.uci_bits.harq_ack_nof_bits,
            pucch.uci_bits.sr_nof_bits,
            pucch.uci_bits.csi_part1_nof_bits,
            if pucch.is_common { " common" } else { "" }
        );
    }
}
