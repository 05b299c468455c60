//! Common PUCCH Resources
//!
//! PUCCH resource sets used before dedicated PUCCH configuration
//! (TS 38.213 §9.2.1, Table 9.2.1-1).

use crate::config::pucch_config::PucchFormat;
use common::interval::{OfdmSymbolRange, PrbInterval};

/// Number of common PUCCH resources (r_PUCCH values)
pub const NOF_COMMON_PUCCH_RESOURCES: u32 = 16;

/// Number of values of the PUCCH resource indicator field
pub const NOF_PUCCH_RES_INDICATORS: u8 = 8;

/// One row of TS 38.213 Table 9.2.1-1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommonPucchResourceSet {
    pub format: PucchFormat,
    pub first_symbol: u8,
    pub nof_symbols: u8,
    /// RB offset, `None` for floor(N_BWP / 4)
    pub rb_offset: Option<u32>,
    pub cs_indexes: &'static [u8],
}

const TABLE_9_2_1_1: [CommonPucchResourceSet; 16] = [
    CommonPucchResourceSet { format: PucchFormat::F0, first_symbol: 12, nof_symbols: 2, rb_offset: Some(0), cs_indexes: &[0, 3] },
    CommonPucchResourceSet { format: PucchFormat::F0, first_symbol: 12, nof_symbols: 2, rb_offset: Some(0), cs_indexes: &[0, 4, 8] },
    CommonPucchResourceSet { format: PucchFormat::F0, first_symbol: 12, nof_symbols: 2, rb_offset: Some(3), cs_indexes: &[0, 4, 8] },
    CommonPucchResourceSet { format: PucchFormat::F1, first_symbol: 10, nof_symbols: 4, rb_offset: Some(0), cs_indexes: &[0, 6] },
    CommonPucchResourceSet { format: PucchFormat::F1, first_symbol: 10, nof_symbols: 4, rb_offset: Some(0), cs_indexes: &[0, 3, 6, 9] },
    CommonPucchResourceSet { format: PucchFormat::F1, first_symbol: 10, nof_symbols: 4, rb_offset: Some(2), cs_indexes: &[0, 3, 6, 9] },
    CommonPucchResourceSet { format: PucchFormat::F1, first_symbol: 10, nof_symbols: 4, rb_offset: Some(4), cs_indexes: &[0, 3, 6, 9] },
    CommonPucchResourceSet { format: PucchFormat::F1, first_symbol: 4, nof_symbols: 10, rb_offset: Some(0), cs_indexes: &[0, 6] },
    CommonPucchResourceSet { format: PucchFormat::F1, first_symbol: 4, nof_symbols: 10, rb_offset: Some(0), cs_indexes: &[0, 3, 6, 9] },
    CommonPucchResourceSet { format: PucchFormat::F1, first_symbol: 4, nof_symbols: 10, rb_offset: Some(2), cs_indexes: &[0, 3, 6, 9] },
    CommonPucchResourceSet { format: PucchFormat::F1, first_symbol: 4, nof_symbols: 10, rb_offset: Some(4), cs_indexes: &[0, 3, 6, 9] },
    CommonPucchResourceSet { format: PucchFormat::F1, first_symbol: 0, nof_symbols: 14, rb_offset: Some(0), cs_indexes: &[0, 6] },
    CommonPucchResourceSet { format: PucchFormat::F1, first_symbol: 0, nof_symbols: 14, rb_offset: Some(0), cs_indexes: &[0, 3, 6, 9] },
    CommonPucchResourceSet { format: PucchFormat::F1, first_symbol: 0, nof_symbols: 14, rb_offset: Some(2), cs_indexes: &[0, 3, 6, 9] },
    CommonPucchResourceSet { format: PucchFormat::F1, first_symbol: 0, nof_symbols: 14, rb_offset: Some(4), cs_indexes: &[0, 3, 6, 9] },
    CommonPucchResourceSet { format: PucchFormat::F1, first_symbol: 0, nof_symbols: 14, rb_offset: None, cs_indexes: &[0, 3, 6, 9] },
];

/// Row of Table 9.2.1-1 for a `pucch-ResourceCommon` index
pub fn common_pucch_resource_set(index: u8) -> Option<&'static CommonPucchResourceSet> {
    TABLE_9_2_1_1.get(index as usize)
}

/// Resolved common PUCCH resource for one r_PUCCH value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommonPucchResource {
    pub format: PucchFormat,
    pub first_hop_prb: u32,
    pub second_hop_prb: u32,
    pub symbols: OfdmSymbolRange,
    pub initial_cyclic_shift: u8,
}

impl CommonPucchResource {
    /// PRBs of the first hop
    pub fn first_hop(&self) -> PrbInterval {
        PrbInterval::from_length(self.first_hop_prb, 1)
    }

    /// PRBs of the second hop
    pub fn second_hop(&self) -> PrbInterval {
        PrbInterval::from_length(self.second_hop_prb, 1)
    }
}

/// r_PUCCH from the PDCCH first CCE and the PUCCH resource indicator
pub fn r_pucch(first_cce: u32, nof_coreset_cces: u32, pri: u8) -> u32 {
    (2 * first_cce) / nof_coreset_cces.max(1) + 2 * pri as u32
}

/// Resolve r_PUCCH into PRBs and cyclic shift over a BWP of `nof_bwp_rbs`
pub fn common_pucch_resource(set: &CommonPucchResourceSet, r: u32, nof_bwp_rbs: u32) -> CommonPucchResource {
    let rb_offset = set.rb_offset.unwrap_or(nof_bwp_rbs / 4);
    let n_cs = set.cs_indexes.len() as u32;
    let (r_rel, lower_first) = if r < NOF_COMMON_PUCCH_RESOURCES / 2 {
        (r, true)
    } else {
        (r - NOF_COMMON_PUCCH_RESOURCES / 2, false)
    };
    let low = rb_offset + r_rel / n_cs;
    let high = nof_bwp_rbs - 1 - rb_offset - r_rel / n_cs;
    let (first_hop_prb, second_hop_prb) = if lower_first { (low, high) } else { (high, low) };
    CommonPucchResource {
        format: set.format,
        first_hop_prb,
        second_hop_prb,
        symbols: OfdmSymbolRange::from_length(set.first_symbol, set.nof_symbols),
        initial_cyclic_shift: set.cs_indexes[(r_rel % n_cs) as usize],
    }
}

/// PRBs used by all 16 resources of a common set, both hops
pub fn common_pucch_prbs(set: &CommonPucchResourceSet, nof_bwp_rbs: u32) -> Vec<u32> {
    let mut prbs: Vec<u32> = (0..NOF_COMMON_PUCCH_RESOURCES)
        .flat_map(|r| {
            let res = common_pucch_resource(set, r, nof_bwp_rbs);
            [res.first_hop_prb, res.second_hop_prb]
        })
        .collect();
    prbs.sort_unstable();
    prbs.dedup();
    prbs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_set_11() {
        let set = common_pucch_resource_set(11).unwrap();
        assert_eq!(set.format, PucchFormat::F1);
        let r0 = common_pucch_resource(set, 0, 52);
        assert_eq!((r0.first_hop_prb, r0.second_hop_prb, r0.initial_cyclic_shift), (0, 51, 0));
        let r1 = common_pucch_resource(set, 1, 52);
        assert_eq!((r1.first_hop_prb, r1.initial_cyclic_shift), (0, 6));
        let r9 = common_pucch_resource(set, 9, 52);
        assert_eq!((r9.first_hop_prb, r9.second_hop_prb, r9.initial_cyclic_shift), (51, 0, 6));
        assert_eq!(common_pucch_prbs(set, 52), vec![0, 1, 2, 3, 48, 49, 50, 51]);
    }

    #[test]
    fn test_r_pucch() {
        assert_eq!(r_pucch(0, 16, 0), 0);
        assert_eq!(r_pucch(8, 16, 0), 1);
        assert_eq!(r_pucch(12, 16, 3), 7);
        assert_eq!(r_pucch(4, 16, 7), 14);
    }

    #[test]
    fn test_invalid_index() {
        assert!(common_pucch_resource_set(16).is_none());
    }
}
