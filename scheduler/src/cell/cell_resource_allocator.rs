//! Cell Resource Allocator
//!
//! Ring of per-slot resource grids and scheduling results covering the scheduler
//! lookahead window. Entry `i` of the window is the slot `slot_tx + i`. Each ring
//! entry carries the slot it was last reset for, and every access checks it.

use super::resource_grid::{CarrierSubslotResourceGrid, GrantInfo};
use crate::config::CellConfiguration;
use crate::result::SchedResult;
use crate::support::pucch_common::{common_pucch_prbs, common_pucch_resource_set};
use common::interval::{CrbInterval, OfdmSymbolRange, NOF_OFDM_SYMBOLS_PER_SLOT};
use common::slot_point::SlotPoint;
use std::ops::{Index, IndexMut, RangeInclusive};
use std::sync::Arc;
use tracing::{error, trace};

/// Number of slots of the resource grid ring
pub const RING_ALLOCATOR_SIZE: usize = 64;

/// Resources and scheduling result of one slot
#[derive(Debug)]
pub struct CellSlotResourceAllocator {
    pub cfg: Arc<CellConfiguration>,
    slot: Option<SlotPoint>,
    pub result: SchedResult,
    pub dl_res_grid: CarrierSubslotResourceGrid,
    pub ul_res_grid: CarrierSubslotResourceGrid,
}

impl CellSlotResourceAllocator {
    fn new(cfg: Arc<CellConfiguration>, placeholder: SlotPoint) -> Self {
        Self {
            dl_res_grid: CarrierSubslotResourceGrid::new(cfg.nof_dl_crbs),
            ul_res_grid: CarrierSubslotResourceGrid::new(cfg.nof_ul_crbs),
            result: SchedResult::new(placeholder),
            slot: None,
            cfg,
        }
    }

    /// Slot this entry currently represents
    pub fn slot(&self) -> SlotPoint {
        match self.slot {
            Some(sl) => sl,
            None => panic!("Resource grid entry accessed before the first slot indication"),
        }
    }

    fn reset(&mut self, sl: SlotPoint, ul_reserved: &[CrbInterval]) {
        self.slot = Some(sl);
        self.result = SchedResult::new(sl);
        self.dl_res_grid.clear();
        self.ul_res_grid.clear();
        let all_symbols = OfdmSymbolRange::new(0, NOF_OFDM_SYMBOLS_PER_SLOT);
        for crbs in ul_reserved {
            self.ul_res_grid.fill(GrantInfo::new(all_symbols, *crbs));
        }
    }
}

/// Ring of slot resource allocators
#[derive(Debug)]
pub struct CellResourceAllocator {
    pub cfg: Arc<CellConfiguration>,
    /// UL CRBs reserved for PUCCH in every slot
    pucch_crbs: Vec<CrbInterval>,
    last_slot_ind: Option<SlotPoint>,
    slots: Vec<CellSlotResourceAllocator>,
}

impl CellResourceAllocator {
    /// Create the ring. Entries become usable after the first slot indication.
    pub fn new(cfg: Arc<CellConfiguration>) -> Self {
        let placeholder = SlotPoint::from_count(cfg.scs_common, 0);
        let slots = (0..RING_ALLOCATOR_SIZE)
            .map(|_| CellSlotResourceAllocator::new(cfg.clone(), placeholder))
            .collect();
        Self {
            pucch_crbs: pucch_reserved_crbs(&cfg),
            last_slot_ind: None,
            slots,
            cfg,
        }
    }

    /// Advance the window to `sl`. Slots must be strictly increasing; gaps are allowed.
    pub fn slot_indication(&mut self, sl: SlotPoint) {
        let Some(last) = self.last_slot_ind else {
            for i in 0..RING_ALLOCATOR_SIZE as u32 {
                self.reset_entry(sl + i);
            }
            self.last_slot_ind = Some(sl);
            return;
        };

        let gap = sl - last;
        if gap <= 0 {
            error!("Slot indication {} received after {}", sl, last);
            panic!("Slot indications must be strictly increasing: got {} after {}", sl, last);
        }
        if gap as usize >= RING_ALLOCATOR_SIZE {
            for i in 0..RING_ALLOCATOR_SIZE as u32 {
                self.reset_entry(sl + i);
            }
        } else {
            // Entries that left the window are recycled for the newly exposed slots.
            for i in 0..gap as u32 {
                self.reset_entry(last + i + RING_ALLOCATOR_SIZE as u32);
            }
        }
        if gap > 1 {
            trace!("Slot indication skipped {} slots before {}", gap - 1, sl);
        }
        self.last_slot_ind = Some(sl);
    }

    fn reset_entry(&mut self, sl: SlotPoint) {
        let idx = ring_index(sl);
        self.slots[idx].reset(sl, &self.pucch_crbs);
    }

    /// Current transmission slot
    pub fn slot_tx(&self) -> SlotPoint {
        match self.last_slot_ind {
            Some(sl) => sl,
            None => panic!("Resource grid used before the first slot indication"),
        }
    }

    /// Number of slots of the lookahead window
    pub fn max_slot_offset(&self) -> u32 {
        RING_ALLOCATOR_SIZE as u32 - 1
    }

    /// Offsets of the window that were not visible yet when the slot `last` was
    /// current. The whole window on the first call or after a long gap.
    pub fn offsets_exposed_since(&self, last: Option<SlotPoint>) -> RangeInclusive<u32> {
        let max_offset = self.max_slot_offset();
        let Some(last) = last else {
            return 0..=max_offset;
        };
        match self.slot_tx() - last {
            0 => 1..=0,
            gap if gap > 0 && (gap as u32) <= max_offset => (max_offset + 1 - gap as u32)..=max_offset,
            _ => 0..=max_offset,
        }
    }

    fn checked_index(&self, offset: u32) -> usize {
        assert!(
            (offset as usize) < RING_ALLOCATOR_SIZE,
            "Slot offset {} exceeds the resource grid ring of {} slots",
            offset,
            RING_ALLOCATOR_SIZE
        );
        let sl = self.slot_tx() + offset;
        let idx = ring_index(sl);
        let tag = self.slots[idx].slot;
        if tag != Some(sl) {
            error!("Stale resource grid entry: expected {} found {:?}", sl, tag);
            panic!("Resource grid entry for {} is stale", sl);
        }
        idx
    }
}

impl Index<u32> for CellResourceAllocator {
    type Output = CellSlotResourceAllocator;

    fn index(&self, offset: u32) -> &CellSlotResourceAllocator {
        let idx = self.checked_index(offset);
        &self.slots[idx]
    }
}

impl IndexMut<u32> for CellResourceAllocator {
    fn index_mut(&mut self, offset: u32) -> &mut CellSlotResourceAllocator {
        let idx = self.checked_index(offset);
        &mut self.slots[idx]
    }
}

fn ring_index(sl: SlotPoint) -> usize {
    sl.to_uint() as usize % RING_ALLOCATOR_SIZE
}

/// UL CRBs occupied by the common PUCCH set and by the dedicated PUCCH pool
fn pucch_reserved_crbs(cfg: &CellConfiguration) -> Vec<CrbInterval> {
    let mut prbs: Vec<u32> = common_pucch_resource_set(cfg.pucch_resource_common)
        .map(|set| common_pucch_prbs(set, cfg.nof_ul_crbs))
        .unwrap_or_default();
    for res in &cfg.pucch_resources {
        prbs.extend(res.prbs(res.nof_prbs).iter());
        if let Some(hop) = res.second_hop_prbs(res.nof_prbs) {
            prbs.extend(hop.iter());
        }
    }
    prbs.sort_unstable();
    prbs.dedup();

    let mut intervals: Vec<CrbInterval> = Vec::new();
    for prb in prbs.into_iter().filter(|p| *p < cfg.nof_ul_crbs) {
        match intervals.last_mut() {
            Some(last) if last.stop() == prb => last.resize(last.length() + 1),
            _ => intervals.push(CrbInterval::new(prb, prb + 1)),
        }
    }
    intervals
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::types::SubcarrierSpacing;

    fn slot(count: u32) -> SlotPoint {
        SlotPoint::from_count(SubcarrierSpacing::Scs15, count)
    }

    #[test]
    fn test_pucch_region_is_reserved() {
        let cfg = Arc::new(CellConfiguration::default());
        let reserved = pucch_reserved_crbs(&cfg);
        assert_eq!(
            reserved,
            vec![CrbInterval::new(0, 6), CrbInterval::new(36, 52)]
        );
        let mut res = CellResourceAllocator::new(cfg);
        res.slot_indication(slot(0));
        let used = res[0].ul_res_grid.used_crbs(OfdmSymbolRange::new(0, 14));
        assert_eq!(used.free_intervals(), vec![CrbInterval::new(6, 36)]);
    }

    #[test]
    fn test_ring_advances() {
        let mut res = CellResourceAllocator::new(Arc::new(CellConfiguration::default()));
        res.slot_indication(slot(10));
        res[5].dl_res_grid.fill(GrantInfo::new(OfdmSymbolRange::new(2, 14), CrbInterval::new(0, 5)));
        assert_eq!(res[5].slot(), slot(15));

        res.slot_indication(slot(11));
        assert_eq!(res.slot_tx(), slot(11));
        assert_eq!(res[4].slot(), slot(15));
        assert!(res[4].dl_res_grid.collides(&GrantInfo::new(OfdmSymbolRange::new(2, 3), CrbInterval::new(0, 1))));
        // The slot newly exposed at the end of the window is clean.
        assert_eq!(res[63].slot(), slot(74));
        assert!(res[63].result.is_empty());
    }

    #[test]
    fn test_gap_in_slot_indications() {
        let mut res = CellResourceAllocator::new(Arc::new(CellConfiguration::default()));
        res.slot_indication(slot(0));
        res[20].dl_res_grid.fill(GrantInfo::new(OfdmSymbolRange::new(2, 14), CrbInterval::new(0, 5)));
        res.slot_indication(slot(10));
        assert_eq!(res[10].slot(), slot(20));
        assert!(res[10].dl_res_grid.collides(&GrantInfo::new(OfdmSymbolRange::new(2, 3), CrbInterval::new(0, 1))));
        for off in 54..64 {
            assert_eq!(res[off].slot(), slot(10 + off));
        }
        res.slot_indication(slot(200));
        assert_eq!(res[63].slot(), slot(263));
        assert!(!res[0].dl_res_grid.collides(&GrantInfo::new(OfdmSymbolRange::new(2, 14), CrbInterval::new(0, 52))));
    }

    #[test]
    fn test_exposed_offsets() {
        let mut res = CellResourceAllocator::new(Arc::new(CellConfiguration::default()));
        res.slot_indication(slot(10));
        assert_eq!(res.offsets_exposed_since(None), 0..=63);
        assert!(res.offsets_exposed_since(Some(slot(10))).is_empty());
        res.slot_indication(slot(13));
        assert_eq!(res.offsets_exposed_since(Some(slot(10))), 61..=63);
        res.slot_indication(slot(100));
        assert_eq!(res.offsets_exposed_since(Some(slot(13))), 0..=63);
    }

    #[test]
    fn test_wraparound() {
        let mut res = CellResourceAllocator::new(Arc::new(CellConfiguration::default()));
        let last = slot(10239);
        res.slot_indication(last);
        res.slot_indication(last + 1);
        assert_eq!(res.slot_tx(), slot(0));
        assert_eq!(res[5].slot(), slot(5));
    }

    #[test]
    #[should_panic]
    fn test_out_of_order_slot_indication() {
        let mut res = CellResourceAllocator::new(Arc::new(CellConfiguration::default()));
        res.slot_indication(slot(10));
        res.slot_indication(slot(9));
    }

    #[test]
    #[should_panic]
    fn test_offset_out_of_range() {
        let mut res = CellResourceAllocator::new(Arc::new(CellConfiguration::default()));
        res.slot_indication(slot(10));
        let _ = &res[RING_ALLOCATOR_SIZE as u32];
    }
}
