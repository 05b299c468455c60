//! PDCCH Slot Allocator
//!
//! CCE bookkeeping for the PDCCHs of one slot. Candidates of all CORESETs share
//! one REG usage map since CORESETs may overlap in frequency. When no candidate of
//! a new DCI is free, the allocations in UE-specific search spaces are searched
//! again depth-first to make room.

use crate::config::CoresetConfiguration;
use crate::support::pdcch_candidates::AggregationLevel;
use common::bitmap::BoundedBitmap;
use common::interval::CrbInterval;
use tracing::trace;

use super::MAX_CORESET_SYMBOLS;

/// Maximum number of nodes visited when rearranging PDCCH candidates
const MAX_DFS_NODES: usize = 1000;

/// Position of a PDCCH in the slot result lists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PdcchRef {
    Dl(usize),
    Ul(usize),
}

/// PDCCH to be placed in a slot
#[derive(Debug, Clone)]
pub struct PdcchAllocRequest {
    pub pdcch: PdcchRef,
    pub coreset: CoresetConfiguration,
    pub aggr_lvl: AggregationLevel,
    /// First CCE of each candidate, in order of preference
    pub candidates: Vec<u32>,
    /// Whether the candidate may be changed by later allocations
    pub movable: bool,
}

#[derive(Debug, Clone)]
struct AllocRecord {
    req: PdcchAllocRequest,
    chosen: usize,
}

impl AllocRecord {
    fn cce(&self) -> u32 {
        self.req.candidates[self.chosen]
    }
}

/// Result of a successful allocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdcchAllocOutcome {
    /// First CCE of the new PDCCH
    pub cce: u32,
    /// Earlier PDCCHs moved to a different candidate, with their new first CCE
    pub moved: Vec<(PdcchRef, u32)>,
}

/// Per-slot PDCCH allocation state
#[derive(Debug, Default)]
pub struct PdcchSlotAllocator {
    records: Vec<AllocRecord>,
    reg_usage: Vec<BoundedBitmap>,
}

impl PdcchSlotAllocator {
    /// Clear the slot state for a DL carrier of `nof_crbs`
    pub fn reset(&mut self, nof_crbs: u32) {
        self.records.clear();
        if self.reg_usage.first().map(|b| b.len()) != Some(nof_crbs as usize) {
            self.reg_usage = (0..MAX_CORESET_SYMBOLS)
                .map(|_| BoundedBitmap::new(nof_crbs as usize))
                .collect();
        } else {
            self.reg_usage.iter_mut().for_each(|b| b.reset_all());
        }
    }

    /// Place a PDCCH, possibly moving earlier movable ones
    pub fn alloc(&mut self, req: PdcchAllocRequest) -> Option<PdcchAllocOutcome> {
        let free = req.candidates.iter().enumerate().find_map(|(i, &cce)| {
            let crbs = req.coreset.cces_to_crbs(cce, req.aggr_lvl.nof_cces());
            (!collides(&self.reg_usage, &req.coreset, crbs)).then_some((i, cce, crbs))
        });
        match free {
            Some((chosen, cce, crbs)) => {
                fill(&mut self.reg_usage, &req.coreset, crbs, true);
                self.records.push(AllocRecord { req, chosen });
                Some(PdcchAllocOutcome { cce, moved: Vec::new() })
            }
            None => self.rearrange(req),
        }
    }

    /// Remove the most recent allocation
    pub fn cancel_last(&mut self) -> Option<PdcchRef> {
        let rec = self.records.pop()?;
        let crbs = rec.req.coreset.cces_to_crbs(rec.cce(), rec.req.aggr_lvl.nof_cces());
        fill(&mut self.reg_usage, &rec.req.coreset, crbs, false);
        Some(rec.req.pdcch)
    }

    fn rearrange(&mut self, req: PdcchAllocRequest) -> Option<PdcchAllocOutcome> {
        if !self.records.iter().any(|r| r.req.movable) {
            return None;
        }

        let mut usage: Vec<BoundedBitmap> = self.reg_usage.iter().map(|b| BoundedBitmap::new(b.len())).collect();
        for rec in self.records.iter().filter(|r| !r.req.movable) {
            let crbs = rec.req.coreset.cces_to_crbs(rec.cce(), rec.req.aggr_lvl.nof_cces());
            fill(&mut usage, &rec.req.coreset, crbs, true);
        }

        let mut items: Vec<&PdcchAllocRequest> =
            self.records.iter().filter(|r| r.req.movable).map(|r| &r.req).collect();
        items.push(&req);
        let mut choice = vec![0usize; items.len()];
        let mut budget = MAX_DFS_NODES;
        if !dfs(&items, 0, &mut usage, &mut choice, &mut budget) {
            trace!("PDCCH rearrangement failed after {} nodes", MAX_DFS_NODES - budget);
            return None;
        }

        let mut moved = Vec::new();
        let mut movable_choices = choice.iter();
        for rec in self.records.iter_mut().filter(|r| r.req.movable) {
            if let Some(&new_choice) = movable_choices.next() {
                if new_choice != rec.chosen {
                    rec.chosen = new_choice;
                    moved.push((rec.req.pdcch, rec.cce()));
                }
            }
        }
        let new_choice = *movable_choices.next()?;
        let cce = req.candidates[new_choice];
        self.records.push(AllocRecord { req, chosen: new_choice });
        self.reg_usage = usage;
        Some(PdcchAllocOutcome { cce, moved })
    }
}

fn dfs(
    items: &[&PdcchAllocRequest],
    pos: usize,
    usage: &mut [BoundedBitmap],
    choice: &mut [usize],
    budget: &mut usize,
) -> bool {
    let Some(item) = items.get(pos) else {
        return true;
    };
    for (i, &cce) in item.candidates.iter().enumerate() {
        if *budget == 0 {
            return false;
        }
        *budget -= 1;
        let crbs = item.coreset.cces_to_crbs(cce, item.aggr_lvl.nof_cces());
        if collides(usage, &item.coreset, crbs) {
            continue;
        }
        fill(usage, &item.coreset, crbs, true);
        choice[pos] = i;
        if dfs(items, pos + 1, usage, choice, budget) {
            return true;
        }
        fill(usage, &item.coreset, crbs, false);
    }
    false
}

fn collides(usage: &[BoundedBitmap], coreset: &CoresetConfiguration, crbs: CrbInterval) -> bool {
    usage
        .iter()
        .take(coreset.duration as usize)
        .any(|symb| symb.any_in(crbs.start() as usize, crbs.stop() as usize))
}

fn fill(usage: &mut [BoundedBitmap], coreset: &CoresetConfiguration, crbs: CrbInterval, value: bool) {
    for symb in usage.iter_mut().take(coreset.duration as usize) {
        symb.fill(crbs.start() as usize, crbs.stop() as usize, value);
    }
}
