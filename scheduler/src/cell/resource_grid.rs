//! Carrier Resource Grid
//!
//! Per-slot occupancy of one carrier: a CRB bitmap for each OFDM symbol

use common::bitmap::BoundedBitmap;
use common::interval::{CrbInterval, OfdmSymbolRange, NOF_OFDM_SYMBOLS_PER_SLOT};
use std::fmt;

/// Time-frequency resources of a grant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrantInfo {
    pub symbols: OfdmSymbolRange,
    pub crbs: CrbInterval,
}

impl GrantInfo {
    pub fn new(symbols: OfdmSymbolRange, crbs: CrbInterval) -> Self {
        Self { symbols, crbs }
    }

    /// Whether two grants share at least one resource element
    pub fn overlaps(&self, other: &GrantInfo) -> bool {
        self.symbols.overlaps(&other.symbols) && self.crbs.overlaps(&other.crbs)
    }
}

impl fmt::Display for GrantInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "symb={} crbs={}", self.symbols, self.crbs)
    }
}

/// Used CRBs per OFDM symbol of one slot
#[derive(Debug, Clone)]
pub struct CarrierSubslotResourceGrid {
    nof_crbs: u32,
    symbols: Vec<BoundedBitmap>,
}

impl CarrierSubslotResourceGrid {
    /// Empty grid for a carrier of `nof_crbs` CRBs
    pub fn new(nof_crbs: u32) -> Self {
        Self {
            nof_crbs,
            symbols: (0..NOF_OFDM_SYMBOLS_PER_SLOT)
                .map(|_| BoundedBitmap::new(nof_crbs as usize))
                .collect(),
        }
    }

    /// Number of CRBs of the carrier
    pub fn nof_crbs(&self) -> u32 {
        self.nof_crbs
    }

    fn check_bounds(&self, grant: &GrantInfo) {
        assert!(
            grant.crbs.stop() <= self.nof_crbs && grant.symbols.stop() <= NOF_OFDM_SYMBOLS_PER_SLOT,
            "Grant {} outside of the carrier with {} CRBs",
            grant,
            self.nof_crbs
        );
    }

    /// Mark the grant resources as used
    pub fn fill(&mut self, grant: GrantInfo) {
        self.check_bounds(&grant);
        for symb in grant.symbols.iter() {
            self.symbols[symb as usize].fill(grant.crbs.start() as usize, grant.crbs.stop() as usize, true);
        }
    }

    /// Release every resource
    pub fn clear(&mut self) {
        self.symbols.iter_mut().for_each(|s| s.reset_all());
    }

    /// Whether any resource of the grant is already used
    pub fn collides(&self, grant: &GrantInfo) -> bool {
        self.check_bounds(grant);
        grant
            .symbols
            .iter()
            .any(|symb| self.symbols[symb as usize].any_in(grant.crbs.start() as usize, grant.crbs.stop() as usize))
    }

    /// CRBs used in any of the given symbols
    pub fn used_crbs(&self, symbols: OfdmSymbolRange) -> BoundedBitmap {
        let mut used = BoundedBitmap::new(self.nof_crbs as usize);
        for symb in symbols.iter() {
            used |= &self.symbols[symb as usize];
        }
        used
    }

    /// CRBs used in any of the given symbols, with CRBs outside `limits` marked used
    pub fn used_crbs_within(&self, symbols: OfdmSymbolRange, limits: CrbInterval) -> BoundedBitmap {
        let mut used = self.used_crbs(symbols);
        let stop = limits.stop().min(self.nof_crbs) as usize;
        used.fill(0, (limits.start() as usize).min(stop), true);
        used.fill(stop, self.nof_crbs as usize, true);
        used
    }
}
