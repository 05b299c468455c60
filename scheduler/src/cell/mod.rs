//! Cell Resources
//!
//! Resource grid and the ring of per-slot allocators of a cell, together with
//! the control channel allocators writing into it

pub mod cell_resource_allocator;
pub mod resource_grid;

pub use cell_resource_allocator::{CellResourceAllocator, CellSlotResourceAllocator, RING_ALLOCATOR_SIZE};
pub use resource_grid::{CarrierSubslotResourceGrid, GrantInfo};

use crate::config::CellConfiguration;
use crate::pdcch_scheduling::{PdcchResourceAllocator, PdcchResourceAllocatorImpl};
use crate::pucch_scheduling::PucchAllocatorImpl;
use crate::uci_scheduling::{UciAllocator, UciAllocatorImpl};
use common::slot_point::SlotPoint;
use std::sync::Arc;

/// Resource grid of a cell and the allocators sharing it
pub struct CellResources {
    pub cfg: Arc<CellConfiguration>,
    pub grid: CellResourceAllocator,
    pub pdcch: Box<dyn PdcchResourceAllocator + Send>,
    pub uci: Box<dyn UciAllocator + Send>,
}

impl CellResources {
    /// Production allocators for a validated cell configuration
    pub fn new(cfg: Arc<CellConfiguration>) -> Self {
        let pucch = Box::new(PucchAllocatorImpl::new(cfg.clone()));
        Self::with_allocators(
            cfg.clone(),
            Box::new(PdcchResourceAllocatorImpl::new(cfg.clone())),
            Box::new(UciAllocatorImpl::new(cfg, pucch)),
        )
    }

    /// Build on custom PDCCH and UCI allocators
    pub fn with_allocators(
        cfg: Arc<CellConfiguration>,
        pdcch: Box<dyn PdcchResourceAllocator + Send>,
        uci: Box<dyn UciAllocator + Send>,
    ) -> Self {
        Self {
            grid: CellResourceAllocator::new(cfg.clone()),
            cfg,
            pdcch,
            uci,
        }
    }

    /// Advance the grid first, then the allocators keyed on it
    pub fn slot_indication(&mut self, sl_tx: SlotPoint) {
        self.grid.slot_indication(sl_tx);
        self.pdcch.slot_indication(sl_tx);
        self.uci.slot_indication(sl_tx);
    }

    pub fn slot_tx(&self) -> SlotPoint {
        self.grid.slot_tx()
    }
}
