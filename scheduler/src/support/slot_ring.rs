//! Slot Ring
//!
//! Fixed-size ring of per-slot state addressed by absolute slot. Each entry is
//! tagged with the slot it was last reset for; accessing an entry whose tag does
//! not match, or a slot outside the window, is a contract violation.

use common::slot_point::SlotPoint;
use tracing::error;

/// Ring of `T` covering the slots `[slot_tx, slot_tx + size)`
#[derive(Debug)]
pub struct SlotRing<T> {
    last_slot_ind: Option<SlotPoint>,
    entries: Vec<(Option<SlotPoint>, T)>,
}

impl<T: Default> SlotRing<T> {
    /// Create a ring of `size` entries
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "Slot ring cannot be empty");
        Self {
            last_slot_ind: None,
            entries: (0..size).map(|_| (None, T::default())).collect(),
        }
    }
}

impl<T> SlotRing<T> {
    /// Number of entries
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    /// Current slot
    pub fn slot_tx(&self) -> Option<SlotPoint> {
        self.last_slot_ind
    }

    /// Advance to `sl`, calling `reset` on every entry that enters the window
    pub fn slot_indication(&mut self, sl: SlotPoint, mut reset: impl FnMut(&mut T)) {
        let size = self.size() as u32;
        let gap = match self.last_slot_ind {
            Some(last) => {
                let gap = sl - last;
                if gap <= 0 {
                    error!("Slot indication {} received after {}", sl, last);
                    panic!("Slot indications must be strictly increasing: got {} after {}", sl, last);
                }
                gap as u32
            }
            None => size,
        };
        let first_new = if gap >= size { sl } else { sl + (size - gap) };
        for i in 0..gap.min(size) {
            let new_sl = first_new + i;
            let entry = &mut self.entries[new_sl.to_uint() as usize % size as usize];
            entry.0 = Some(new_sl);
            reset(&mut entry.1);
        }
        self.last_slot_ind = Some(sl);
    }

    fn checked_index(&self, sl: SlotPoint) -> usize {
        let Some(slot_tx) = self.last_slot_ind else {
            panic!("Slot ring accessed before the first slot indication");
        };
        let diff = sl - slot_tx;
        assert!(
            diff >= 0 && (diff as usize) < self.size(),
            "Slot {} outside of the window [{}, +{})",
            sl,
            slot_tx,
            self.size()
        );
        let idx = sl.to_uint() as usize % self.size();
        assert_eq!(self.entries[idx].0, Some(sl), "Stale slot ring entry for {}", sl);
        idx
    }

    /// Entry of slot `sl`
    pub fn get(&self, sl: SlotPoint) -> &T {
        let idx = self.checked_index(sl);
        &self.entries[idx].1
    }

    /// Mutable entry of slot `sl`
    pub fn get_mut(&mut self, sl: SlotPoint) -> &mut T {
        let idx = self.checked_index(sl);
        &mut self.entries[idx].1
    }
}
