//! UE Repository
//!
//! UEs of a cell, iterated in UE index order

use super::ue::Ue;
use common::types::{Rnti, UeIndex};
use std::collections::BTreeMap;

/// UEs served by a cell
#[derive(Debug, Default)]
pub struct UeRepository {
    ues: BTreeMap<UeIndex, Ue>,
}

impl UeRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a UE. Returns it back if the index or the C-RNTI is already used.
    pub fn add_ue(&mut self, ue: Ue) -> Result<(), Box<Ue>> {
        if self.ues.contains_key(&ue.ue_index()) || self.find_by_rnti(ue.crnti()).is_some() {
            return Err(Box::new(ue));
        }
        self.ues.insert(ue.ue_index(), ue);
        Ok(())
    }

    pub fn remove_ue(&mut self, ue_index: UeIndex) -> Option<Ue> {
        self.ues.remove(&ue_index)
    }

    pub fn contains(&self, ue_index: UeIndex) -> bool {
        self.ues.contains_key(&ue_index)
    }

    pub fn get(&self, ue_index: UeIndex) -> Option<&Ue> {
        self.ues.get(&ue_index)
    }

    pub fn get_mut(&mut self, ue_index: UeIndex) -> Option<&mut Ue> {
        self.ues.get_mut(&ue_index)
    }

    pub fn find_by_rnti(&self, rnti: Rnti) -> Option<&Ue> {
        self.ues.values().find(|ue| ue.crnti() == rnti)
    }

    pub fn find_by_rnti_mut(&mut self, rnti: Rnti) -> Option<&mut Ue> {
        self.ues.values_mut().find(|ue| ue.crnti() == rnti)
    }

    pub fn len(&self) -> usize {
        self.ues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ues.is_empty()
    }

    /// UE indexes in ascending order
    pub fn indexes(&self) -> Vec<UeIndex> {
        self.ues.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Ue> {
        self.ues.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Ue> {
        self.ues.values_mut()
    }
}
