//! Round-Robin Policy
//!
//! Time-domain round-robin: the UE offered the resources first moves one
//! position forward every slot, separately for DL and UL.

use super::{schedule_dl_in_order, schedule_ul_in_order, SchedulerPolicy, UeSchedContext};
use common::types::UeIndex;

pub struct RoundRobin {
    next_dl: usize,
    next_ul: usize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self { next_dl: 0, next_ul: 0 }
    }
}

impl Default for RoundRobin {
    fn default() -> Self {
        Self::new()
    }
}

/// UE indexes rotated so that position `start` comes first
fn rotated_order(mut indexes: Vec<UeIndex>, start: usize) -> Vec<UeIndex> {
    if !indexes.is_empty() {
        let len = indexes.len();
        indexes.rotate_left(start % len);
    }
    indexes
}

impl SchedulerPolicy for RoundRobin {
    fn dl_sched(&mut self, ctx: &mut UeSchedContext<'_>) {
        let order = rotated_order(ctx.ues.indexes(), self.next_dl);
        self.next_dl = self.next_dl.wrapping_add(1);
        schedule_dl_in_order(ctx, &order);
    }

    fn ul_sched(&mut self, ctx: &mut UeSchedContext<'_>) {
        let order = rotated_order(ctx.ues.indexes(), self.next_ul);
        self.next_ul = self.next_ul.wrapping_add(1);
        schedule_ul_in_order(ctx, &order, |ue| !ue.is_fallback());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation() {
        let ues = vec![UeIndex(0), UeIndex(1), UeIndex(2)];
        assert_eq!(rotated_order(ues.clone(), 0), ues);
        assert_eq!(rotated_order(ues.clone(), 4), vec![UeIndex(1), UeIndex(2), UeIndex(0)]);
        assert!(rotated_order(Vec::new(), 3).is_empty());
    }
}
