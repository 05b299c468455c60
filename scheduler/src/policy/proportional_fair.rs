//! Proportional Fair Policy
//!
//! UEs are ranked by the ratio between their achievable rate and the rate they
//! were served on average, raised to the fairness coefficient. The metric is
//! weighted by the priority of the most urgent logical channel with data.

use super::{schedule_dl_in_order, schedule_ul_in_order, SchedulerPolicy, UeSchedContext};
use crate::config::ue_config::MAX_LC_PRIORITY;
use crate::config::SchedulerExpertConfig;
use crate::support::mcs_tbs::mcs_description;
use crate::ue_context::Ue;
use common::types::UeIndex;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Number of slots the served-rate average spans
const AVERAGE_WINDOW_SLOTS: f64 = 100.0;

/// Served-rate floor, so new UEs do not divide by zero
const MIN_AVERAGE_RATE: f64 = 1.0;

#[derive(Debug, Clone, Copy, Default)]
struct PfUeState {
    avg_dl_bytes: f64,
    avg_ul_bytes: f64,
}

pub struct ProportionalFair {
    fairness_coeff: f64,
    ues: BTreeMap<UeIndex, PfUeState>,
}

impl ProportionalFair {
    pub fn new(fairness_coeff: f64) -> Self {
        Self {
            fairness_coeff,
            ues: BTreeMap::new(),
        }
    }

    fn metric(&self, rate: f64, avg: f64, lc_priority: Option<u8>) -> f64 {
        let weight = lc_priority.map_or(1.0, |p| f64::from(MAX_LC_PRIORITY + 1 - p.min(MAX_LC_PRIORITY)));
        weight * rate / avg.max(MIN_AVERAGE_RATE).powf(self.fairness_coeff)
    }

    /// UEs sorted by decreasing metric, ties broken by UE index
    fn order(&self, ues: &[&Ue], metric: impl Fn(&Ue, &PfUeState) -> f64) -> Vec<UeIndex> {
        let mut ranked: Vec<(UeIndex, f64)> = ues
            .iter()
            .map(|ue| {
                let state = self.ues.get(&ue.ue_index()).copied().unwrap_or_default();
                (ue.ue_index(), metric(ue, &state))
            })
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal).then(a.0.cmp(&b.0)));
        ranked.into_iter().map(|(idx, _)| idx).collect()
    }

    fn update_averages(&mut self, served: &[(UeIndex, u32)], dl: bool) {
        for (ue_index, state) in self.ues.iter_mut() {
            let bytes = served.iter().find(|(idx, _)| idx == ue_index).map_or(0, |(_, b)| *b) as f64;
            let avg = if dl { &mut state.avg_dl_bytes } else { &mut state.avg_ul_bytes };
            *avg += (bytes - *avg) / AVERAGE_WINDOW_SLOTS;
        }
    }
}

/// Spectral efficiency achievable at the UE MCS
fn instantaneous_rate(mcs: u8) -> f64 {
    mcs_description(mcs).map_or(0.0, |d| f64::from(d.modulation_order) * f64::from(d.code_rate))
}

fn dl_rate(ue: &Ue, expert: &SchedulerExpertConfig) -> f64 {
    instantaneous_rate(ue.dl_mcs(expert))
}

fn ul_rate(ue: &Ue, expert: &SchedulerExpertConfig) -> f64 {
    instantaneous_rate(ue.ul_mcs(expert))
}

impl SchedulerPolicy for ProportionalFair {
    fn add_ue(&mut self, ue_index: UeIndex) {
        self.ues.insert(ue_index, PfUeState::default());
    }

    fn rem_ue(&mut self, ue_index: UeIndex) {
        self.ues.remove(&ue_index);
    }

    fn dl_sched(&mut self, ctx: &mut UeSchedContext<'_>) {
        let expert = ctx.res.cfg.expert.clone();
        let candidates: Vec<&Ue> = ctx.ues.iter().filter(|ue| !ue.is_fallback() && ue.has_dl_work()).collect();
        let order = self.order(&candidates, |ue, state| {
            self.metric(dl_rate(ue, &expert), state.avg_dl_bytes, ue.dl_lc.highest_priority_with_data())
        });
        let served = schedule_dl_in_order(ctx, &order);
        self.update_averages(&served, true);
    }

    fn ul_sched(&mut self, ctx: &mut UeSchedContext<'_>) {
        let expert = ctx.res.cfg.expert.clone();
        let candidates: Vec<&Ue> = ctx
            .ues
            .iter()
            .filter(|ue| !ue.is_fallback() && ue.has_ul_work(expert.sr_grant_bytes))
            .collect();
        let order = self.order(&candidates, |ue, state| {
            self.metric(ul_rate(ue, &expert), state.avg_ul_bytes, ue.ul_lc.highest_priority_with_data())
        });
        let served = schedule_ul_in_order(ctx, &order, |ue| !ue.is_fallback());
        self.update_averages(&served, false);
    }
}
