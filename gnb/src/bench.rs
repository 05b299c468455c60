//! Scheduler Test Bench
//!
//! Drives a [`MacScheduler`] slot by slot for a population of simulated UEs.
//! Each slot offers new DL and UL traffic, schedules the slot, pushes an IQ
//! block through the loopback radio and answers the grants of the slot with
//! HARQ-ACK, CSI and CRC feedback. Throughput is reported once per second of
//! air time.

use crate::config::{BenchConfig, GnbConfig};
use anyhow::Result;
use common::slot_point::{SlotPoint, NOF_SFNS, NOF_SUBFRAMES_PER_FRAME};
use common::types::{CellId, Lcg, Lcid, Rnti, UeIndex};
use interfaces::{
    BasebandFsm, BasebandTransmitter, BufferPool, CountingRadioNotifier, LoopbackGateway, LoopbackReceiver,
    TaskExecutor, TxMetadata,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use scheduler::indications::{
    BsrReport, CrcPdu, DlBufferStateIndication, UciIndication, UciPdu, UeCreationRequest, UlBsrIndication,
    UlCrcIndication,
};
use scheduler::{CellConfiguration, MacScheduler, SchedResult, SchedulerConfigNotifier, UeCellConfiguration};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Logs configuration outcomes and counts the UEs that are ready
#[derive(Default)]
pub struct BenchNotifier {
    configured: AtomicUsize,
}

impl BenchNotifier {
    pub fn nof_configured(&self) -> usize {
        self.configured.load(Ordering::Relaxed)
    }
}

impl SchedulerConfigNotifier for BenchNotifier {
    fn on_ue_config_complete(&self, ue_index: UeIndex, success: bool) {
        if success {
            self.configured.fetch_add(1, Ordering::Relaxed);
            debug!("{} configured", ue_index);
        } else {
            warn!("{} configuration failed", ue_index);
        }
    }

    fn on_ue_delete_response(&self, ue_index: UeIndex) {
        self.configured.fetch_sub(1, Ordering::Relaxed);
        debug!("{} removed", ue_index);
    }
}

/// Per-second counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BenchMetrics {
    pub dl_bytes: u64,
    pub ul_bytes: u64,
    pub dl_newtx: u32,
    pub dl_retx: u32,
    pub ul_newtx: u32,
    pub ul_retx: u32,
    pub harq_acks: u32,
    pub harq_nacks: u32,
    pub crc_ko: u32,
}

struct SimUe {
    ue_index: UeIndex,
    rnti: Rnti,
    /// Fractional DL bytes not yet offered
    dl_credit: f64,
    ul_credit: f64,
    /// UL bytes waiting in the UE
    ul_buffer: u32,
}

/// Indications answering one slot result
#[derive(Debug, Default)]
struct Feedback {
    crcs: Vec<CrcPdu>,
    ucis: Vec<UciPdu>,
    /// UL bytes decoded per RNTI
    ul_delivered: Vec<(Rnti, u32)>,
}

pub struct TestBench {
    cell_id: CellId,
    cell_cfg: CellConfiguration,
    bench: BenchConfig,
    sched: MacScheduler,
    notifier: Arc<BenchNotifier>,
    ues: Vec<SimUe>,
    rng: StdRng,
    slot_count: u64,
    slots_per_second: u64,
    slots_per_sfn_cycle: u64,
    metrics: BenchMetrics,
    radio: LoopbackRadio,
}

struct LoopbackRadio {
    pool: BufferPool,
    gateway: LoopbackGateway,
    receiver: LoopbackReceiver,
    notifier: Arc<CountingRadioNotifier>,
    samples_per_slot: u64,
}

impl LoopbackRadio {
    fn new(config: &GnbConfig) -> Result<Self> {
        let radio = &config.radio;
        let pool = BufferPool::new(radio.nof_buffers, radio.samples_per_slot)?;
        let notifier = Arc::new(CountingRadioNotifier::new());
        let (gateway, receiver) = LoopbackGateway::new(radio.samples_per_slot, radio.nof_buffers, notifier.clone())?;
        Ok(Self {
            pool,
            gateway,
            receiver,
            notifier,
            samples_per_slot: radio.samples_per_slot as u64,
        })
    }

    /// Send the block of `slot_count` and let one slot of air time pass
    fn tick(&mut self, slot_count: u64) -> Result<()> {
        // Whatever went on air last slot has been consumed.
        while self.receiver.try_recv().is_some() {}
        match self.pool.try_acquire() {
            Some(buffer) => {
                let md = TxMetadata {
                    timestamp: slot_count * self.samples_per_slot,
                    channel: 0,
                };
                self.gateway.transmit(md, buffer)?;
            }
            None => warn!("No baseband buffer for slot {}", slot_count),
        }
        self.gateway.advance(self.samples_per_slot);
        Ok(())
    }
}

impl TestBench {
    pub fn new(config: &GnbConfig) -> Result<Self> {
        let cell_cfg = config.cell_configuration()?;
        let notifier = Arc::new(BenchNotifier::default());
        let mut sched = MacScheduler::new(notifier.clone());
        sched.add_cell(cell_cfg.clone())?;

        let cell_id = cell_cfg.cell_id;
        let mut ues = Vec::with_capacity(config.bench.nof_ues as usize);
        for idx in 0..config.bench.nof_ues {
            let ue_index = UeIndex(idx);
            let rnti = Rnti(Rnti::MIN_CRNTI.0 + idx);
            sched.handle_ue_creation_request(
                cell_id,
                UeCreationRequest {
                    ue_index,
                    crnti: rnti,
                    cfg: UeCellConfiguration::default_for(&cell_cfg, ue_index),
                },
            )?;
            ues.push(SimUe {
                ue_index,
                rnti,
                dl_credit: 0.0,
                ul_credit: 0.0,
                ul_buffer: 0,
            });
        }

        let slots_per_subframe = cell_cfg.scs_common.slots_per_subframe() as u64;
        let slots_per_second = slots_per_subframe * 1000;
        Ok(Self {
            cell_id,
            cell_cfg,
            bench: config.bench.clone(),
            sched,
            notifier,
            ues,
            rng: StdRng::seed_from_u64(config.bench.seed),
            slot_count: 0,
            slots_per_second,
            slots_per_sfn_cycle: NOF_SFNS as u64 * NOF_SUBFRAMES_PER_FRAME as u64 * slots_per_subframe,
            metrics: BenchMetrics::default(),
            radio: LoopbackRadio::new(config)?,
        })
    }

    pub fn slots_per_second(&self) -> u64 {
        self.slots_per_second
    }

    pub fn slot_count(&self) -> u64 {
        self.slot_count
    }

    pub fn nof_configured_ues(&self) -> usize {
        self.notifier.nof_configured()
    }

    /// Schedule one slot and close its feedback loop
    pub fn run_slot(&mut self) -> Result<()> {
        self.offer_traffic()?;

        let sl = SlotPoint::from_count(self.cell_cfg.scs_common, (self.slot_count % self.slots_per_sfn_cycle) as u32);
        let result = self.sched.slot_indication(sl, self.cell_id)?;
        let feedback = build_feedback(result, &mut self.rng, &self.bench, &mut self.metrics);
        self.apply_feedback(sl, feedback)?;

        self.radio.tick(self.slot_count)?;
        self.slot_count += 1;
        Ok(())
    }

    /// Counters since the last call
    pub fn take_metrics(&mut self) -> BenchMetrics {
        std::mem::take(&mut self.metrics)
    }

    pub fn radio_stats(&self) -> interfaces::RadioStats {
        self.radio.notifier.stats()
    }

    fn offer_traffic(&mut self) -> Result<()> {
        let bytes_per_slot = |mbps: f64| mbps * 1e6 / 8.0 / self.slots_per_second as f64;
        let dl_avg = bytes_per_slot(self.bench.dl_rate_mbps);
        let ul_avg = bytes_per_slot(self.bench.ul_rate_mbps);

        for ue in &mut self.ues {
            ue.dl_credit += dl_avg * self.rng.gen_range(0.0..2.0);
            let dl_bytes = ue.dl_credit.floor();
            if dl_bytes >= 1.0 {
                ue.dl_credit -= dl_bytes;
                let pending = self
                    .sched
                    .cell(self.cell_id)
                    .and_then(|c| c.ues().get(ue.ue_index))
                    .map(|u| u.dl_lc.pending_bytes_of(Lcid::MIN_DRB))
                    .unwrap_or(0);
                self.sched.handle_dl_buffer_state_indication(DlBufferStateIndication {
                    ue_index: ue.ue_index,
                    lcid: Lcid::MIN_DRB,
                    pending_bytes: pending.saturating_add(dl_bytes as u32),
                })?;
            }

            ue.ul_credit += ul_avg * self.rng.gen_range(0.0..2.0);
            let ul_bytes = ue.ul_credit.floor();
            if ul_bytes >= 1.0 {
                ue.ul_credit -= ul_bytes;
                ue.ul_buffer = ue.ul_buffer.saturating_add(ul_bytes as u32);
                self.sched.handle_ul_bsr_indication(UlBsrIndication {
                    ue_index: ue.ue_index,
                    reports: vec![BsrReport { lcg: Lcg(1), nof_bytes: ue.ul_buffer }],
                })?;
            }
        }
        Ok(())
    }

    fn apply_feedback(&mut self, slot_rx: SlotPoint, feedback: Feedback) -> Result<()> {
        for (rnti, nof_bytes) in &feedback.ul_delivered {
            if let Some(ue) = self.ues.iter_mut().find(|u| u.rnti == *rnti) {
                ue.ul_buffer = ue.ul_buffer.saturating_sub(*nof_bytes);
            }
        }
        if !feedback.crcs.is_empty() {
            self.sched.handle_crc_indication(&UlCrcIndication {
                cell_id: self.cell_id,
                slot_rx,
                crcs: feedback.crcs,
            })?;
        }
        if !feedback.ucis.is_empty() {
            self.sched.handle_uci_indication(&UciIndication {
                cell_id: self.cell_id,
                slot_rx,
                ucis: feedback.ucis,
            })?;
        }
        Ok(())
    }
}

/// HARQ-ACK, CSI and CRC feedback for a slot result, with random NACKs
fn build_feedback(result: &SchedResult, rng: &mut StdRng, bench: &BenchConfig, metrics: &mut BenchMetrics) -> Feedback {
    for grant in &result.dl.ue_grants {
        if grant.pdsch.is_new_data {
            metrics.dl_newtx += 1;
            metrics.dl_bytes += grant.lc_grants.iter().map(|lc| lc.nof_bytes as u64).sum::<u64>();
        } else {
            metrics.dl_retx += 1;
        }
    }

    let mut ucis: BTreeMap<Rnti, UciPdu> = BTreeMap::new();
    let mut harq_bits: BTreeMap<Rnti, u32> = BTreeMap::new();
    for pucch in &result.ul.pucchs {
        let bits = harq_bits.entry(pucch.rnti).or_default();
        *bits = (*bits).max(pucch.uci_bits.harq_ack_nof_bits);
        let uci = ucis.entry(pucch.rnti).or_insert_with(|| UciPdu { rnti: pucch.rnti, ..Default::default() });
        if pucch.uci_bits.csi_part1_nof_bits > 0 {
            uci.cqi = Some(bench.cqi);
        }
    }

    let mut crcs = Vec::with_capacity(result.ul.puschs.len());
    let mut ul_delivered = Vec::new();
    for grant in &result.ul.puschs {
        let pusch = &grant.pusch;
        if let Some(on_pusch) = pusch.uci {
            *harq_bits.entry(pusch.rnti).or_default() += on_pusch.harq_ack_nof_bits;
            if on_pusch.csi_part1_nof_bits > 0 {
                ucis.entry(pusch.rnti)
                    .or_insert_with(|| UciPdu { rnti: pusch.rnti, ..Default::default() })
                    .cqi = Some(bench.cqi);
            }
        }
        if pusch.is_new_data {
            metrics.ul_newtx += 1;
        } else {
            metrics.ul_retx += 1;
        }
        let tb_crc_ok = rng.gen_bool(bench.ack_probability);
        if tb_crc_ok {
            metrics.ul_bytes += pusch.tbs_bytes as u64;
            ul_delivered.push((pusch.rnti, pusch.tbs_bytes));
        } else {
            metrics.crc_ko += 1;
        }
        crcs.push(CrcPdu {
            rnti: pusch.rnti,
            harq_id: pusch.harq_id,
            tb_crc_ok,
        });
    }

    for (rnti, bits) in harq_bits {
        let uci = ucis.entry(rnti).or_insert_with(|| UciPdu { rnti, ..Default::default() });
        uci.harq_acks = (0..bits).map(|_| rng.gen_bool(bench.ack_probability)).collect();
        let acks = uci.harq_acks.iter().filter(|a| **a).count() as u32;
        metrics.harq_acks += acks;
        metrics.harq_nacks += bits - acks;
    }
    let ucis = ucis
        .into_values()
        .filter(|u| !u.harq_acks.is_empty() || u.cqi.is_some())
        .collect();

    Feedback { crcs, ucis, ul_delivered }
}

/// Run the bench until the configured duration elapses or `stop` fires
pub async fn run(
    config: &GnbConfig,
    fsm: &BasebandFsm,
    executor: &dyn TaskExecutor,
    mut stop: oneshot::Receiver<()>,
) -> Result<BenchMetrics> {
    let mut bench = TestBench::new(config)?;
    let total_slots = config.bench.duration_s as u64 * bench.slots_per_second();
    let slot_duration = Duration::from_micros(1_000_000 / bench.slots_per_second());
    let mut interval = tokio::time::interval(slot_duration);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    info!(
        "Test bench: {} UEs, {} s, DL {} Mbps/UE, UL {} Mbps/UE, policy {:?}",
        config.bench.nof_ues,
        config.bench.duration_s,
        config.bench.dl_rate_mbps,
        config.bench.ul_rate_mbps,
        config.cell_cfg.expert.policy
    );

    let mut totals = BenchMetrics::default();
    fsm.start();
    loop {
        let stop_requested = stop.try_recv().is_ok() || bench.slot_count() >= total_slots;
        if stop_requested && fsm.is_running() {
            fsm.request_stop();
        }
        if fsm.acknowledge_stop() {
            break;
        }

        bench.run_slot()?;

        if bench.slot_count() % bench.slots_per_second() == 0 {
            let second = bench.slot_count() / bench.slots_per_second();
            let metrics = bench.take_metrics();
            accumulate(&mut totals, &metrics);
            let ues = bench.nof_configured_ues();
            let radio = bench.radio_stats();
            executor.execute(Box::new(move || log_second(second, ues, &metrics, radio)))?;
            if !config.bench.realtime {
                tokio::task::yield_now().await;
            }
        }
        if config.bench.realtime {
            interval.tick().await;
        }
    }
    let rest = bench.take_metrics();
    accumulate(&mut totals, &rest);
    Ok(totals)
}

fn accumulate(totals: &mut BenchMetrics, m: &BenchMetrics) {
    totals.dl_bytes += m.dl_bytes;
    totals.ul_bytes += m.ul_bytes;
    totals.dl_newtx += m.dl_newtx;
    totals.dl_retx += m.dl_retx;
    totals.ul_newtx += m.ul_newtx;
    totals.ul_retx += m.ul_retx;
    totals.harq_acks += m.harq_acks;
    totals.harq_nacks += m.harq_nacks;
    totals.crc_ko += m.crc_ko;
}

fn log_second(second: u64, nof_ues: usize, m: &BenchMetrics, radio: interfaces::RadioStats) {
    info!(
        "t={}s ues={} DL {:.2} Mbps ({} newtx, {} retx, {} ack, {} nack) UL {:.2} Mbps ({} newtx, {} retx, {} crc ko) radio late={} underflow={}",
        second,
        nof_ues,
        m.dl_bytes as f64 * 8.0 / 1e6,
        m.dl_newtx,
        m.dl_retx,
        m.harq_acks,
        m.harq_nacks,
        m.ul_bytes as f64 * 8.0 / 1e6,
        m.ul_newtx,
        m.ul_retx,
        m.crc_ko,
        radio.tx_late,
        radio.tx_underflow
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> GnbConfig {
        let mut config = GnbConfig::default();
        config.bench.nof_ues = 3;
        config.bench.ack_probability = 1.0;
        config.bench.dl_rate_mbps = 1.0;
        config.bench.ul_rate_mbps = 0.2;
        config
    }

    #[test]
    fn test_bench_moves_traffic() {
        let mut bench = TestBench::new(&small_config()).unwrap();
        for _ in 0..bench.slots_per_second() {
            bench.run_slot().unwrap();
        }
        assert_eq!(bench.nof_configured_ues(), 3);
        let m = bench.take_metrics();
        assert!(m.dl_bytes > 0);
        assert!(m.ul_bytes > 0);
        assert_eq!(m.harq_nacks, 0);
        assert_eq!(m.crc_ko, 0);
        assert_eq!(bench.radio_stats().tx_late, 0);
        assert_eq!(bench.take_metrics(), BenchMetrics::default());
    }

    #[test]
    fn test_nacks_cause_retransmissions() {
        let mut config = small_config();
        config.bench.ack_probability = 0.5;
        let mut bench = TestBench::new(&config).unwrap();
        for _ in 0..bench.slots_per_second() {
            bench.run_slot().unwrap();
        }
        let m = bench.take_metrics();
        assert!(m.harq_nacks > 0);
        assert!(m.dl_retx > 0);
    }
}
