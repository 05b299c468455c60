//! HARQ Entities
//!
//! DL and UL HARQ processes of a UE (TS 38.321 §5.3.2, §5.4.2). A process is
//! empty, waiting for feedback, or pending a retransmission. Feedback that never
//! arrives is treated as a NACK once the process times out.

use common::slot_point::SlotPoint;
use common::types::HarqId;
use tracing::{debug, warn};

/// Redundancy version sequence over retransmissions
const RV_SEQUENCE: [u8; 4] = [0, 2, 3, 1];

/// HARQ process state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarqState {
    Empty,
    WaitingAck,
    PendingRetx,
}

/// Transport block parameters kept for retransmissions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportBlockInfo {
    pub mcs: u8,
    pub tbs_bytes: u32,
    pub nof_prbs: u32,
    /// Sent with DCI 1_0/0_0 in a common search space
    pub is_fallback: bool,
}

/// Outcome of HARQ feedback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarqFeedbackOutcome {
    /// Transport block delivered, process released
    Acked { tbs_bytes: u32 },
    /// Retransmission pending
    Nacked,
    /// Maximum number of retransmissions reached, transport block dropped
    Discarded,
}

/// One HARQ process
#[derive(Debug, Clone)]
pub struct HarqProcess {
    id: HarqId,
    state: HarqState,
    ndi: bool,
    nof_retxs: u8,
    max_nof_retxs: u8,
    slot_tx: Option<SlotPoint>,
    slot_ack: Option<SlotPoint>,
    harq_bit_idx: u8,
    tb: TransportBlockInfo,
}

impl HarqProcess {
    fn new(id: HarqId) -> Self {
        Self {
            id,
            state: HarqState::Empty,
            ndi: false,
            nof_retxs: 0,
            max_nof_retxs: 0,
            slot_tx: None,
            slot_ack: None,
            harq_bit_idx: 0,
            tb: TransportBlockInfo::default(),
        }
    }

    pub fn id(&self) -> HarqId {
        self.id
    }

    pub fn state(&self) -> HarqState {
        self.state
    }

    pub fn is_empty(&self) -> bool {
        self.state == HarqState::Empty
    }

    pub fn has_pending_retx(&self) -> bool {
        self.state == HarqState::PendingRetx
    }

    pub fn ndi(&self) -> bool {
        self.ndi
    }

    pub fn nof_retxs(&self) -> u8 {
        self.nof_retxs
    }

    /// Redundancy version of the current transmission
    pub fn rv(&self) -> u8 {
        RV_SEQUENCE[self.nof_retxs as usize % RV_SEQUENCE.len()]
    }

    pub fn tb(&self) -> &TransportBlockInfo {
        &self.tb
    }

    /// Slot of the last transmission
    pub fn slot_tx(&self) -> Option<SlotPoint> {
        self.slot_tx
    }

    /// Slot where the feedback is expected (UCI slot for DL, PUSCH slot for UL)
    pub fn slot_ack(&self) -> Option<SlotPoint> {
        self.slot_ack
    }

    /// Start a new transmission. The process must be empty.
    pub fn new_tx(&mut self, slot_tx: SlotPoint, slot_ack: SlotPoint, tb: TransportBlockInfo, max_nof_retxs: u8) {
        assert!(self.is_empty(), "HARQ {} is busy, cannot start a new transmission", self.id.0);
        self.ndi = !self.ndi;
        self.nof_retxs = 0;
        self.max_nof_retxs = max_nof_retxs;
        self.tb = tb;
        self.arm(slot_tx, slot_ack);
    }

    /// Start a retransmission. The process must be pending one.
    pub fn new_retx(&mut self, slot_tx: SlotPoint, slot_ack: SlotPoint) {
        assert!(
            self.has_pending_retx(),
            "HARQ {} has no pending retransmission",
            self.id.0
        );
        self.nof_retxs += 1;
        self.arm(slot_tx, slot_ack);
    }

    fn arm(&mut self, slot_tx: SlotPoint, slot_ack: SlotPoint) {
        self.state = HarqState::WaitingAck;
        self.slot_tx = Some(slot_tx);
        self.slot_ack = Some(slot_ack);
        self.harq_bit_idx = 0;
    }

    /// Position of the HARQ-ACK bit in the UCI codebook
    pub fn set_harq_bit_idx(&mut self, idx: u8) {
        self.harq_bit_idx = idx;
    }

    fn feedback(&mut self, ack: bool) -> HarqFeedbackOutcome {
        if ack {
            self.state = HarqState::Empty;
            HarqFeedbackOutcome::Acked { tbs_bytes: self.tb.tbs_bytes }
        } else if self.nof_retxs < self.max_nof_retxs {
            self.state = HarqState::PendingRetx;
            HarqFeedbackOutcome::Nacked
        } else {
            self.state = HarqState::Empty;
            HarqFeedbackOutcome::Discarded
        }
    }

    /// Drop the process content
    pub fn reset(&mut self) {
        self.state = HarqState::Empty;
        self.slot_ack = None;
    }
}

/// HARQ processes of one direction
#[derive(Debug, Clone)]
pub struct HarqEntity {
    procs: Vec<HarqProcess>,
    timeout_slots: u32,
}

impl HarqEntity {
    /// Create `nof_procs` empty processes
    pub fn new(nof_procs: u8, timeout_slots: u32) -> Self {
        Self {
            procs: (0..nof_procs).map(|i| HarqProcess::new(HarqId(i))).collect(),
            timeout_slots,
        }
    }

    pub fn get(&self, id: HarqId) -> Option<&HarqProcess> {
        self.procs.get(id.0 as usize)
    }

    pub fn get_mut(&mut self, id: HarqId) -> Option<&mut HarqProcess> {
        self.procs.get_mut(id.0 as usize)
    }

    /// First empty process
    pub fn find_empty(&self) -> Option<HarqId> {
        self.procs.iter().find(|h| h.is_empty()).map(|h| h.id)
    }

    /// Oldest process pending a retransmission
    pub fn find_pending_retx(&self) -> Option<HarqId> {
        self.procs
            .iter()
            .filter(|h| h.has_pending_retx())
            .min_by_key(|h| h.slot_tx.map(|s| s.to_uint()))
            .map(|h| h.id)
    }

    pub fn has_pending_retx(&self) -> bool {
        self.procs.iter().any(|h| h.has_pending_retx())
    }

    /// Processes waiting for feedback
    pub fn nof_waiting_ack(&self) -> usize {
        self.procs.iter().filter(|h| h.state == HarqState::WaitingAck).count()
    }

    /// Feedback for the process expecting it in `slot_ack` at codebook position
    /// `harq_bit_idx`
    pub fn ack_info(&mut self, slot_ack: SlotPoint, harq_bit_idx: u8, ack: bool) -> Option<(HarqId, HarqFeedbackOutcome)> {
        let proc = self.procs.iter_mut().find(|h| {
            h.state == HarqState::WaitingAck && h.slot_ack == Some(slot_ack) && h.harq_bit_idx == harq_bit_idx
        });
        match proc {
            Some(h) => Some((h.id, h.feedback(ack))),
            None => {
                debug!("No HARQ waiting for feedback in slot {} bit {}", slot_ack, harq_bit_idx);
                None
            }
        }
    }

    /// Expire processes whose feedback should have arrived more than the timeout
    /// ago, returning how many were affected
    pub fn slot_indication(&mut self, sl: SlotPoint) -> usize {
        let timeout = self.timeout_slots as i32;
        let mut nof_expired = 0;
        for h in self.procs.iter_mut() {
            let expired = h.state == HarqState::WaitingAck && h.slot_ack.is_some_and(|ack| sl - ack > timeout);
            if expired {
                warn!("HARQ {} feedback timeout, slot_ack={:?}", h.id.0, h.slot_ack);
                h.feedback(false);
                nof_expired += 1;
            }
        }
        nof_expired
    }

    /// Release every process
    pub fn reset(&mut self) {
        self.procs.iter_mut().for_each(HarqProcess::reset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::types::SubcarrierSpacing;

    fn slot(count: u32) -> SlotPoint {
        SlotPoint::from_count(SubcarrierSpacing::Scs15, count)
    }

    fn tb(tbs_bytes: u32) -> TransportBlockInfo {
        TransportBlockInfo {
            mcs: 10,
            tbs_bytes,
            nof_prbs: 10,
            is_fallback: false,
        }
    }

    #[test]
    fn test_ack_releases_process() {
        let mut harqs = HarqEntity::new(8, 16);
        let id = harqs.find_empty().unwrap();
        harqs.get_mut(id).unwrap().new_tx(slot(0), slot(4), tb(100), 4);
        assert!(harqs.get(id).unwrap().ndi());
        assert_eq!(harqs.find_empty(), Some(HarqId(1)));
        assert_eq!(
            harqs.ack_info(slot(4), 0, true),
            Some((id, HarqFeedbackOutcome::Acked { tbs_bytes: 100 }))
        );
        assert!(harqs.get(id).unwrap().is_empty());
    }

    #[test]
    fn test_nack_rv_sequence_and_max_retx() {
        let mut harqs = HarqEntity::new(1, 16);
        let id = HarqId(0);
        harqs.get_mut(id).unwrap().new_tx(slot(0), slot(4), tb(100), 2);
        let mut rvs = vec![harqs.get(id).unwrap().rv()];
        for i in 1..=2 {
            assert_eq!(harqs.ack_info(slot(i * 10 - 6), 0, false).unwrap().1, HarqFeedbackOutcome::Nacked);
            assert_eq!(harqs.find_pending_retx(), Some(id));
            harqs.get_mut(id).unwrap().new_retx(slot(i * 10), slot(i * 10 + 4));
            rvs.push(harqs.get(id).unwrap().rv());
        }
        assert_eq!(rvs, vec![0, 2, 3]);
        assert_eq!(harqs.ack_info(slot(24), 0, false).unwrap().1, HarqFeedbackOutcome::Discarded);
        assert!(harqs.get(id).unwrap().is_empty());
    }

    #[test]
    fn test_ack_matches_codebook_bit() {
        let mut harqs = HarqEntity::new(8, 16);
        harqs.get_mut(HarqId(0)).unwrap().new_tx(slot(0), slot(5), tb(10), 4);
        harqs.get_mut(HarqId(1)).unwrap().new_tx(slot(1), slot(5), tb(20), 4);
        harqs.get_mut(HarqId(1)).unwrap().set_harq_bit_idx(1);
        let (id, outcome) = harqs.ack_info(slot(5), 1, true).unwrap();
        assert_eq!((id, outcome), (HarqId(1), HarqFeedbackOutcome::Acked { tbs_bytes: 20 }));
        assert!(harqs.ack_info(slot(5), 1, true).is_none());
    }

    #[test]
    fn test_feedback_timeout() {
        let mut harqs = HarqEntity::new(2, 4);
        harqs.get_mut(HarqId(0)).unwrap().new_tx(slot(0), slot(4), tb(10), 4);
        assert_eq!(harqs.slot_indication(slot(8)), 0);
        assert_eq!(harqs.slot_indication(slot(9)), 1);
        assert!(harqs.has_pending_retx());
    }

    #[test]
    #[should_panic]
    fn test_new_tx_on_busy_process() {
        let mut harqs = HarqEntity::new(1, 4);
        harqs.get_mut(HarqId(0)).unwrap().new_tx(slot(0), slot(4), tb(10), 4);
        harqs.get_mut(HarqId(0)).unwrap().new_tx(slot(1), slot(5), tb(10), 4);
    }
}
