//! Logical Channel Buffer State
//!
//! DL pending bytes per logical channel and UL buffer status per logical channel
//! group. DL grants are split into MAC subPDUs by logical channel priority,
//! counting the MAC subheader of every SDU (TS 38.321 §6.1.2).

use crate::config::ue_config::MAX_LC_PRIORITY;
use crate::config::LogicalChannelConfig;
use crate::result::LcGrant;
use common::types::{Lcg, Lcid};
use tracing::trace;

/// UE Contention Resolution Identity CE with its subheader
pub const CONRES_CE_SIZE: u32 = 7;

/// MAC subheader size for an SDU of `sdu_bytes`
pub fn mac_subheader_size(sdu_bytes: u32) -> u32 {
    if sdu_bytes < 256 {
        2
    } else {
        3
    }
}

/// Bytes needed to send `sdu_bytes` of one logical channel, subheader included
pub fn mac_sdu_required_bytes(sdu_bytes: u32) -> u32 {
    if sdu_bytes == 0 {
        0
    } else {
        sdu_bytes + mac_subheader_size(sdu_bytes)
    }
}

/// Largest SDU fitting in `space` bytes together with its subheader
fn max_sdu_in(space: u32) -> u32 {
    match space {
        0..=2 => 0,
        3..=257 => space - 2,
        _ => space - 3,
    }
}

#[derive(Debug, Clone)]
struct DlChannel {
    cfg: LogicalChannelConfig,
    pending_bytes: u32,
}

/// MAC PDU composition for a DL grant
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DlPduAllocation {
    pub lc_grants: Vec<LcGrant>,
    pub conres_ce: bool,
    /// Bytes used, subheaders included
    pub nof_bytes: u32,
}

/// DL logical channels of a UE
#[derive(Debug, Clone, Default)]
pub struct DlLogicalChannelManager {
    channels: Vec<DlChannel>,
    pending_conres_ce: bool,
}

impl DlLogicalChannelManager {
    /// Create the manager from the configured logical channels
    pub fn new(channels: &[LogicalChannelConfig]) -> Self {
        let mut mgr = Self::default();
        mgr.configure(channels);
        mgr
    }

    /// Apply a new logical channel configuration, keeping the pending bytes of
    /// channels that remain
    pub fn configure(&mut self, channels: &[LogicalChannelConfig]) {
        let mut new_channels: Vec<DlChannel> = channels
            .iter()
            .map(|cfg| DlChannel {
                pending_bytes: self.pending_bytes_of(cfg.lcid),
                cfg: cfg.clone(),
            })
            .collect();
        // Stable sort keeps the configuration order among equal priorities.
        new_channels.sort_by_key(|c| c.cfg.priority);
        self.channels = new_channels;
    }

    /// Update the RLC buffer occupancy of a channel
    pub fn handle_dl_buffer_status(&mut self, lcid: Lcid, pending_bytes: u32) {
        match self.channels.iter_mut().find(|c| c.cfg.lcid == lcid) {
            Some(c) => c.pending_bytes = pending_bytes,
            None => trace!("DL buffer status for unconfigured {:?} ignored", lcid),
        }
    }

    /// Queue a UE Contention Resolution Identity CE
    pub fn handle_conres_ce(&mut self) {
        self.pending_conres_ce = true;
    }

    pub fn is_conres_ce_pending(&self) -> bool {
        self.pending_conres_ce
    }

    /// SDU bytes pending on a channel
    pub fn pending_bytes_of(&self, lcid: Lcid) -> u32 {
        self.channels
            .iter()
            .find(|c| c.cfg.lcid == lcid)
            .map_or(0, |c| c.pending_bytes)
    }

    /// Bytes needed to send every pending SDU and CE, subheaders included
    pub fn pending_bytes(&self) -> u32 {
        self.pending_bytes_filtered(|_| true)
    }

    /// Bytes needed for SRB0 and the ConRes CE
    pub fn pending_srb0_bytes(&self) -> u32 {
        self.pending_bytes_filtered(|lcid| lcid == Lcid::SRB0)
    }

    /// Bytes needed for the channels usable before RRC reconfiguration (SRB1)
    /// and the ConRes CE
    pub fn pending_srb1_bytes(&self) -> u32 {
        self.pending_bytes_filtered(|lcid| lcid == Lcid::SRB1)
    }

    fn pending_bytes_filtered(&self, pred: impl Fn(Lcid) -> bool) -> u32 {
        let ce = if self.pending_conres_ce { CONRES_CE_SIZE } else { 0 };
        ce + self
            .channels
            .iter()
            .filter(|c| pred(c.cfg.lcid))
            .map(|c| mac_sdu_required_bytes(c.pending_bytes))
            .sum::<u32>()
    }

    pub fn has_pending_bytes(&self) -> bool {
        self.pending_bytes() > 0
    }

    /// Priority of the highest priority channel with data
    pub fn highest_priority_with_data(&self) -> Option<u8> {
        self.channels
            .iter()
            .filter(|c| c.pending_bytes > 0)
            .map(|c| c.cfg.priority)
            .min()
            .or(self.pending_conres_ce.then_some(1))
    }

    /// Fill a transport block of `tbs_bytes`, restricted to the channels accepted
    /// by `filter`. The ConRes CE goes first. SRB0 SDUs are never segmented.
    pub fn allocate(&mut self, tbs_bytes: u32, filter: impl Fn(Lcid) -> bool) -> DlPduAllocation {
        let mut alloc = DlPduAllocation::default();
        let mut space = tbs_bytes;
        if self.pending_conres_ce && space >= CONRES_CE_SIZE {
            self.pending_conres_ce = false;
            alloc.conres_ce = true;
            space -= CONRES_CE_SIZE;
        }
        for ch in self.channels.iter_mut().filter(|c| filter(c.cfg.lcid)) {
            if ch.pending_bytes == 0 {
                continue;
            }
            let sdu = if ch.cfg.lcid == Lcid::SRB0 {
                if mac_sdu_required_bytes(ch.pending_bytes) > space {
                    continue;
                }
                ch.pending_bytes
            } else {
                max_sdu_in(space).min(ch.pending_bytes)
            };
            if sdu == 0 {
                break;
            }
            ch.pending_bytes -= sdu;
            space -= mac_sdu_required_bytes(sdu);
            alloc.lc_grants.push(LcGrant {
                lcid: ch.cfg.lcid,
                nof_bytes: sdu,
            });
        }
        alloc.nof_bytes = tbs_bytes - space;
        alloc
    }
}

/// UL buffer status of a UE
#[derive(Debug, Clone)]
pub struct UlLogicalChannelManager {
    lcg_bytes: [u32; Lcg::MAX_NOF_LCGS],
    /// Priority of each group, from its best logical channel
    lcg_priority: [u8; Lcg::MAX_NOF_LCGS],
    sr_pending: bool,
}

impl UlLogicalChannelManager {
    pub fn new(channels: &[LogicalChannelConfig]) -> Self {
        let mut mgr = Self {
            lcg_bytes: [0; Lcg::MAX_NOF_LCGS],
            lcg_priority: [MAX_LC_PRIORITY; Lcg::MAX_NOF_LCGS],
            sr_pending: false,
        };
        mgr.configure(channels);
        mgr
    }

    pub fn configure(&mut self, channels: &[LogicalChannelConfig]) {
        self.lcg_priority = [MAX_LC_PRIORITY; Lcg::MAX_NOF_LCGS];
        for ch in channels {
            if let Some(p) = self.lcg_priority.get_mut(ch.lcg.0 as usize) {
                *p = (*p).min(ch.priority);
            }
        }
    }

    /// Buffer status report for one group
    pub fn handle_bsr(&mut self, lcg: Lcg, nof_bytes: u32) {
        if let Some(b) = self.lcg_bytes.get_mut(lcg.0 as usize) {
            *b = nof_bytes;
        }
        self.sr_pending = false;
    }

    pub fn handle_sr(&mut self) {
        self.sr_pending = true;
    }

    pub fn is_sr_pending(&self) -> bool {
        self.sr_pending
    }

    /// Bytes reported by BSR, or `sr_grant_bytes` when only an SR is pending
    pub fn pending_bytes(&self, sr_grant_bytes: u32) -> u32 {
        let bsr: u32 = self.lcg_bytes.iter().sum();
        if bsr == 0 && self.sr_pending {
            sr_grant_bytes
        } else {
            bsr
        }
    }

    pub fn highest_priority_with_data(&self) -> Option<u8> {
        let bsr_prio = self
            .lcg_bytes
            .iter()
            .zip(self.lcg_priority.iter())
            .filter(|(bytes, _)| **bytes > 0)
            .map(|(_, p)| *p)
            .min();
        bsr_prio.or(self.sr_pending.then_some(1))
    }

    /// Account for a UL grant of `tbs_bytes`, draining groups by priority
    pub fn handle_ul_grant(&mut self, tbs_bytes: u32) {
        self.sr_pending = false;
        let mut order: Vec<usize> = (0..Lcg::MAX_NOF_LCGS).collect();
        order.sort_by_key(|&i| self.lcg_priority[i]);
        let mut space = tbs_bytes;
        for i in order {
            let used = self.lcg_bytes[i].min(space);
            self.lcg_bytes[i] -= used;
            space -= used;
            if space == 0 {
                break;
            }
        }
    }
}
