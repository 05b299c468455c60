//! PUCCH UCI Multiplexing
//!
//! Maps the UCI a UE must report in a slot onto its dedicated PUCCH resources
//! (TS 38.213 §9.2.5):
//!
//! - HARQ-ACK alone uses resource set 0 while it fits in two bits, then set 1.
//! - HARQ-ACK with SR on format 0 shares one resource. On format 1 the UE
//!   selects the SR resource for a positive SR, so both resources are granted and
//!   the SR resource also carries the HARQ-ACK bits.
//! - HARQ-ACK with CSI uses set 1 and carries SR if present.
//! - SR with CSI uses the CSI resource.
//!
//! Formats 2/3 use the smallest number of PRBs fitting the payload and its CRC.

use crate::config::pucch_config::{find_pucch_resource, MAX_HARQ_BITS_PUCCH_F0_F1};
use crate::config::{PucchFormat, PucchResource, UeCellConfiguration};
use crate::result::{PucchInformation, PucchResources, PucchUciBits};
use common::types::Rnti;

/// UCI of a UE pending on dedicated PUCCH resources in one slot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DedicatedUci {
    pub harq_ack_nof_bits: u32,
    pub sr: bool,
    pub csi_part1_nof_bits: u32,
}

impl DedicatedUci {
    /// Whether nothing is pending
    pub fn is_empty(&self) -> bool {
        self.harq_ack_nof_bits == 0 && !self.sr && self.csi_part1_nof_bits == 0
    }

    fn sr_bits(&self) -> u32 {
        self.sr as u32
    }
}

/// A dedicated PUCCH resource and the UCI it carries
#[derive(Debug, Clone, PartialEq)]
pub struct DedicatedGrant {
    pub resource: PucchResource,
    pub nof_prbs: u32,
    pub uci_bits: PucchUciBits,
}

impl DedicatedGrant {
    fn new(resource: &PucchResource, nof_prbs: u32, uci_bits: PucchUciBits) -> Self {
        Self {
            resource: resource.clone(),
            nof_prbs,
            uci_bits,
        }
    }

    /// PUCCH PDU of the grant
    pub fn to_pdu(&self, rnti: Rnti) -> PucchInformation {
        PucchInformation {
            rnti,
            format: self.resource.format,
            resources: PucchResources {
                prbs: self.resource.prbs(self.nof_prbs),
                second_hop_prbs: self.resource.second_hop_prbs(self.nof_prbs),
                symbols: self.resource.symbols,
                initial_cyclic_shift: self.resource.initial_cyclic_shift,
                time_domain_occ: self.resource.time_domain_occ,
            },
            uci_bits: self.uci_bits,
            is_common: false,
        }
    }
}

/// Resource set a HARQ-ACK payload is reported on
pub fn harq_ack_uses_set1(uci: &DedicatedUci) -> bool {
    uci.csi_part1_nof_bits > 0 || uci.harq_ack_nof_bits > MAX_HARQ_BITS_PUCCH_F0_F1
}

/// Dedicated grants reporting `uci`, with `pri` selecting the HARQ-ACK resource.
///
/// Returns `None` when the configuration has no resource able to carry the
/// payload, and an empty list when nothing is pending.
pub fn multiplex(
    pool: &[PucchResource],
    ue_cfg: &UeCellConfiguration,
    uci: &DedicatedUci,
    pri: Option<u8>,
) -> Option<Vec<DedicatedGrant>> {
    if uci.is_empty() {
        return Some(Vec::new());
    }
    let pucch_cfg = ue_cfg.pucch.as_ref()?;
    let rate = pucch_cfg.max_code_rate;

    if uci.harq_ack_nof_bits == 0 {
        if uci.csi_part1_nof_bits > 0 {
            let csi_cfg = ue_cfg.csi_report.as_ref()?;
            let res = find_pucch_resource(pool, csi_cfg.pucch_res_id)?;
            let bits = PucchUciBits {
                harq_ack_nof_bits: 0,
                sr_nof_bits: uci.sr_bits(),
                csi_part1_nof_bits: uci.csi_part1_nof_bits,
            };
            let nof_prbs = res.required_nof_prbs(bits.total(), rate)?;
            return Some(vec![DedicatedGrant::new(res, nof_prbs, bits)]);
        }
        let sr_cfg = ue_cfg.sr.as_ref()?;
        let res = find_pucch_resource(pool, sr_cfg.pucch_res_id)?;
        let bits = PucchUciBits { sr_nof_bits: 1, ..Default::default() };
        return Some(vec![DedicatedGrant::new(res, 1, bits)]);
    }

    let pri = pri? as usize;
    if harq_ack_uses_set1(uci) {
        if uci.csi_part1_nof_bits > 0 && !pucch_cfg.simultaneous_harq_ack_csi {
            return None;
        }
        let res = find_pucch_resource(pool, *pucch_cfg.res_set1.get(pri)?)?;
        let bits = PucchUciBits {
            harq_ack_nof_bits: uci.harq_ack_nof_bits,
            sr_nof_bits: uci.sr_bits(),
            csi_part1_nof_bits: uci.csi_part1_nof_bits,
        };
        let nof_prbs = res.required_nof_prbs(bits.total(), rate)?;
        return Some(vec![DedicatedGrant::new(res, nof_prbs, bits)]);
    }

    let harq_res = find_pucch_resource(pool, *pucch_cfg.res_set0.get(pri)?)?;
    let harq_bits = PucchUciBits {
        harq_ack_nof_bits: uci.harq_ack_nof_bits,
        ..Default::default()
    };
    if !uci.sr {
        return Some(vec![DedicatedGrant::new(harq_res, 1, harq_bits)]);
    }
    let with_sr = PucchUciBits { sr_nof_bits: 1, ..harq_bits };
    match harq_res.format {
        PucchFormat::F0 => Some(vec![DedicatedGrant::new(harq_res, 1, with_sr)]),
        _ => {
            let sr_res = find_pucch_resource(pool, ue_cfg.sr.as_ref()?.pucch_res_id)?;
            Some(vec![
                DedicatedGrant::new(harq_res, 1, harq_bits),
                DedicatedGrant::new(sr_res, 1, with_sr),
            ])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::pucch_config::default_pool::*;
    use crate::config::CellConfiguration;
    use common::types::UeIndex;

    fn setup() -> (CellConfiguration, UeCellConfiguration) {
        let cell = CellConfiguration::default();
        let ue = UeCellConfiguration::default_for(&cell, UeIndex(1));
        (cell, ue)
    }

    fn uci(harq: u32, sr: bool, csi: u32) -> DedicatedUci {
        DedicatedUci {
            harq_ack_nof_bits: harq,
            sr,
            csi_part1_nof_bits: csi,
        }
    }

    #[test]
    fn test_harq_only_uses_set0_then_set1() {
        let (cell, ue) = setup();
        let grants = multiplex(&cell.pucch_resources, &ue, &uci(2, false, 0), Some(3)).unwrap();
        assert_eq!(grants.len(), 1);
        assert_eq!(grants[0].resource.res_id, RES_SET0_FIRST_ID + 3);
        assert_eq!(grants[0].uci_bits.harq_ack_nof_bits, 2);

        let grants = multiplex(&cell.pucch_resources, &ue, &uci(3, false, 0), Some(3)).unwrap();
        assert_eq!(grants[0].resource.res_id, RES_SET1_FIRST_ID + 3);
        assert_eq!(grants[0].resource.format, PucchFormat::F2);
    }

    #[test]
    fn test_harq_without_pri_fails() {
        let (cell, ue) = setup();
        assert!(multiplex(&cell.pucch_resources, &ue, &uci(1, false, 0), None).is_none());
        assert!(multiplex(&cell.pucch_resources, &ue, &uci(1, false, 0), Some(8)).is_none());
    }

    #[test]
    fn test_f1_harq_and_sr_keep_two_grants() {
        let (cell, ue) = setup();
        let grants = multiplex(&cell.pucch_resources, &ue, &uci(1, true, 0), Some(0)).unwrap();
        assert_eq!(grants.len(), 2);
        assert_eq!(grants[0].uci_bits, PucchUciBits { harq_ack_nof_bits: 1, sr_nof_bits: 0, csi_part1_nof_bits: 0 });
        assert_eq!(grants[1].resource.res_id, ue.sr.as_ref().unwrap().pucch_res_id);
        assert_eq!(grants[1].uci_bits, PucchUciBits { harq_ack_nof_bits: 1, sr_nof_bits: 1, csi_part1_nof_bits: 0 });
    }

    #[test]
    fn test_harq_and_csi_go_to_set1() {
        let (cell, ue) = setup();
        let grants = multiplex(&cell.pucch_resources, &ue, &uci(1, true, 4), Some(1)).unwrap();
        assert_eq!(grants.len(), 1);
        assert_eq!(grants[0].resource.res_id, RES_SET1_FIRST_ID + 1);
        assert_eq!(grants[0].uci_bits.total(), 6);
        assert_eq!(grants[0].nof_prbs, 1);

        // 16 bits need a 6 bit CRC: 22 bits fit in two PRBs only.
        let grants = multiplex(&cell.pucch_resources, &ue, &uci(8, false, 8), Some(1)).unwrap();
        assert_eq!(grants[0].nof_prbs, 2);
    }

    #[test]
    fn test_harq_and_csi_rejected_without_simultaneous_reporting() {
        let (cell, mut ue) = setup();
        ue.pucch.as_mut().unwrap().simultaneous_harq_ack_csi = false;
        assert!(multiplex(&cell.pucch_resources, &ue, &uci(1, false, 4), Some(0)).is_none());
    }

    #[test]
    fn test_sr_and_csi_share_csi_resource() {
        let (cell, ue) = setup();
        let grants = multiplex(&cell.pucch_resources, &ue, &uci(0, true, 4), None).unwrap();
        assert_eq!(grants.len(), 1);
        assert_eq!(grants[0].resource.res_id, ue.csi_report.as_ref().unwrap().pucch_res_id);
        assert_eq!(grants[0].uci_bits.sr_nof_bits, 1);
        assert_eq!(grants[0].uci_bits.csi_part1_nof_bits, 4);
    }

    #[test]
    fn test_payload_too_large() {
        let (cell, ue) = setup();
        assert!(multiplex(&cell.pucch_resources, &ue, &uci(20, true, 8), Some(0)).is_none());
    }
}
