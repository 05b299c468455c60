//! PDCCH Candidates
//!
//! Aggregation levels and the CCE positions of PDCCH candidates in a search space
//! (TS 38.213 §10.1).

use common::types::Rnti;
use serde::{Deserialize, Serialize};
use std::fmt;

/// PDCCH aggregation level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum AggregationLevel {
    N1,
    N2,
    N4,
    N8,
    N16,
}

impl AggregationLevel {
    /// All aggregation levels in increasing order
    pub const ALL: [AggregationLevel; 5] = [
        AggregationLevel::N1,
        AggregationLevel::N2,
        AggregationLevel::N4,
        AggregationLevel::N8,
        AggregationLevel::N16,
    ];

    /// Number of CCEs
    pub fn nof_cces(&self) -> u32 {
        1 << self.index()
    }

    /// Position in [`AggregationLevel::ALL`]
    pub fn index(&self) -> usize {
        match self {
            AggregationLevel::N1 => 0,
            AggregationLevel::N2 => 1,
            AggregationLevel::N4 => 2,
            AggregationLevel::N8 => 3,
            AggregationLevel::N16 => 4,
        }
    }

    /// Aggregation level for a UE given its last wideband CQI
    pub fn from_cqi(cqi: u8) -> Self {
        match cqi {
            10.. => AggregationLevel::N2,
            5..=9 => AggregationLevel::N4,
            _ => AggregationLevel::N8,
        }
    }
}

impl TryFrom<u8> for AggregationLevel {
    type Error = String;

    fn try_from(nof_cces: u8) -> Result<Self, Self::Error> {
        match nof_cces {
            1 => Ok(AggregationLevel::N1),
            2 => Ok(AggregationLevel::N2),
            4 => Ok(AggregationLevel::N4),
            8 => Ok(AggregationLevel::N8),
            16 => Ok(AggregationLevel::N16),
            _ => Err(format!("invalid aggregation level {}", nof_cces)),
        }
    }
}

impl From<AggregationLevel> for u8 {
    fn from(al: AggregationLevel) -> Self {
        al.nof_cces() as u8
    }
}

impl fmt::Display for AggregationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AL{}", self.nof_cces())
    }
}

const HASH_D: u64 = 65537;

/// Y_{p,k} of the UE-specific search space hashing function.
///
/// `coreset_id` selects A_p, `slot_index` is the slot within the frame.
pub fn ue_specific_hash(rnti: Rnti, coreset_id: u8, slot_index: u32) -> u32 {
    let a: u64 = match coreset_id % 3 {
        0 => 39827,
        1 => 39829,
        _ => 39839,
    };
    let mut y = rnti.value() as u64;
    for _ in 0..=slot_index {
        y = (a * y) % HASH_D;
    }
    y as u32
}

/// First CCE of each PDCCH candidate of one aggregation level.
///
/// `hash` is 0 for common search spaces and [`ue_specific_hash`] otherwise.
pub fn candidate_cces(nof_coreset_cces: u32, aggr_lvl: AggregationLevel, nof_candidates: u8, hash: u32) -> Vec<u32> {
    let l = aggr_lvl.nof_cces();
    let nof_positions = nof_coreset_cces / l;
    if nof_positions == 0 || nof_candidates == 0 {
        return Vec::new();
    }
    let m_total = nof_candidates as u32;
    let mut cces: Vec<u32> = (0..m_total)
        .map(|m| l * ((hash + (m * nof_coreset_cces) / (l * m_total)) % nof_positions))
        .collect();
    cces.dedup();
    cces
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_candidates() {
        // 16 CCEs, AL4, 4 candidates -> 0, 4, 8, 12
        assert_eq!(candidate_cces(16, AggregationLevel::N4, 4, 0), vec![0, 4, 8, 12]);
        // 2 candidates are spread over the CORESET
        assert_eq!(candidate_cces(16, AggregationLevel::N4, 2, 0), vec![0, 8]);
        assert_eq!(candidate_cces(16, AggregationLevel::N16, 1, 0), vec![0]);
        assert!(candidate_cces(8, AggregationLevel::N16, 1, 0).is_empty());
    }

    #[test]
    fn test_ue_specific_candidates_stay_in_coreset() {
        for rnti in [0x4601u16, 0x4602, 0x1234, 0xffef] {
            for slot in 0..20 {
                let y = ue_specific_hash(Rnti(rnti), 1, slot);
                for al in [AggregationLevel::N2, AggregationLevel::N4, AggregationLevel::N8] {
                    for cce in candidate_cces(16, al, 2, y) {
                        assert_eq!(cce % al.nof_cces(), 0);
                        assert!(cce + al.nof_cces() <= 16);
                    }
                }
            }
        }
    }

    #[test]
    fn test_hash_depends_on_rnti_and_slot() {
        let a = ue_specific_hash(Rnti(0x4601), 1, 0);
        let b = ue_specific_hash(Rnti(0x4601), 1, 1);
        let c = ue_specific_hash(Rnti(0x4602), 1, 0);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, (39829u64 * 0x4601 % 65537) as u32);
    }

    #[test]
    fn test_aggregation_level_conversion() {
        assert_eq!(AggregationLevel::try_from(8), Ok(AggregationLevel::N8));
        assert!(AggregationLevel::try_from(3).is_err());
        assert_eq!(u8::from(AggregationLevel::N16), 16);
        assert_eq!(AggregationLevel::from_cqi(12), AggregationLevel::N2);
        assert_eq!(AggregationLevel::from_cqi(3), AggregationLevel::N8);
    }
}
