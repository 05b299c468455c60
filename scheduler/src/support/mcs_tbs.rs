//! MCS and TBS Calculation
//!
//! MCS table 1 for PDSCH/PUSCH (TS 38.214 Table 5.1.3.1-1), transport block size
//! determination (TS 38.214 §5.1.3.2) and the CQI to MCS mapping used for link
//! adaptation.

use common::interval::OfdmSymbolRange;

/// Number of subcarriers in a resource block
pub const NOF_SUBCARRIERS_PER_RB: u32 = 12;

/// Highest MCS index carrying data in the 64QAM table
pub const MAX_MCS_INDEX: u8 = 28;

/// Modulation order and target code rate (x1024) for MCS 0..=28
const MCS_TABLE_64QAM: [(u8, u16); 29] = [
    (2, 120), (2, 157), (2, 193), (2, 251), (2, 308), (2, 379), (2, 449), (2, 526),
    (2, 602), (2, 679), (4, 340), (4, 378), (4, 434), (4, 490), (4, 553), (4, 616),
    (4, 658), (6, 438), (6, 466), (6, 517), (6, 567), (6, 616), (6, 666), (6, 719),
    (6, 772), (6, 822), (6, 873), (6, 910), (6, 948),
];

/// TBS for N'info <= 3824 (TS 38.214 Table 5.1.3.2-1)
const TBS_TABLE: [u32; 93] = [
    24, 32, 40, 48, 56, 64, 72, 80, 88, 96, 104, 112, 120, 128, 136, 144, 152, 160, 168, 176,
    184, 192, 208, 224, 240, 256, 272, 288, 304, 320, 336, 352, 368, 384, 408, 432, 456, 480,
    504, 528, 552, 576, 608, 640, 672, 704, 736, 768, 808, 848, 888, 928, 984, 1032, 1064,
    1128, 1160, 1192, 1224, 1256, 1288, 1320, 1352, 1416, 1480, 1544, 1608, 1672, 1736, 1800,
    1864, 1928, 2024, 2088, 2152, 2216, 2280, 2408, 2472, 2536, 2600, 2664, 2728, 2792, 2856,
    2976, 3104, 3240, 3368, 3496, 3624, 3752, 3824,
];

/// CQI table 1 to MCS mapping, CQI 0 means out of range
const CQI_TO_MCS: [u8; 16] = [0, 0, 0, 2, 4, 6, 8, 11, 13, 15, 18, 20, 22, 24, 26, 28];

/// Modulation and code rate of an MCS index
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct McsDescription {
    /// Modulation order (bits per symbol)
    pub modulation_order: u8,
    /// Target code rate
    pub code_rate: f32,
}

/// Look up an MCS of the 64QAM table
pub fn mcs_description(mcs: u8) -> Option<McsDescription> {
    MCS_TABLE_64QAM.get(mcs as usize).map(|&(qm, r)| McsDescription {
        modulation_order: qm,
        code_rate: r as f32 / 1024.0,
    })
}

/// MCS recommended for a wideband CQI report
pub fn cqi_to_mcs(cqi: u8) -> Option<u8> {
    match cqi {
        1..=15 => Some(CQI_TO_MCS[cqi as usize]),
        _ => None,
    }
}

/// Parameters of the TBS computation for one shared channel transmission
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TbsParameters {
    /// MCS index of the 64QAM table
    pub mcs: u8,
    /// OFDM symbols of the shared channel
    pub symbols: OfdmSymbolRange,
    /// Number of DMRS symbols
    pub nof_dmrs_symbols: u8,
    /// Number of layers
    pub nof_layers: u8,
}

impl TbsParameters {
    /// Single layer, one DMRS symbol
    pub fn new(mcs: u8, symbols: OfdmSymbolRange) -> Self {
        Self {
            mcs,
            symbols,
            nof_dmrs_symbols: 1,
            nof_layers: 1,
        }
    }

    fn nof_re_per_prb(&self) -> u32 {
        let nof_symbols = self.symbols.length().saturating_sub(self.nof_dmrs_symbols) as u32;
        (NOF_SUBCARRIERS_PER_RB * nof_symbols).min(156)
    }
}

/// Transport block size in bits (TS 38.214 §5.1.3.2)
pub fn compute_tbs_bits(params: &TbsParameters, nof_prbs: u32) -> u32 {
    let Some(mcs) = mcs_description(params.mcs) else {
        return 0;
    };
    let n_re = params.nof_re_per_prb() * nof_prbs;
    let n_info = n_re as f64 * mcs.code_rate as f64 * mcs.modulation_order as f64 * params.nof_layers as f64;
    if n_info < 1.0 {
        return 0;
    }

    if n_info <= 3824.0 {
        let n = (n_info.log2().floor() as i32 - 6).max(3);
        let step = 2f64.powi(n);
        let n_info_q = (step * (n_info / step).floor()).max(24.0) as u32;
        return TBS_TABLE
            .iter()
            .copied()
            .find(|&tbs| tbs >= n_info_q)
            .unwrap_or(3824);
    }

    let n = (n_info - 24.0).log2().floor() as i32 - 5;
    let step = 2f64.powi(n);
    let n_info_q = (step * ((n_info - 24.0) / step).round()).max(3840.0);
    let c = if mcs.code_rate <= 0.25 {
        ((n_info_q + 24.0) / 3816.0).ceil()
    } else if n_info_q > 8424.0 {
        ((n_info_q + 24.0) / 8424.0).ceil()
    } else {
        1.0
    };
    (8.0 * c * ((n_info_q + 24.0) / (8.0 * c)).ceil() - 24.0) as u32
}

/// Transport block size in bytes
pub fn compute_tbs_bytes(params: &TbsParameters, nof_prbs: u32) -> u32 {
    compute_tbs_bits(params, nof_prbs) / 8
}

/// Smallest number of PRBs, up to `max_nof_prbs`, whose TBS holds `nof_bytes`.
///
/// Returns `None` if even `max_nof_prbs` PRBs are not enough.
pub fn nof_prbs_for_bytes(params: &TbsParameters, nof_bytes: u32, max_nof_prbs: u32) -> Option<u32> {
    if max_nof_prbs == 0 {
        return None;
    }
    if compute_tbs_bytes(params, max_nof_prbs) < nof_bytes {
        return None;
    }
    // TBS is monotonic in the number of PRBs.
    let (mut lo, mut hi) = (1, max_nof_prbs);
    while lo < hi {
        let mid = (lo + hi) / 2;
        if compute_tbs_bytes(params, mid) >= nof_bytes {
            hi = mid;
        } else {
            lo = mid + 1;
        }
    }
    Some(lo)
}
