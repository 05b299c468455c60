//! Common Types for the 5G MAC Scheduler
//!
//! Defines fundamental identifiers and numerology types shared by the scheduler crates

use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::FromPrimitive;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors raised when converting raw values into typed identifiers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("Invalid subcarrier spacing: {0} kHz")]
    InvalidScs(u32),

    #[error("Invalid RNTI value: {0:#x}")]
    InvalidRnti(u16),

    #[error("Invalid logical channel ID: {0}")]
    InvalidLcid(u8),
}

/// Radio Network Temporary Identifier (RNTI)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Rnti(pub u16);

impl Rnti {
    /// Invalid/unset RNTI
    pub const INVALID: Self = Self(0);
    /// First RNTI usable as RA-RNTI
    pub const MIN_RA_RNTI: Self = Self(0x0001);
    /// Last RNTI usable as RA-RNTI
    pub const MAX_RA_RNTI: Self = Self(0x45F7);
    /// First RNTI usable as C-RNTI/TC-RNTI
    pub const MIN_CRNTI: Self = Self(0x4601);
    /// Last RNTI usable as C-RNTI/TC-RNTI
    pub const MAX_CRNTI: Self = Self(0xFFEF);
    /// Paging RNTI
    pub const P_RNTI: Self = Self(0xFFFE);
    /// System Information RNTI
    pub const SI_RNTI: Self = Self(0xFFFF);

    /// Create a new RNTI
    pub fn new(value: u16) -> Self {
        Self(value)
    }

    /// Get the RNTI value
    pub fn value(&self) -> u16 {
        self.0
    }

    /// Whether this RNTI lies in the C-RNTI range
    pub fn is_crnti(&self) -> bool {
        (Self::MIN_CRNTI.0..=Self::MAX_CRNTI.0).contains(&self.0)
    }

    /// Whether this RNTI lies in the RA-RNTI range
    pub fn is_ra_rnti(&self) -> bool {
        (Self::MIN_RA_RNTI.0..=Self::MAX_RA_RNTI.0).contains(&self.0)
    }
}

impl fmt::Display for Rnti {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

/// Cell Identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellId(pub u16);

/// Physical Cell Identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pci(pub u16);

impl Pci {
    /// Maximum valid PCI value (0-1007)
    pub const MAX: u16 = 1007;

    /// Create a new PCI with validation
    pub fn new(value: u16) -> Option<Self> {
        if value <= Self::MAX {
            Some(Self(value))
        } else {
            None
        }
    }
}

/// Index of a UE within the DU, unique across cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UeIndex(pub u16);

impl fmt::Display for UeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ue={}", self.0)
    }
}

/// HARQ process identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct HarqId(pub u8);

/// Logical Channel ID (TS 38.321 Table 6.2.1-1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Lcid(pub u8);

impl Lcid {
    /// SRB0 (CCCH)
    pub const SRB0: Self = Self(0);
    /// SRB1
    pub const SRB1: Self = Self(1);
    /// SRB2
    pub const SRB2: Self = Self(2);
    /// SRB3
    pub const SRB3: Self = Self(3);
    /// First DRB LCID
    pub const MIN_DRB: Self = Self(4);
    /// Last LCID usable for logical channels
    pub const MAX_LCID: Self = Self(32);
    /// Number of addressable logical channels
    pub const MAX_NOF_LCIDS: usize = 33;

    /// Create a new LCID with validation
    pub fn new(value: u8) -> Result<Self, TypeError> {
        if value <= Self::MAX_LCID.0 {
            Ok(Self(value))
        } else {
            Err(TypeError::InvalidLcid(value))
        }
    }

    /// Whether this LCID maps to a signalling radio bearer
    pub fn is_srb(&self) -> bool {
        self.0 < Self::MIN_DRB.0
    }
}

/// Logical Channel Group used in Buffer Status Reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Lcg(pub u8);

impl Lcg {
    /// Number of logical channel groups
    pub const MAX_NOF_LCGS: usize = 8;
}

/// Subcarrier spacing values in kHz
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum SubcarrierSpacing {
    /// 15 kHz
    Scs15 = 15,
    /// 30 kHz
    Scs30 = 30,
    /// 60 kHz
    Scs60 = 60,
    /// 120 kHz
    Scs120 = 120,
    /// 240 kHz
    Scs240 = 240,
}

impl SubcarrierSpacing {
    /// Numerology index (mu)
    pub fn numerology(&self) -> u8 {
        match self {
            SubcarrierSpacing::Scs15 => 0,
            SubcarrierSpacing::Scs30 => 1,
            SubcarrierSpacing::Scs60 => 2,
            SubcarrierSpacing::Scs120 => 3,
            SubcarrierSpacing::Scs240 => 4,
        }
    }

    /// Build from numerology index
    pub fn from_numerology(mu: u8) -> Option<Self> {
        match mu {
            0 => Some(SubcarrierSpacing::Scs15),
            1 => Some(SubcarrierSpacing::Scs30),
            2 => Some(SubcarrierSpacing::Scs60),
            3 => Some(SubcarrierSpacing::Scs120),
            4 => Some(SubcarrierSpacing::Scs240),
            _ => None,
        }
    }

    /// Value in kHz
    pub fn to_khz(&self) -> u32 {
        *self as u32
    }

    /// Number of slots per 1 ms subframe
    pub fn slots_per_subframe(&self) -> u32 {
        1 << self.numerology()
    }

    /// Number of slots per 10 ms frame
    pub fn slots_per_frame(&self) -> u32 {
        10 * self.slots_per_subframe()
    }
}

impl TryFrom<u32> for SubcarrierSpacing {
    type Error = TypeError;

    fn try_from(khz: u32) -> Result<Self, Self::Error> {
        SubcarrierSpacing::from_u32(khz).ok_or(TypeError::InvalidScs(khz))
    }
}

impl From<SubcarrierSpacing> for u32 {
    fn from(scs: SubcarrierSpacing) -> Self {
        scs.to_khz()
    }
}

/// Duplex mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplexMode {
    /// Frequency Division Duplex
    Fdd,
    /// Time Division Duplex
    Tdd,
}
