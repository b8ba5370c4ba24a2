//! Abstract addresses.
//!
//! Addresses live in four disjoint spaces:
//!
//!  - registers: frame-local cells (Dalvik registers, the result and
//!    exception registers, static fields),
//!  - objects: slots of the abstract store,
//!  - relocated: placeholders minted while a method is summarized in
//!    isolation, meaningful only through an allocation table,
//!  - null.
//!
//! The space of an address is carried by its variant. A compact 32 bits
//! encoding, where the two upper bits hold the space, is available for
//! serialization purposes.

use crate::errors::{AnalysisError, AnalysisResult};
use serde::{Serialize, Serializer};
use std::fmt;

/// Index of the frame register receiving method results.
pub const RESULT_REG: u32 = 0;
/// Index of the frame register receiving thrown exceptions.
pub const EXCEPTION_REG: u32 = 1;
/// First register index used for static fields.
pub const STATIC_BASE: u32 = 0x1000_0000;

const TAG_SHIFT: u32 = 30;
const INDEX_MASK: u32 = (1 << TAG_SHIFT) - 1;
const RAW_NULL: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AddrSpace {
    Null,
    Register,
    Object,
    Relocated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Addr {
    Null,
    Register(u32),
    Object(u32),
    Relocated(u32),
}

impl Addr {
    /// Index reserved, in the object and relocated spaces, for the address
    /// standing for any address of the space.
    pub const TOP_INDEX: u32 = INDEX_MASK - 1;
    /// Largest index usable for an ordinary address.
    pub const MAX_INDEX: u32 = INDEX_MASK - 2;

    pub const OBJECT_TOP: Self = Self::Object(Self::TOP_INDEX);
    pub const RELOCATED_TOP: Self = Self::Relocated(Self::TOP_INDEX);

    /// Address of the Dalvik register `vN` in a frame.
    #[inline]
    #[must_use]
    pub const fn general(reg: u16) -> Self {
        Self::Register(reg as u32 + 2)
    }

    #[inline]
    #[must_use]
    pub const fn static_field(idx: usize) -> Self {
        Self::Register(STATIC_BASE + idx as u32)
    }

    #[inline]
    #[must_use]
    pub const fn space(self) -> AddrSpace {
        match self {
            Self::Null => AddrSpace::Null,
            Self::Register(_) => AddrSpace::Register,
            Self::Object(_) => AddrSpace::Object,
            Self::Relocated(_) => AddrSpace::Relocated,
        }
    }

    #[inline]
    #[must_use]
    pub const fn index(self) -> Option<u32> {
        match self {
            Self::Null => None,
            Self::Register(i) | Self::Object(i) | Self::Relocated(i) => Some(i),
        }
    }

    /// Returns `true` for the unknown address of the object or relocated
    /// space.
    #[inline]
    #[must_use]
    pub const fn is_top(self) -> bool {
        matches!(self, Self::Object(Self::TOP_INDEX) | Self::Relocated(Self::TOP_INDEX))
    }

    /// The unknown address of the same space, if the space has one.
    #[must_use]
    pub const fn top_of(space: AddrSpace) -> Option<Self> {
        match space {
            AddrSpace::Object => Some(Self::OBJECT_TOP),
            AddrSpace::Relocated => Some(Self::RELOCATED_TOP),
            AddrSpace::Null | AddrSpace::Register => None,
        }
    }

    /// Returns the index of a store slot, failing on any other address.
    pub fn object_index(self) -> AnalysisResult<u32> {
        match self {
            Self::Object(i) if i != Self::TOP_INDEX => Ok(i),
            Self::Object(_) => Err(AnalysisError::InvalidAddress {
                addr: self,
                reason: "the unknown object cannot be dereferenced",
            }),
            _ => Err(AnalysisError::InvalidAddress {
                addr: self,
                reason: "not a store address",
            }),
        }
    }

    #[must_use]
    pub const fn to_raw(self) -> u32 {
        match self {
            Self::Null => RAW_NULL,
            Self::Register(i) => i & INDEX_MASK,
            Self::Object(i) => (1 << TAG_SHIFT) | (i & INDEX_MASK),
            Self::Relocated(i) => (2 << TAG_SHIFT) | (i & INDEX_MASK),
        }
    }

    pub fn from_raw(raw: u32) -> AnalysisResult<Self> {
        if raw == RAW_NULL {
            return Ok(Self::Null);
        }
        let index = raw & INDEX_MASK;
        match raw >> TAG_SHIFT {
            0 => Ok(Self::Register(index)),
            1 => Ok(Self::Object(index)),
            2 => Ok(Self::Relocated(index)),
            _ => Err(AnalysisError::ArgumentError(format!(
                "{raw:#010x} does not encode an address"
            ))),
        }
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Register(i) if *i >= STATIC_BASE => write!(f, "static:{}", i - STATIC_BASE),
            Self::Register(i) => write!(f, "reg:{i}"),
            Self::Object(Self::TOP_INDEX) => write!(f, "obj:*"),
            Self::Object(i) => write!(f, "obj:{i}"),
            Self::Relocated(Self::TOP_INDEX) => write!(f, "reloc:*"),
            Self::Relocated(i) => write!(f, "reloc:{i}"),
        }
    }
}

impl Serialize for Addr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.to_raw())
    }
}
