// SPDX-License-Identifier: MIT
//! Bank identities and the packed bank header
//!
//! Every packed bank starts with an 8-byte header: the bank id followed by the
//! bank version, both little-endian `i32`. The header alone identifies how the
//! remaining bytes must be interpreted; the bank length is carried by the
//! file framing (see [`crate::dst`]).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::pack::{BufferError, PackBuffer, UnpackCursor};

/// Header size in bytes (`id` + `version`)
pub const BANK_HEADER_SIZE: usize = 8;

/// A (bank id, version) pair plus the conventional lower-case bank name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Flavor {
    pub id: i32,
    pub version: i32,
    pub name: &'static str,
}

impl Flavor {
    pub const fn new(id: i32, version: i32, name: &'static str) -> Self {
        Self { id, version, name }
    }

    /// Header stamped on banks of this flavor
    pub fn header(&self) -> BankHeader {
        BankHeader {
            id: self.id,
            version: self.version,
        }
    }
}

impl fmt::Display for Flavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} v{})", self.name, self.id, self.version)
    }
}

/// Hybrid reconstruction bank, site independent
pub const HYP1: Flavor = Flavor::new(13300, 2, "hyp1");

/// Hybrid reconstruction bank, Black Rock view
pub const BRHYP1: Flavor = Flavor::new(13301, 0, "brhyp1");

/// Hybrid reconstruction bank, Long Ridge view
pub const LRHYP1: Flavor = Flavor::new(13302, 0, "lrhyp1");

/// Marker bank opening an event in a DST stream
pub const START_BANKID: i32 = 1_400_000_023;

/// Marker bank closing an event in a DST stream
pub const STOP_BANKID: i32 = 1_400_000_101;

/// Bank ids known to this crate, with their conventional names.
///
/// Only the HYP1 family has a schema here; the plane and tube-profile
/// families are listed so readers can label them.
pub const KNOWN_BANKS: &[(i32, &str)] = &[
    (12093, "fdplane"),
    (12103, "brplane"),
    (12203, "lrplane"),
    (12096, "fdtubeprofile"),
    (12106, "brtubeprofile"),
    (12206, "lrtubeprofile"),
    (12506, "tltubeprofile"),
    (13300, "hyp1"),
    (13301, "brhyp1"),
    (13302, "lrhyp1"),
    (13313, "hytubeprofile"),
    (20002, "sttubeprofile"),
];

/// Look up the conventional name of a bank id
pub fn bank_name(id: i32) -> Option<&'static str> {
    KNOWN_BANKS
        .iter()
        .find(|(known, _)| *known == id)
        .map(|(_, name)| *name)
}

/// Fluorescence detector sites, as stored in `fd_site_id`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FdSite {
    BlackRock,
    LongRidge,
    Middle,
    Tale,
}

impl FdSite {
    pub fn from_id(id: i32) -> Option<Self> {
        match id {
            0 => Some(FdSite::BlackRock),
            1 => Some(FdSite::LongRidge),
            2 => Some(FdSite::Middle),
            3 => Some(FdSite::Tale),
            _ => None,
        }
    }

    pub fn id(&self) -> i32 {
        match self {
            FdSite::BlackRock => 0,
            FdSite::LongRidge => 1,
            FdSite::Middle => 2,
            FdSite::Tale => 3,
        }
    }

    /// Two-letter site code
    pub fn code(&self) -> &'static str {
        match self {
            FdSite::BlackRock => "BR",
            FdSite::LongRidge => "LR",
            FdSite::Middle => "MD",
            FdSite::Tale => "TL",
        }
    }
}

/// Packed bank header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BankHeader {
    pub id: i32,
    pub version: i32,
}

impl BankHeader {
    /// Parse the header from the start of a packed bank
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BufferError> {
        let mut cursor = UnpackCursor::new(bytes);
        let id = cursor.unpack_one::<i32>()?;
        let version = cursor.unpack_one::<i32>()?;
        Ok(Self { id, version })
    }

    /// Reset `buffer` and stamp this header at its start
    pub fn write_to_buffer(&self, buffer: &mut PackBuffer) -> Result<(), BufferError> {
        buffer.reset();
        buffer.pack_one(self.id)?;
        buffer.pack_one(self.version)
    }

    /// Check that this header matches a flavor
    pub fn matches(&self, flavor: &Flavor) -> bool {
        self.id == flavor.id && self.version == flavor.version
    }

    pub fn name(&self) -> Option<&'static str> {
        bank_name(self.id)
    }
}

impl fmt::Display for BankHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} ({} v{})", name, self.id, self.version),
            None => write!(f, "bank {} v{}", self.id, self.version),
        }
    }
}
