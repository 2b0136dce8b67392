// SPDX-License-Identifier: MIT
//! HYP1 hybrid reconstruction bank
//!
//! One HYP1 bank holds a hybrid (fluorescence + surface detector) event: the
//! FD tubes and SD hits that took part in the reconstruction, and up to
//! [`MAX_FIT`] geometry fits over them. The same layout is stored under three
//! bank ids ([`HYP1`](crate::format::HYP1), [`BRHYP1`](crate::format::BRHYP1)
//! and [`LRHYP1`](crate::format::LRHYP1)), distinguished only by the header.

mod codec;
mod dump;

pub use codec::MAX_BANK_LEN;

use std::fmt;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::codec::CodecError;
use crate::format::FdSite;
use crate::slots::Slots;

/// Maximum number of fits per bank
pub const MAX_FIT: usize = 4;

/// Maximum number of FD tubes per bank
pub const MAX_TUBE: usize = 2000;

/// Maximum number of SD hits per bank
pub const MAX_HIT: usize = 0x100;

/// Width of the fit label on the wire
pub const FIT_LABEL_LEN: usize = 128;

/// Number of chi-square components stored per fit
pub const N_CHI2_COMP: usize = 4;

/// Length of the record-level component count array
pub const N_COMP_LEN: usize = 2;

/// Julian day number of 0001-01-01 minus one, for chrono's CE day count
const JULIAN_CE_OFFSET: i32 = 1_721_425;

/// Fixed-width, NUL-padded fit label
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FitLabel([u8; FIT_LABEL_LEN]);

impl FitLabel {
    /// Build a label from text, truncating to 128 bytes
    pub fn new(text: &str) -> Self {
        let mut bytes = [0u8; FIT_LABEL_LEN];
        let src = text.as_bytes();
        let n = src.len().min(FIT_LABEL_LEN);
        bytes[..n].copy_from_slice(&src[..n]);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; FIT_LABEL_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; FIT_LABEL_LEN] {
        &self.0
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8; FIT_LABEL_LEN] {
        &mut self.0
    }

    /// Text up to the first NUL, lossily decoded
    pub fn as_str(&self) -> std::borrow::Cow<'_, str> {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(FIT_LABEL_LEN);
        String::from_utf8_lossy(&self.0[..end])
    }
}

impl Default for FitLabel {
    fn default() -> Self {
        Self([0u8; FIT_LABEL_LEN])
    }
}

impl fmt::Debug for FitLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FitLabel({:?})", self.as_str())
    }
}

impl fmt::Display for FitLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str())
    }
}

impl From<&str> for FitLabel {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl Serialize for FitLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_str())
    }
}

impl<'de> Deserialize<'de> for FitLabel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Ok(Self::new(&text))
    }
}

/// An FD photomultiplier tube used in the reconstruction
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FdTube {
    /// Pointing direction (unit vector)
    pub vector: [f64; 3],
    /// Altitude (rad)
    pub alt: f64,
    /// Azimuth (rad)
    pub azm: f64,
    pub sigma: f64,
    /// Index of this tube in the source plane bank
    pub plane_index: i32,
    /// Photo-electrons
    pub npe: f64,
    /// Signal time (ns)
    pub time: i32,
    /// Signal time spread (ns)
    pub time_rms: f64,
}

/// An SD counter hit used in the reconstruction
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SdHit {
    /// Counter position (m, CLF frame)
    pub xyz: [f64; 3],
    /// Signal density (VEM/m^2)
    pub rho: f64,
    /// Index of this hit in the source pattern-recognition bank
    pub rufptn_index: i32,
}

/// One geometry fit and its per-observation quantities.
///
/// The per-tube columns hold `ngtube` entries and the per-hit columns hold
/// `nhits` entries of the owning record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fit {
    pub label: FitLabel,
    /// Shower-detector plane normal
    pub sdp: [f64; 3],
    pub rp: f64,
    pub d_rp: f64,
    pub psi: f64,
    pub d_psi: f64,
    pub t0: f64,
    pub d_t0: f64,
    pub xcore: f64,
    pub d_xcore: f64,
    pub ycore: f64,
    pub d_ycore: f64,
    pub zen: f64,
    pub d_zen: f64,
    pub azm: f64,
    pub d_azm: f64,
    pub tc: f64,
    pub d_tc: f64,
    /// FD timing, SD timing, SDP and core-constraint terms
    pub chi2_comp: [f64; N_CHI2_COMP],
    pub chi2: f64,

    pub plane_alt: Slots<f64>,
    pub plane_azm: Slots<f64>,
    pub fd_residual: Slots<f64>,

    pub sd_time: Slots<f64>,
    pub sd_time_sigma: Slots<f64>,
    pub sd_plane_alt: Slots<f64>,
    pub sd_plane_azm: Slots<f64>,
    pub sd_residual: Slots<f64>,
}

impl Fit {
    /// A zeroed fit sized for `ngtube` tubes and `nhits` hits
    pub fn with_observations(label: &str, ngtube: usize, nhits: usize) -> Self {
        let mut fit = Fit {
            label: FitLabel::new(label),
            ..Fit::default()
        };
        fit.resize_observations(ngtube, nhits);
        fit
    }

    /// Set the lengths of every per-tube and per-hit column
    pub fn resize_observations(&mut self, ngtube: usize, nhits: usize) {
        for column in self.tube_columns_mut() {
            column.reuse(ngtube);
        }
        for column in self.hit_columns_mut() {
            column.reuse(nhits);
        }
    }

    pub(crate) fn tube_columns(&self) -> [(&'static str, &Slots<f64>); 3] {
        [
            ("plane_alt", &self.plane_alt),
            ("plane_azm", &self.plane_azm),
            ("fd_residual", &self.fd_residual),
        ]
    }

    pub(crate) fn hit_columns(&self) -> [(&'static str, &Slots<f64>); 5] {
        [
            ("sd_time", &self.sd_time),
            ("sd_time_sigma", &self.sd_time_sigma),
            ("sd_plane_alt", &self.sd_plane_alt),
            ("sd_plane_azm", &self.sd_plane_azm),
            ("sd_residual", &self.sd_residual),
        ]
    }

    fn tube_columns_mut(&mut self) -> [&mut Slots<f64>; 3] {
        [
            &mut self.plane_alt,
            &mut self.plane_azm,
            &mut self.fd_residual,
        ]
    }

    fn hit_columns_mut(&mut self) -> [&mut Slots<f64>; 5] {
        [
            &mut self.sd_time,
            &mut self.sd_time_sigma,
            &mut self.sd_plane_alt,
            &mut self.sd_plane_azm,
            &mut self.sd_residual,
        ]
    }
}

/// In-memory HYP1 record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Hyp1Record {
    pub event_code: i16,
    /// Nanoseconds into the second of the event timestamp
    pub tref: f64,
    /// FD/SD clock offset (ns)
    pub offset: f64,

    pub fd_event_num: i32,
    pub fd_site_id: i32,
    pub julian: i32,
    pub jsecond: i32,
    pub jsecfrac: i32,

    pub sd_event_num: i32,
    pub sd_site_id: i32,
    pub yymmdd: i32,
    pub hhmmss: i32,
    pub usec: i32,

    /// Auxiliary component counts
    pub n_comp: [i32; N_COMP_LEN],

    pub tubes: Slots<FdTube>,
    pub hits: Slots<SdHit>,
    pub fits: Slots<Fit>,
}

impl Hyp1Record {
    #[inline]
    pub fn nfit(&self) -> usize {
        self.fits.len()
    }

    #[inline]
    pub fn ngtube(&self) -> usize {
        self.tubes.len()
    }

    #[inline]
    pub fn nhits(&self) -> usize {
        self.hits.len()
    }

    /// Add a fit sized to the current tube and hit counts
    pub fn push_fit(&mut self, label: &str) -> &mut Fit {
        let fit = Fit::with_observations(label, self.ngtube(), self.nhits());
        self.fits.push(fit);
        let last = self.fits.len() - 1;
        &mut self.fits[last]
    }

    /// Check counts and per-fit column lengths
    pub fn validate(&self) -> Result<(), CodecError> {
        check_count("nfit", self.nfit(), MAX_FIT)?;
        check_count("ngtube", self.ngtube(), MAX_TUBE)?;
        check_count("nhits", self.nhits(), MAX_HIT)?;

        for (fit_index, fit) in self.fits.iter().enumerate() {
            for (field, column) in fit.tube_columns() {
                check_len(field, fit_index, column.len(), self.ngtube())?;
            }
            for (field, column) in fit.hit_columns() {
                check_len(field, fit_index, column.len(), self.nhits())?;
            }
        }
        Ok(())
    }

    pub fn fd_site(&self) -> Option<FdSite> {
        FdSite::from_id(self.fd_site_id)
    }

    /// Dump header name for the FD site of this record
    pub fn bank_label(&self) -> &'static str {
        match self.fd_site() {
            Some(FdSite::BlackRock) => "BRHYP1",
            Some(FdSite::LongRidge) => "LRHYP1",
            Some(FdSite::Middle) => "MDHYP1",
            _ => "HYP1",
        }
    }

    /// FD event time from `julian`, `jsecond` and `jsecfrac`.
    ///
    /// Julian days begin at noon UTC, so `jsecond` counts from 12:00 and
    /// anything past 43200 s lands on the next calendar day.
    pub fn fd_date_time(&self) -> Option<NaiveDateTime> {
        let days = self.julian.checked_sub(JULIAN_CE_OFFSET)?;
        let day = NaiveDate::from_num_days_from_ce_opt(days)?;
        let noon = day.and_hms_opt(12, 0, 0)?;
        let seconds = u32::try_from(self.jsecond).ok()?;
        let nanos = u32::try_from(self.jsecfrac).ok().filter(|n| *n < 1_000_000_000)?;
        noon.checked_add_signed(
            Duration::seconds(i64::from(seconds)) + Duration::nanoseconds(i64::from(nanos)),
        )
    }

    /// FD calendar date, rolled over to the next day after midnight UTC
    pub fn fd_date(&self) -> Option<NaiveDate> {
        self.fd_date_time().map(|time| time.date())
    }

    /// SD date and time from `yymmdd`, `hhmmss` and `usec`
    pub fn sd_date_time(&self) -> Option<NaiveDateTime> {
        let (yy, mm, dd) = split_triplet(self.yymmdd)?;
        let (hh, mi, ss) = split_triplet(self.hhmmss)?;
        let date = NaiveDate::from_ymd_opt(2000 + yy as i32, mm, dd)?;
        let time = NaiveTime::from_hms_micro_opt(hh, mi, ss, u32::try_from(self.usec).ok()?)?;
        Some(date.and_time(time))
    }
}

fn split_triplet(packed: i32) -> Option<(u32, u32, u32)> {
    let packed = u32::try_from(packed).ok()?;
    Some((packed / 10_000, (packed / 100) % 100, packed % 100))
}

fn check_count(field: &'static str, count: usize, max: usize) -> Result<(), CodecError> {
    if count > max {
        return Err(CodecError::InvalidRecord { field, count, max });
    }
    Ok(())
}

fn check_len(
    field: &'static str,
    fit: usize,
    found: usize,
    expected: usize,
) -> Result<(), CodecError> {
    if found != expected {
        return Err(CodecError::LengthMismatch {
            field,
            fit,
            found,
            expected,
        });
    }
    Ok(())
}
