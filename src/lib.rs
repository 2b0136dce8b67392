// SPDX-License-Identifier: MIT
//! # DST Bank Codec
//!
//! Packed encoding of HYP1-family air-shower event banks and the sequential
//! DST file framing they are stored in.
//!
//! ## Format Overview
//!
//! A bank is a fixed schema whose on-wire layout depends on runtime repeat
//! counts. The HYP1 bank carries `nfit` geometry fits over `ngtube`
//! fluorescence-detector tubes and `nhits` surface-detector hits; every
//! repeated group is packed field by field, in a fixed order, right after an
//! 8-byte header:
//!
//! ```text
//! HYP1 bank (little-endian)
//! =========================
//!
//! Header (8 bytes):
//! - Bank id (i32)        13300 HYP1, 13301 BRHYP1, 13302 LRHYP1
//! - Bank version (i32)
//!
//! Event identity (i2, r8 x2, i4 x10), nfit (i4), ngtube (i4)
//! Per-tube block, per-fit plane angles
//! nhits (i4), per-hit block, per-fit SD timing
//! Per-fit SDP, labels (128 bytes each), fit parameter columns
//! n_comp (i4 x2), chi2 components, chi2, residuals
//! ```
//!
//! Banks are written to DST files in 32000-byte blocks; see [`dst`].
//!
//! ## Key Features
//!
//! - **One codec per flavor**: [`BankCodec`] owns a record, a lazily
//!   allocated buffer and the bank id/version it stamps
//! - **Two failure policies**: stop at the first failing field, or walk the
//!   whole bank and report every failing field
//! - **Stale tails kept**: decoding into a used record overwrites only the
//!   new counts, like the legacy readers did
//! - **C-compatible dumps**: `%g`/`%e` formatting matches the existing tools
//! - **Transparent compression**: `.dst.gz` files behind the `compression`
//!   feature, `.dst.bz2` files behind the `bz2` feature
//!
//! ## Usage
//!
//! ```rust
//! use dst_bank::{BankCodec, Hyp1Record};
//!
//! let mut codec = BankCodec::hyp1();
//! let record = codec.record_mut();
//! record.julian = 2_455_198;
//! record.push_fit("hybrid").chi2 = 3.2;
//!
//! let len = codec.encode().unwrap();
//! let bank = codec.buffer().unwrap().to_vec();
//! assert_eq!(bank.len(), len);
//!
//! let mut reader = BankCodec::<Hyp1Record>::hyp1();
//! reader.decode_checked(&bank).unwrap();
//! assert_eq!(reader.record(), codec.record());
//! ```

pub mod bank;
pub mod cfmt;
pub mod codec;
pub mod config;
pub mod dst;
pub mod format;
pub mod hyp1;
pub mod pack;
pub mod slots;

// Re-export main types
pub use bank::BankCodec;
pub use codec::{BankSchema, CodecError, ErrorMode, FieldFailure, FieldFailures};
pub use config::CodecConfig;
pub use dst::{BankSink, DstReader, DstWriter, Event, Events, RawBank, ReadError, WriteError};
pub use format::{BankHeader, Flavor, BANK_HEADER_SIZE, BRHYP1, HYP1, LRHYP1};
pub use hyp1::{FdTube, Fit, FitLabel, Hyp1Record, SdHit};
pub use pack::{BufferError, PackBuffer, UnpackCursor};
pub use slots::Slots;
