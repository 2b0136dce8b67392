// SPDX-License-Identifier: MIT
//! Per-flavor bank codec
//!
//! [`BankCodec`] owns one record, one lazily allocated pack buffer and the
//! flavor stamped on every encoded bank. It is the unit a caller keeps around
//! per bank type: fill the record, encode or write it, decode incoming banks
//! into it, dump it.

use std::io::{self, Write};

use tracing::{debug, error};

use crate::codec::{decode_bank, encode_bank, BankSchema, CodecError};
use crate::config::CodecConfig;
use crate::dst::BankSink;
use crate::format::{BankHeader, Flavor, BRHYP1, HYP1, LRHYP1};
use crate::hyp1::Hyp1Record;
use crate::pack::PackBuffer;

pub struct BankCodec<S: BankSchema> {
    flavor: Flavor,
    config: CodecConfig,
    record: S,
    buffer: Option<PackBuffer>,
    /// The buffer holds an encoding of the current record
    encoded: bool,
}

impl<S: BankSchema> BankCodec<S> {
    pub fn new(flavor: Flavor) -> Self {
        Self::with_config(flavor, CodecConfig::default())
    }

    pub fn with_config(flavor: Flavor, config: CodecConfig) -> Self {
        Self {
            flavor,
            config,
            record: S::default(),
            buffer: None,
            encoded: false,
        }
    }

    pub fn flavor(&self) -> Flavor {
        self.flavor
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    pub fn record(&self) -> &S {
        &self.record
    }

    /// Mutable access to the record; the next write re-encodes it
    pub fn record_mut(&mut self) -> &mut S {
        self.encoded = false;
        &mut self.record
    }

    pub fn set_record(&mut self, record: S) {
        self.encoded = false;
        self.record = record;
    }

    /// Encode the record into the local buffer, returning the bank length.
    ///
    /// The buffer is allocated on first use and reused afterwards.
    pub fn encode(&mut self) -> Result<usize, CodecError> {
        self.encoded = false;
        let flavor = self.flavor;
        let capacity = self.config.buffer_capacity.unwrap_or(S::MAX_BANK_LEN);
        let buffer = self.buffer.get_or_insert_with(|| {
            debug!(bank = %flavor, capacity, "allocating bank buffer");
            PackBuffer::with_capacity(capacity)
        });
        let len = encode_bank(&self.record, flavor.header(), buffer, self.config.error_mode)?;
        self.encoded = true;
        debug!(bank = %flavor, len, "encoded bank");
        Ok(len)
    }

    /// Write the current encoding to `sink`, encoding first if the record
    /// changed since the last encode
    pub fn encode_and_write(&mut self, sink: &mut dyn BankSink) -> Result<usize, CodecError> {
        if !self.encoded {
            self.encode()?;
        }
        let bytes = self.buffer().unwrap_or_default();
        let len = bytes.len();
        if let Err(e) = sink.write_bank(bytes) {
            error!(bank = %self.flavor, error = %e, "failed to write bank");
            return Err(e.into());
        }
        Ok(len)
    }

    /// Decode a bank into the local record without checking its header
    pub fn decode(&mut self, bank: &[u8]) -> Result<(), CodecError> {
        self.encoded = false;
        decode_bank(&mut self.record, bank, self.config.error_mode)
    }

    /// Decode a bank after checking that its header matches this flavor
    pub fn decode_checked(&mut self, bank: &[u8]) -> Result<(), CodecError> {
        let found = BankHeader::from_bytes(bank).map_err(|_| CodecError::Truncated(bank.len()))?;
        if !found.matches(&self.flavor) {
            return Err(CodecError::FlavorMismatch {
                expected: self.flavor.header(),
                found,
            });
        }
        self.decode(bank)
    }

    /// Dump the record to stdout
    pub fn dump(&self, verbose: bool) -> Result<(), CodecError> {
        let stdout = io::stdout();
        let mut lock = stdout.lock();
        self.dump_to(&mut lock, verbose)
    }

    /// Dump the record to `out`; a record that would not encode is refused
    pub fn dump_to(&self, out: &mut dyn Write, verbose: bool) -> Result<(), CodecError> {
        self.record.validate()?;
        self.record.render(out, verbose)?;
        Ok(())
    }

    /// Bytes of the last encoding, `None` before the first encode
    pub fn buffer(&self) -> Option<&[u8]> {
        self.buffer.as_ref().map(PackBuffer::as_bytes)
    }
}

impl BankCodec<Hyp1Record> {
    pub fn hyp1() -> Self {
        Self::new(HYP1)
    }

    pub fn hyp1_with_config(config: CodecConfig) -> Self {
        Self::with_config(HYP1, config)
    }

    pub fn brhyp1() -> Self {
        Self::new(BRHYP1)
    }

    pub fn lrhyp1() -> Self {
        Self::new(LRHYP1)
    }
}
