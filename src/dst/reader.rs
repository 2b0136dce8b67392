// SPDX-License-Identifier: MIT
//! DST block reader

use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::ops::Range;
use std::path::Path;

use tracing::{debug, warn};

use super::{
    ReadError, BLOCK_LEN, CONTINUE, END_BANK, END_BLOCK_LOGICAL, END_BLOCK_PHYSICAL, OPCODE,
    START_BANK, START_BLOCK, TO_BE_CONTD,
};
use crate::config::CodecConfig;
use crate::format::{bank_name, BankHeader, BANK_HEADER_SIZE};

/// A reassembled bank, header bytes included
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBank {
    pub id: i32,
    pub version: i32,
    pub data: Vec<u8>,
}

impl RawBank {
    /// Wrap packed bank bytes; `None` if they are shorter than a header
    pub fn from_bytes(data: Vec<u8>) -> Option<Self> {
        let header = BankHeader::from_bytes(&data).ok()?;
        Some(Self {
            id: header.id,
            version: header.version,
            data,
        })
    }

    pub fn header(&self) -> BankHeader {
        BankHeader {
            id: self.id,
            version: self.version,
        }
    }

    /// Conventional name, or the numeric id for unknown banks
    pub fn name(&self) -> String {
        bank_name(self.id)
            .map(str::to_string)
            .unwrap_or_else(|| self.id.to_string())
    }

    /// Fallback dump for banks without a dedicated schema
    pub fn dump_generic(&self, out: &mut dyn Write, short: bool) -> io::Result<()> {
        if short {
            writeln!(
                out,
                "Bank: {} (ver: {}) - [Generic Short Dump]",
                self.name(),
                self.version
            )
        } else {
            writeln!(out, "Bank: {} (ver: {})", self.name(), self.version)?;
            writeln!(out, "  id: {}", self.id)?;
            writeln!(
                out,
                "  length: {} bytes ({} payload)",
                self.data.len(),
                self.data.len().saturating_sub(BANK_HEADER_SIZE)
            )
        }
    }
}

/// Reads banks back out of DST blocks.
///
/// Yields one [`RawBank`] per `END_BANK` marker. Stray filler and unknown
/// commands are skipped; framing anomalies that can be recovered from are
/// logged and skipped, the rest end the stream with an error.
pub struct DstReader<R: Read> {
    inner: R,
    block: Vec<u8>,
    cursor: usize,
    blocks_read: u64,
    current: Vec<u8>,
    hasher: crc32fast::Hasher,
    building: bool,
    verify_crc: bool,
    done: bool,
}

impl<R: Read> DstReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            block: vec![0u8; BLOCK_LEN],
            cursor: BLOCK_LEN,
            blocks_read: 0,
            current: Vec::new(),
            hasher: crc32fast::Hasher::new(),
            building: false,
            verify_crc: false,
            done: false,
        }
    }

    /// Check stored CRCs against the reassembled bank bytes
    pub fn with_verify_crc(mut self, verify: bool) -> Self {
        self.verify_crc = verify;
        self
    }

    pub fn blocks_read(&self) -> u64 {
        self.blocks_read
    }

    /// Load the next full block; `false` at end of input
    fn read_block(&mut self) -> Result<bool, ReadError> {
        let mut filled = 0;
        while filled < BLOCK_LEN {
            match self.inner.read(&mut self.block[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        if filled < BLOCK_LEN {
            if filled > 0 {
                warn!(bytes = filled, "last DST block incomplete, ignoring it");
            }
            return Ok(false);
        }
        self.blocks_read += 1;
        self.cursor = 0;
        Ok(true)
    }

    fn read_i32(&mut self) -> Result<i32, ReadError> {
        let end = self.cursor + 4;
        if end > BLOCK_LEN {
            return Err(ReadError::InvalidFormat(format!(
                "control word crosses the end of block {}",
                self.blocks_read
            )));
        }
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&self.block[self.cursor..end]);
        self.cursor = end;
        Ok(i32::from_le_bytes(raw))
    }

    /// Byte range of the segment following a `START_BANK`/`CONTINUE` word
    fn next_segment(&mut self) -> Result<Range<usize>, ReadError> {
        let len = self.read_i32()?;
        let len = usize::try_from(len).map_err(|_| {
            ReadError::InvalidFormat(format!("negative segment length {}", len))
        })?;
        let end = self.cursor + len;
        if end > BLOCK_LEN {
            return Err(ReadError::InvalidFormat(format!(
                "segment of {} bytes overruns block {}",
                len, self.blocks_read
            )));
        }
        let range = self.cursor..end;
        self.cursor = end;
        Ok(range)
    }

    fn append_segment(&mut self) -> Result<(), ReadError> {
        let range = self.next_segment()?;
        let segment = &self.block[range];
        self.current.extend_from_slice(segment);
        self.hasher.update(segment);
        Ok(())
    }

    fn reset_bank(&mut self) {
        self.current.clear();
        self.hasher = crc32fast::Hasher::new();
        self.building = false;
    }

    fn check_crc(&self, stored: i32) -> Result<(), ReadError> {
        if !self.verify_crc {
            return Ok(());
        }
        let computed = self.hasher.clone().finalize();
        let stored = stored as u32;
        if computed != stored {
            return Err(ReadError::CrcMismatch {
                block: self.blocks_read,
                stored,
                computed,
            });
        }
        Ok(())
    }

    fn next_bank(&mut self) -> Result<Option<RawBank>, ReadError> {
        loop {
            if self.cursor >= BLOCK_LEN && !self.read_block()? {
                if self.building {
                    warn!(
                        bytes = self.current.len(),
                        "end of file inside a bank, dropping it"
                    );
                }
                return Ok(None);
            }

            if self.block[self.cursor] != OPCODE {
                self.cursor += 1;
                continue;
            }
            if self.cursor + 1 >= BLOCK_LEN {
                self.cursor += 1;
                continue;
            }
            let command = self.block[self.cursor + 1];
            self.cursor += 2;

            match command {
                START_BLOCK => {
                    self.read_i32()?;
                }
                END_BLOCK_LOGICAL | END_BLOCK_PHYSICAL => {
                    self.cursor = BLOCK_LEN;
                }
                START_BANK => {
                    if self.building {
                        warn!("START_BANK while a bank is still open, discarding it");
                        self.reset_bank();
                    }
                    self.append_segment()?;
                    self.building = true;
                }
                CONTINUE => {
                    if self.building {
                        self.append_segment()?;
                    } else {
                        warn!("CONTINUE without START_BANK, skipping segment");
                        self.next_segment()?;
                    }
                }
                END_BANK => {
                    let stored = self.read_i32()?;
                    if !self.building {
                        continue;
                    }
                    self.check_crc(stored)?;
                    let data = std::mem::take(&mut self.current);
                    self.reset_bank();
                    match RawBank::from_bytes(data) {
                        Some(bank) => {
                            debug!(id = bank.id, len = bank.data.len(), "read bank");
                            return Ok(Some(bank));
                        }
                        None => warn!("bank shorter than its header, skipping"),
                    }
                }
                TO_BE_CONTD => {
                    let stored = self.read_i32()?;
                    if self.building {
                        self.check_crc(stored)?;
                    }
                }
                _ => {}
            }
        }
    }
}

impl<R: Read> Iterator for DstReader<R> {
    type Item = Result<RawBank, ReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_bank() {
            Ok(Some(bank)) => Some(Ok(bank)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Input file, decompressed on the fly when the path ends in `.gz` or `.bz2`
pub enum InputFile {
    Plain(BufReader<File>),
    #[cfg(feature = "compression")]
    Gzip(BufReader<flate2::read::MultiGzDecoder<File>>),
    #[cfg(feature = "bz2")]
    Bzip2(BufReader<bzip2::read::MultiBzDecoder<File>>),
}

impl InputFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ReadError> {
        let path = path.as_ref();
        let ext = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");
        match ext {
            "gz" => Self::open_gzip(path),
            "bz2" => Self::open_bzip2(path),
            _ => Ok(InputFile::Plain(BufReader::new(File::open(path)?))),
        }
    }

    #[cfg(feature = "compression")]
    fn open_gzip(path: &Path) -> Result<Self, ReadError> {
        let file = File::open(path)?;
        Ok(InputFile::Gzip(BufReader::new(
            flate2::read::MultiGzDecoder::new(file),
        )))
    }

    #[cfg(not(feature = "compression"))]
    fn open_gzip(path: &Path) -> Result<Self, ReadError> {
        Err(ReadError::InvalidFormat(format!(
            "{}: gzip input requires the `compression` feature",
            path.display()
        )))
    }

    #[cfg(feature = "bz2")]
    fn open_bzip2(path: &Path) -> Result<Self, ReadError> {
        let file = File::open(path)?;
        Ok(InputFile::Bzip2(BufReader::new(
            bzip2::read::MultiBzDecoder::new(file),
        )))
    }

    #[cfg(not(feature = "bz2"))]
    fn open_bzip2(path: &Path) -> Result<Self, ReadError> {
        Err(ReadError::InvalidFormat(format!(
            "{}: bzip2 input requires the `bz2` feature",
            path.display()
        )))
    }
}

impl Read for InputFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            InputFile::Plain(file) => file.read(buf),
            #[cfg(feature = "compression")]
            InputFile::Gzip(decoder) => decoder.read(buf),
            #[cfg(feature = "bz2")]
            InputFile::Bzip2(decoder) => decoder.read(buf),
        }
    }
}

impl DstReader<InputFile> {
    /// Open a DST file, `.dst`, `.dst.gz` or `.dst.bz2`
    pub fn open(path: impl AsRef<Path>, config: &CodecConfig) -> Result<Self, ReadError> {
        Ok(Self::new(InputFile::open(path)?).with_verify_crc(config.verify_crc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dst::DstWriter;
    use crate::dst::FILLER;

    fn bank(id: i32, payload: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&id.to_le_bytes());
        bytes.extend_from_slice(&0i32.to_le_bytes());
        bytes.extend_from_slice(payload);
        bytes
    }

    fn write_all(banks: &[Vec<u8>]) -> Vec<u8> {
        let mut writer = DstWriter::new(Vec::new());
        for b in banks {
            writer.write_bank(b).unwrap();
        }
        writer.finish().unwrap()
    }

    #[test]
    fn test_round_trip_small_banks() {
        let banks = vec![bank(1, b"abc"), bank(2, &[]), bank(13300, &[9; 100])];
        let bytes = write_all(&banks);

        let read: Vec<RawBank> = DstReader::new(bytes.as_slice())
            .with_verify_crc(true)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(read.len(), 3);
        assert_eq!(read[0].data, banks[0]);
        assert_eq!(read[1].id, 2);
        assert_eq!(read[2].name(), "hyp1");
    }

    #[test]
    fn test_round_trip_bank_spanning_three_blocks() {
        let payload: Vec<u8> = (0..70_000u32).map(|i| (i % 251) as u8).collect();
        let banks = vec![bank(7, b"head"), bank(8, &payload), bank(9, b"tail")];
        let bytes = write_all(&banks);
        assert_eq!(bytes.len() % BLOCK_LEN, 0);

        let mut reader = DstReader::new(bytes.as_slice()).with_verify_crc(true);
        let read: Vec<RawBank> = reader.by_ref().collect::<Result<_, _>>().unwrap();
        assert_eq!(
            read.iter().map(|b| b.data.clone()).collect::<Vec<_>>(),
            banks
        );
        assert_eq!(reader.blocks_read(), 3);
    }

    #[test]
    fn test_crc_mismatch_detected_when_enabled() {
        let mut bytes = write_all(&[bank(5, b"payload")]);
        // Corrupt one payload byte: START_BLOCK(6) + START_BANK(6) + header(8)
        bytes[20] ^= 0xFF;

        let lenient: Vec<_> = DstReader::new(bytes.as_slice()).collect();
        assert_eq!(lenient.len(), 1);
        assert!(lenient[0].is_ok());

        let mut strict = DstReader::new(bytes.as_slice()).with_verify_crc(true);
        assert!(matches!(
            strict.next(),
            Some(Err(ReadError::CrcMismatch { .. }))
        ));
        assert!(strict.next().is_none());
    }

    #[test]
    fn test_incomplete_trailing_block_is_ignored() {
        let mut bytes = write_all(&[bank(1, b"x")]);
        bytes.extend_from_slice(&[FILLER; 100]);
        let read: Vec<_> = DstReader::new(bytes.as_slice()).collect();
        assert_eq!(read.len(), 1);
    }

    #[test]
    fn test_continue_without_start_is_skipped() {
        let mut block = vec![FILLER; BLOCK_LEN];
        let mut at = 0;
        let mut put = |bytes: &[u8]| {
            block[at..at + bytes.len()].copy_from_slice(bytes);
            at += bytes.len();
        };
        put(&[OPCODE, START_BLOCK, 0, 0, 0, 0]);
        put(&[OPCODE, CONTINUE]);
        put(&3i32.to_le_bytes());
        put(&[OPCODE, OPCODE, OPCODE]);
        put(&[OPCODE, START_BANK]);
        put(&8i32.to_le_bytes());
        put(&bank(4, &[]));
        put(&[OPCODE, END_BANK, 0, 0, 0, 0]);
        put(&[OPCODE, END_BLOCK_LOGICAL]);

        let read: Vec<RawBank> = DstReader::new(block.as_slice())
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].id, 4);
    }

    #[test]
    fn test_generic_dump() {
        let raw = RawBank::from_bytes(bank(12093, &[0; 12])).unwrap();
        let mut out = Vec::new();
        raw.dump_generic(&mut out, true).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Bank: fdplane (ver: 0) - [Generic Short Dump]\n"
        );

        let unknown = RawBank::from_bytes(bank(77, &[])).unwrap();
        let mut out = Vec::new();
        unknown.dump_generic(&mut out, false).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Bank: 77 (ver: 0)\n  id: 77\n  length: 8 bytes (0 payload)\n"
        );
    }

    #[cfg(not(feature = "bz2"))]
    #[test]
    fn test_bz2_needs_feature() {
        assert!(matches!(
            InputFile::open("events.dst.bz2"),
            Err(ReadError::InvalidFormat(_))
        ));
    }

    #[cfg(feature = "bz2")]
    #[test]
    fn test_missing_bz2_file_is_io_error() {
        assert!(matches!(
            InputFile::open("absent.dst.bz2"),
            Err(ReadError::Io(_))
        ));
    }
}
