// SPDX-License-Identifier: MIT
//! DST block writer

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use tracing::debug;

use super::{
    BankSink, WriteError, BLOCK_LEN, CONTINUE, END_BANK, END_BLOCK_LOGICAL, FILLER, OPCODE,
    START_BANK, START_BLOCK, TO_BE_CONTD,
};
use crate::config::CodecConfig;

/// `OPCODE` + command + `i32`
const WORD_LEN: usize = 6;

/// Room kept free in every block for a segment header, its trailer and the
/// closing `END_BLOCK_LOGICAL`
const SEGMENT_OVERHEAD: usize = WORD_LEN + WORD_LEN + 2;

/// Writes banks into 32000-byte DST blocks, splitting them across blocks
/// where needed
pub struct DstWriter<W: Write> {
    inner: W,
    block: Vec<u8>,
    block_number: i32,
    banks_written: u64,
}

impl<W: Write> DstWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            block: Vec::with_capacity(BLOCK_LEN),
            block_number: 0,
            banks_written: 0,
        }
    }

    /// Append one packed bank
    pub fn write_bank(&mut self, bank: &[u8]) -> Result<(), WriteError> {
        let max = i32::MAX as usize;
        if bank.len() > max {
            return Err(WriteError::BankTooLarge {
                len: bank.len(),
                max,
            });
        }

        let mut hasher = crc32fast::Hasher::new();
        let mut remaining = bank;
        let mut first = true;

        loop {
            self.start_block_if_needed();
            let room = BLOCK_LEN.saturating_sub(self.block.len() + SEGMENT_OVERHEAD);
            if room == 0 && !(remaining.is_empty() && first) {
                self.finish_block()?;
                continue;
            }

            let (segment, rest) = remaining.split_at(room.min(remaining.len()));
            let command = if first { START_BANK } else { CONTINUE };
            self.push_word(command, segment.len() as i32);
            self.block.extend_from_slice(segment);
            hasher.update(segment);
            remaining = rest;
            first = false;

            let crc = hasher.clone().finalize() as i32;
            if remaining.is_empty() {
                self.push_word(END_BANK, crc);
                break;
            }
            self.push_word(TO_BE_CONTD, crc);
            self.finish_block()?;
        }

        self.banks_written += 1;
        Ok(())
    }

    fn start_block_if_needed(&mut self) {
        if self.block.is_empty() {
            self.push_word(START_BLOCK, self.block_number);
        }
    }

    fn push_word(&mut self, command: u8, value: i32) {
        self.block.push(OPCODE);
        self.block.push(command);
        self.block.extend_from_slice(&value.to_le_bytes());
    }

    /// Close the current block with a logical end marker and filler
    fn finish_block(&mut self) -> Result<(), WriteError> {
        if self.block.is_empty() {
            return Ok(());
        }
        self.block.push(OPCODE);
        self.block.push(END_BLOCK_LOGICAL);
        self.block.resize(BLOCK_LEN, FILLER);
        self.inner.write_all(&self.block)?;
        debug!(block = self.block_number, "wrote DST block");
        self.block.clear();
        self.block_number += 1;
        Ok(())
    }

    /// Number of banks written so far
    pub fn banks_written(&self) -> u64 {
        self.banks_written
    }

    /// Number of complete blocks flushed to the underlying writer
    pub fn blocks_written(&self) -> i32 {
        self.block_number
    }

    /// Close the last block, flush, and hand back the underlying writer
    pub fn finish(mut self) -> Result<W, WriteError> {
        self.finish_block()?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> BankSink for DstWriter<W> {
    fn write_bank(&mut self, bank: &[u8]) -> Result<(), WriteError> {
        DstWriter::write_bank(self, bank)
    }
}

/// Output file, compressed when the path ends in `.gz` or `.bz2`
pub enum OutputFile {
    Plain(BufWriter<File>),
    #[cfg(feature = "compression")]
    Gzip(flate2::write::GzEncoder<BufWriter<File>>),
    #[cfg(feature = "bz2")]
    Bzip2(bzip2::write::BzEncoder<BufWriter<File>>),
}

impl OutputFile {
    pub fn create(path: impl AsRef<Path>, config: &CodecConfig) -> Result<Self, WriteError> {
        let path = path.as_ref();
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("gz") => Self::create_gzip(path, config),
            Some("bz2") => Self::create_bzip2(path),
            _ => Ok(OutputFile::Plain(BufWriter::new(File::create(path)?))),
        }
    }

    #[cfg(feature = "compression")]
    fn create_gzip(path: &Path, config: &CodecConfig) -> Result<Self, WriteError> {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        let file = BufWriter::new(File::create(path)?);
        Ok(OutputFile::Gzip(GzEncoder::new(
            file,
            Compression::new(config.gzip_level),
        )))
    }

    #[cfg(not(feature = "compression"))]
    fn create_gzip(path: &Path, _config: &CodecConfig) -> Result<Self, WriteError> {
        Err(WriteError::InvalidFormat(format!(
            "{}: gzip output requires the `compression` feature",
            path.display()
        )))
    }

    #[cfg(feature = "bz2")]
    fn create_bzip2(path: &Path) -> Result<Self, WriteError> {
        use bzip2::write::BzEncoder;
        use bzip2::Compression;
        let file = BufWriter::new(File::create(path)?);
        Ok(OutputFile::Bzip2(BzEncoder::new(file, Compression::default())))
    }

    #[cfg(not(feature = "bz2"))]
    fn create_bzip2(path: &Path) -> Result<Self, WriteError> {
        Err(WriteError::InvalidFormat(format!(
            "{}: bzip2 output requires the `bz2` feature",
            path.display()
        )))
    }

    /// Flush buffers and write the compression trailer, if any
    pub fn close(self) -> io::Result<()> {
        match self {
            OutputFile::Plain(mut file) => file.flush(),
            #[cfg(feature = "compression")]
            OutputFile::Gzip(encoder) => encoder.finish()?.flush(),
            #[cfg(feature = "bz2")]
            OutputFile::Bzip2(encoder) => encoder.finish()?.flush(),
        }
    }
}

impl Write for OutputFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            OutputFile::Plain(file) => file.write(buf),
            #[cfg(feature = "compression")]
            OutputFile::Gzip(encoder) => encoder.write(buf),
            #[cfg(feature = "bz2")]
            OutputFile::Bzip2(encoder) => encoder.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            OutputFile::Plain(file) => file.flush(),
            #[cfg(feature = "compression")]
            OutputFile::Gzip(encoder) => encoder.flush(),
            #[cfg(feature = "bz2")]
            OutputFile::Bzip2(encoder) => encoder.flush(),
        }
    }
}

impl DstWriter<OutputFile> {
    /// Create a DST file, compressed if the path ends in `.gz` or `.bz2`
    pub fn create(path: impl AsRef<Path>, config: &CodecConfig) -> Result<Self, WriteError> {
        Ok(Self::new(OutputFile::create(path, config)?))
    }

    /// Finish the last block and close the file
    pub fn close(self) -> Result<(), WriteError> {
        self.finish()?.close()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(bytes: &[u8], at: usize) -> (u8, u8, i32) {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&bytes[at + 2..at + 6]);
        (bytes[at], bytes[at + 1], i32::from_le_bytes(raw))
    }

    #[test]
    fn test_single_bank_block_layout() {
        let bank: Vec<u8> = (0..20).collect();
        let mut writer = DstWriter::new(Vec::new());
        writer.write_bank(&bank).unwrap();
        let bytes = writer.finish().unwrap();

        assert_eq!(bytes.len(), BLOCK_LEN);
        assert_eq!(word(&bytes, 0), (OPCODE, START_BLOCK, 0));
        assert_eq!(word(&bytes, 6), (OPCODE, START_BANK, 20));
        assert_eq!(&bytes[12..32], bank.as_slice());

        let (op, cmd, crc) = word(&bytes, 32);
        assert_eq!((op, cmd), (OPCODE, END_BANK));
        assert_eq!(crc as u32, crc32fast::hash(&bank));

        assert_eq!(&bytes[38..40], &[OPCODE, END_BLOCK_LOGICAL]);
        assert!(bytes[40..].iter().all(|&b| b == FILLER));
    }

    #[test]
    fn test_large_bank_spans_blocks() {
        let bank = vec![0xABu8; BLOCK_LEN + 5_000];
        let mut writer = DstWriter::new(Vec::new());
        writer.write_bank(&bank).unwrap();
        assert_eq!(writer.blocks_written(), 1);
        let bytes = writer.finish().unwrap();
        assert_eq!(bytes.len(), 2 * BLOCK_LEN);

        let first_len = BLOCK_LEN - WORD_LEN - SEGMENT_OVERHEAD;
        assert_eq!(word(&bytes, 6), (OPCODE, START_BANK, first_len as i32));
        let (_, cmd, _) = word(&bytes, 12 + first_len);
        assert_eq!(cmd, TO_BE_CONTD);

        let second = &bytes[BLOCK_LEN..];
        assert_eq!(word(second, 0), (OPCODE, START_BLOCK, 1));
        assert_eq!(
            word(second, 6),
            (OPCODE, CONTINUE, (bank.len() - first_len) as i32)
        );
    }

    #[test]
    fn test_empty_writer_writes_nothing() {
        let writer = DstWriter::new(Vec::new());
        assert!(writer.finish().unwrap().is_empty());
    }

    #[test]
    fn test_vec_sink_collects_banks() {
        let mut sink: Vec<Vec<u8>> = Vec::new();
        sink.write_bank(&[1, 2, 3]).unwrap();
        assert_eq!(sink, vec![vec![1, 2, 3]]);
    }
}
