// SPDX-License-Identifier: MIT
//! Sequential DST file units
//!
//! A DST file is a sequence of fixed 32000-byte blocks. Inside a block,
//! control words (`OPCODE` followed by a command byte) frame the data:
//!
//! ```text
//! [60 61 <i32 block#>]                       start of block
//! [60 07 <i32 len> <len bytes>]              first segment of a bank
//! [60 0F <i32 crc>]                          bank continues in the next block
//! [60 08 <i32 len> <len bytes>]              continuation segment
//! [60 0E <i32 crc>]                          end of bank
//! [60 62] 64 64 64 ...                       logical end of block, filler
//! ```
//!
//! Control words never straddle a block boundary. The CRC is the CRC-32 of
//! the bank bytes written so far.

mod events;
mod reader;
mod writer;

pub use events::{Event, Events};
pub use reader::{DstReader, InputFile, RawBank};
pub use writer::{DstWriter, OutputFile};

/// Size of every physical block
pub const BLOCK_LEN: usize = 32_000;

pub const OPCODE: u8 = 0x60;
pub const START_BLOCK: u8 = 0x61;
pub const END_BLOCK_LOGICAL: u8 = 0x62;
pub const END_BLOCK_PHYSICAL: u8 = 0x63;
pub const FILLER: u8 = 0x64;

pub const START_BANK: u8 = 0x07;
pub const CONTINUE: u8 = 0x08;
pub const END_BANK: u8 = 0x0E;
pub const TO_BE_CONTD: u8 = 0x0F;

/// Errors that can occur during writing
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bank too large: {len} bytes (max {max})")]
    BankTooLarge { len: usize, max: usize },

    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

/// Errors that can occur during reading
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("CRC mismatch in block {block}: stored {stored:#010x}, computed {computed:#010x}")]
    CrcMismatch {
        block: u64,
        stored: u32,
        computed: u32,
    },
}

/// Destination for packed banks
pub trait BankSink {
    fn write_bank(&mut self, bank: &[u8]) -> Result<(), WriteError>;
}

/// Collects banks in memory
impl BankSink for Vec<Vec<u8>> {
    fn write_bank(&mut self, bank: &[u8]) -> Result<(), WriteError> {
        self.push(bank.to_vec());
        Ok(())
    }
}
