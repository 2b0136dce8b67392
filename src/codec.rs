// SPDX-License-Identifier: MIT
//! Schema-driven bank encoding and decoding
//!
//! A [`BankSchema`] describes one bank layout as an ordered walk over its
//! fields. Encoding drives that walk through a [`FieldWriter`], decoding
//! through a [`FieldReader`]; both share the same failure policy:
//!
//! - [`ErrorMode::FailFast`] stops at the first failing field and reports it
//!   as [`CodecError::Field`];
//! - [`ErrorMode::Accumulate`] keeps walking, records every failing field and
//!   reports them together as [`CodecError::Accumulated`].

use std::fmt;
use std::io;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::dst::WriteError;
use crate::format::{BankHeader, BANK_HEADER_SIZE};
use crate::pack::{BufferError, PackBuffer, Primitive, UnpackCursor};

/// How a field walk reacts to a failing field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorMode {
    #[default]
    FailFast,
    Accumulate,
}

impl FromStr for ErrorMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail-fast" | "failfast" | "fail_fast" => Ok(ErrorMode::FailFast),
            "accumulate" => Ok(ErrorMode::Accumulate),
            other => Err(format!(
                "unknown error mode '{}' (expected 'fail-fast' or 'accumulate')",
                other
            )),
        }
    }
}

/// What went wrong with a single field
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldErrorKind {
    #[error(transparent)]
    Buffer(#[from] BufferError),

    #[error("count {count} outside [0, {max}]")]
    CountOutOfRange { count: i32, max: usize },
}

/// A failing field, with the fit/tube/hit index for repeated groups
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldFailure {
    pub field: &'static str,
    pub index: Option<usize>,
    pub kind: FieldErrorKind,
}

impl fmt::Display for FieldFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(index) => write!(f, "{}[{}]: {}", self.field, index, self.kind),
            None => write!(f, "{}: {}", self.field, self.kind),
        }
    }
}

/// Every failing field of an accumulated walk, in walk order
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldFailures(pub Vec<FieldFailure>);

impl FieldFailures {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FieldFailure> {
        self.0.iter()
    }

    /// Names of the failing fields, in walk order
    pub fn fields(&self) -> Vec<&'static str> {
        self.0.iter().map(|failure| failure.field).collect()
    }

    /// Summed status of the walk: one per failing primitive call
    pub fn legacy_status(&self) -> i32 {
        i32::try_from(self.0.len()).unwrap_or(i32::MAX)
    }
}

impl fmt::Display for FieldFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", failure)?;
        }
        Ok(())
    }
}

/// Errors from encoding, decoding and writing banks
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("invalid record: {field} = {count} exceeds maximum {max}")]
    InvalidRecord {
        field: &'static str,
        count: usize,
        max: usize,
    },

    #[error("invalid record: fit {fit} has {found} {field} entries, expected {expected}")]
    LengthMismatch {
        field: &'static str,
        fit: usize,
        found: usize,
        expected: usize,
    },

    #[error("field {0}")]
    Field(FieldFailure),

    #[error("{} field(s) failed: {0}", .0.len())]
    Accumulated(FieldFailures),

    #[error("bank header mismatch: expected {expected}, found {found}")]
    FlavorMismatch {
        expected: BankHeader,
        found: BankHeader,
    },

    #[error("bank truncated: {0} bytes is shorter than the bank header")]
    Truncated(usize),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("bank sink error: {0}")]
    Sink(#[from] WriteError),
}

impl CodecError {
    /// Nonzero status in the summed-return-code convention
    pub fn legacy_status(&self) -> i32 {
        match self {
            CodecError::Accumulated(failures) => failures.legacy_status(),
            _ => 1,
        }
    }

    /// Failing fields carried by this error, if any
    pub fn failures(&self) -> Vec<&FieldFailure> {
        match self {
            CodecError::Field(failure) => vec![failure],
            CodecError::Accumulated(failures) => failures.iter().collect(),
            _ => Vec::new(),
        }
    }
}

fn collect_failures(mode: ErrorMode, mut failures: Vec<FieldFailure>) -> Result<(), CodecError> {
    if failures.is_empty() {
        return Ok(());
    }
    match mode {
        ErrorMode::FailFast => Err(CodecError::Field(failures.swap_remove(0))),
        ErrorMode::Accumulate => Err(CodecError::Accumulated(FieldFailures(failures))),
    }
}

/// Encoding side of a field walk
pub struct FieldWriter<'a> {
    buffer: &'a mut PackBuffer,
    mode: ErrorMode,
    failures: Vec<FieldFailure>,
}

impl<'a> FieldWriter<'a> {
    pub fn new(buffer: &'a mut PackBuffer, mode: ErrorMode) -> Self {
        Self {
            buffer,
            mode,
            failures: Vec::new(),
        }
    }

    /// True once fail-fast mode has seen a failure; later fields are skipped
    #[inline]
    pub fn halted(&self) -> bool {
        self.mode == ErrorMode::FailFast && !self.failures.is_empty()
    }

    /// Reset the buffer and stamp the bank header
    pub fn header(&mut self, header: BankHeader) {
        let result = header.write_to_buffer(self.buffer);
        self.note("header", None, result);
    }

    pub fn put<T: Primitive>(&mut self, field: &'static str, values: &[T]) {
        if self.halted() {
            return;
        }
        let result = self.buffer.pack(values);
        self.note(field, None, result);
    }

    /// Like [`put`](Self::put) for one member of a repeated group
    pub fn put_at<T: Primitive>(&mut self, field: &'static str, index: usize, values: &[T]) {
        if self.halted() {
            return;
        }
        let result = self.buffer.pack(values);
        self.note(field, Some(index), result);
    }

    pub fn put_one<T: Primitive>(&mut self, field: &'static str, value: T) {
        if self.halted() {
            return;
        }
        let result = self.buffer.pack_one(value);
        self.note(field, None, result);
    }

    /// Pack a column gathered from a repeated group
    pub fn put_iter<T, I>(&mut self, field: &'static str, values: I)
    where
        T: Primitive,
        I: IntoIterator<Item = T>,
        I::IntoIter: ExactSizeIterator,
    {
        if self.halted() {
            return;
        }
        let result = self.buffer.pack_iter(values);
        self.note(field, None, result);
    }

    fn note(&mut self, field: &'static str, index: Option<usize>, result: Result<(), BufferError>) {
        if let Err(err) = result {
            self.failures.push(FieldFailure {
                field,
                index,
                kind: err.into(),
            });
        }
    }

    /// Bytes written so far, header included
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// End the walk, returning the encoded length
    pub fn finish(self) -> Result<usize, CodecError> {
        let len = self.buffer.len();
        collect_failures(self.mode, self.failures)?;
        Ok(len)
    }
}

/// Decoding side of a field walk
pub struct FieldReader<'a> {
    cursor: UnpackCursor<'a>,
    mode: ErrorMode,
    failures: Vec<FieldFailure>,
}

impl<'a> FieldReader<'a> {
    /// Start reading right after the bank header
    pub fn new(bank: &'a [u8], capacity: usize, mode: ErrorMode) -> Result<Self, CodecError> {
        if bank.len() < BANK_HEADER_SIZE {
            return Err(CodecError::Truncated(bank.len()));
        }
        let mut cursor = UnpackCursor::with_capacity(bank, capacity);
        cursor
            .seek(BANK_HEADER_SIZE)
            .map_err(|_| CodecError::Truncated(bank.len()))?;
        Ok(Self {
            cursor,
            mode,
            failures: Vec::new(),
        })
    }

    #[inline]
    pub fn halted(&self) -> bool {
        self.mode == ErrorMode::FailFast && !self.failures.is_empty()
    }

    /// Fill `out`; on failure `out` keeps its previous contents
    pub fn get<T: Primitive>(&mut self, field: &'static str, out: &mut [T]) {
        if self.halted() {
            return;
        }
        let result = self.cursor.unpack(out);
        self.note(field, None, result);
    }

    pub fn get_at<T: Primitive>(&mut self, field: &'static str, index: usize, out: &mut [T]) {
        if self.halted() {
            return;
        }
        let result = self.cursor.unpack(out);
        self.note(field, Some(index), result);
    }

    pub fn get_one<T: Primitive>(&mut self, field: &'static str, out: &mut T) {
        self.get(field, std::slice::from_mut(out));
    }

    /// Scatter a packed column into a repeated group
    pub fn get_each<T, F>(&mut self, field: &'static str, count: usize, sink: F)
    where
        T: Primitive,
        F: FnMut(usize, T),
    {
        if self.halted() {
            return;
        }
        let result = self.cursor.unpack_each(count, sink);
        self.note(field, None, result);
    }

    /// Read a repeat count.
    ///
    /// A count outside `[0, max]` is recorded as a failure and clamped into
    /// range. If the count cannot be read at all, `current` is kept.
    pub fn count(&mut self, field: &'static str, current: usize, max: usize) -> usize {
        if self.halted() {
            return current;
        }
        let raw = match self.cursor.unpack_one::<i32>() {
            Ok(raw) => raw,
            Err(err) => {
                self.note(field, None, Err(err));
                return current;
            }
        };
        match usize::try_from(raw) {
            Ok(count) if count <= max => count,
            Ok(_) => {
                self.out_of_range(field, raw, max);
                max
            }
            Err(_) => {
                self.out_of_range(field, raw, max);
                0
            }
        }
    }

    fn out_of_range(&mut self, field: &'static str, count: i32, max: usize) {
        self.failures.push(FieldFailure {
            field,
            index: None,
            kind: FieldErrorKind::CountOutOfRange { count, max },
        });
    }

    fn note(&mut self, field: &'static str, index: Option<usize>, result: Result<(), BufferError>) {
        if let Err(err) = result {
            self.failures.push(FieldFailure {
                field,
                index,
                kind: err.into(),
            });
        }
    }

    pub fn position(&self) -> usize {
        self.cursor.position()
    }

    pub fn finish(self) -> Result<(), CodecError> {
        collect_failures(self.mode, self.failures)
    }
}

/// A bank layout: its in-memory record plus the ordered field walk
pub trait BankSchema: Default + Clone + fmt::Debug {
    /// Upper bound on the packed size of any valid record, header included
    const MAX_BANK_LEN: usize;

    /// Check the count invariants that encoding relies on
    fn validate(&self) -> Result<(), CodecError>;

    /// Walk every field after the header, in wire order
    fn encode_fields(&self, out: &mut FieldWriter<'_>);

    /// Walk every field after the header, in wire order
    fn decode_fields(&mut self, input: &mut FieldReader<'_>);

    /// Human-readable dump
    fn render(&self, out: &mut dyn io::Write, verbose: bool) -> io::Result<()>;
}

/// Encode `record` into `buffer` under `header`, returning the bank length
pub fn encode_bank<S: BankSchema>(
    record: &S,
    header: BankHeader,
    buffer: &mut PackBuffer,
    mode: ErrorMode,
) -> Result<usize, CodecError> {
    record.validate()?;
    let mut writer = FieldWriter::new(buffer, mode);
    writer.header(header);
    if !writer.halted() {
        record.encode_fields(&mut writer);
    }
    writer.finish()
}

/// Decode the fields of `bank` into `record`; the header is not checked
pub fn decode_bank<S: BankSchema>(
    record: &mut S,
    bank: &[u8],
    mode: ErrorMode,
) -> Result<(), CodecError> {
    let mut reader = FieldReader::new(bank, S::MAX_BANK_LEN, mode)?;
    record.decode_fields(&mut reader);
    reader.finish()
}
