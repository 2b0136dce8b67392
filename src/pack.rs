// SPDX-License-Identifier: MIT
//! Little-endian packing primitives
//!
//! [`PackBuffer`] appends typed values to an owned byte buffer bounded by a
//! capacity; [`UnpackCursor`] reads them back from a borrowed slice. Both
//! operate on whole slices at a time and either move the whole slice or
//! nothing, so a failed call never leaves a half-written value behind.

/// Errors raised by the packing primitives
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BufferError {
    #[error("buffer overflow at offset {offset}: need {needed} bytes, capacity {capacity}")]
    Overflow {
        offset: usize,
        needed: usize,
        capacity: usize,
    },

    #[error("buffer underflow at offset {offset}: need {needed} bytes, {available} available")]
    Underflow {
        offset: usize,
        needed: usize,
        available: usize,
    },
}

/// Fixed-width value with a little-endian wire form
pub trait Primitive: Copy + Default {
    /// Encoded width in bytes
    const SIZE: usize;

    /// Write `self` into `out`, which is exactly `SIZE` bytes long
    fn put(self, out: &mut [u8]);

    /// Read a value from `src`, which is exactly `SIZE` bytes long
    fn get(src: &[u8]) -> Self;
}

macro_rules! impl_primitive {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Primitive for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                #[inline]
                fn put(self, out: &mut [u8]) {
                    out.copy_from_slice(&self.to_le_bytes());
                }

                #[inline]
                fn get(src: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(src);
                    <$ty>::from_le_bytes(raw)
                }
            }
        )*
    };
}

impl_primitive!(i8, u8, i16, i32, f32, f64);

/// Growable output buffer with a write cursor and a hard capacity
#[derive(Debug, Clone)]
pub struct PackBuffer {
    data: Vec<u8>,
    capacity: usize,
}

impl PackBuffer {
    /// Create an empty buffer that refuses to grow past `capacity` bytes
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Rewind the cursor to the start; allocated memory is kept
    pub fn reset(&mut self) {
        self.data.clear();
    }

    /// Append all of `values`, or nothing if they do not fit
    pub fn pack<T: Primitive>(&mut self, values: &[T]) -> Result<(), BufferError> {
        let start = self.reserve(values.len() * T::SIZE)?;
        for (value, out) in values
            .iter()
            .zip(self.data[start..].chunks_exact_mut(T::SIZE))
        {
            value.put(out);
        }
        Ok(())
    }

    #[inline]
    pub fn pack_one<T: Primitive>(&mut self, value: T) -> Result<(), BufferError> {
        self.pack(std::slice::from_ref(&value))
    }

    /// Append every item of an exactly sized iterator, or nothing
    pub fn pack_iter<T, I>(&mut self, values: I) -> Result<(), BufferError>
    where
        T: Primitive,
        I: IntoIterator<Item = T>,
        I::IntoIter: ExactSizeIterator,
    {
        let values = values.into_iter();
        let start = self.reserve(values.len() * T::SIZE)?;
        for (value, out) in values.zip(self.data[start..].chunks_exact_mut(T::SIZE)) {
            value.put(out);
        }
        Ok(())
    }

    /// Grow the written region by `needed` zeroed bytes, returning where it began
    fn reserve(&mut self, needed: usize) -> Result<usize, BufferError> {
        let offset = self.data.len();
        if offset + needed > self.capacity {
            return Err(BufferError::Overflow {
                offset,
                needed,
                capacity: self.capacity,
            });
        }
        self.data.resize(offset + needed, 0);
        Ok(offset)
    }

    /// Bytes written so far
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The written bytes
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

/// Read cursor over packed bytes
#[derive(Debug, Clone)]
pub struct UnpackCursor<'a> {
    data: &'a [u8],
    pos: usize,
    limit: usize,
}

impl<'a> UnpackCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            limit: data.len(),
        }
    }

    /// Cursor that never reads past `capacity`, even if `data` is longer
    pub fn with_capacity(data: &'a [u8], capacity: usize) -> Self {
        Self {
            data,
            pos: 0,
            limit: capacity.min(data.len()),
        }
    }

    /// Move the cursor to an absolute offset
    pub fn seek(&mut self, pos: usize) -> Result<(), BufferError> {
        if pos > self.limit {
            return Err(BufferError::Underflow {
                offset: self.pos,
                needed: pos - self.pos,
                available: self.remaining(),
            });
        }
        self.pos = pos;
        Ok(())
    }

    /// Fill `out` from the cursor, or leave it untouched if too few bytes remain
    pub fn unpack<T: Primitive>(&mut self, out: &mut [T]) -> Result<(), BufferError> {
        let bytes = self.take(out.len() * T::SIZE)?;
        for (slot, src) in out.iter_mut().zip(bytes.chunks_exact(T::SIZE)) {
            *slot = T::get(src);
        }
        Ok(())
    }

    #[inline]
    pub fn unpack_one<T: Primitive>(&mut self) -> Result<T, BufferError> {
        let bytes = self.take(T::SIZE)?;
        Ok(T::get(bytes))
    }

    /// Read `count` values, handing each to `sink` with its index
    pub fn unpack_each<T, F>(&mut self, count: usize, mut sink: F) -> Result<(), BufferError>
    where
        T: Primitive,
        F: FnMut(usize, T),
    {
        let bytes = self.take(count * T::SIZE)?;
        for (index, src) in bytes.chunks_exact(T::SIZE).enumerate() {
            sink(index, T::get(src));
        }
        Ok(())
    }

    fn take(&mut self, needed: usize) -> Result<&'a [u8], BufferError> {
        if needed > self.remaining() {
            return Err(BufferError::Underflow {
                offset: self.pos,
                needed,
                available: self.remaining(),
            });
        }
        let data: &'a [u8] = self.data;
        let bytes = &data[self.pos..self.pos + needed];
        self.pos += needed;
        Ok(bytes)
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.limit - self.pos
    }
}
