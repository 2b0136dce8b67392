// SPDX-License-Identifier: MIT
//! Sequence with a logical length and a retained stale tail
//!
//! Decoding a bank into a record that already holds data only overwrites the
//! first `n` entries of each repeated group. Entries past `n` keep whatever an
//! earlier, larger record left there. [`Slots`] models exactly that: the
//! logical range `[0, len)` is what equality, iteration, serialization and
//! encoding see, while the stale tail stays reachable through
//! [`Slots::stale_tail`].

use std::ops::{Index, IndexMut};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone)]
pub struct Slots<T> {
    items: Vec<T>,
    len: usize,
}

impl<T> Slots<T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            len: 0,
        }
    }

    pub fn from_vec(items: Vec<T>) -> Self {
        let len = items.len();
        Self { items, len }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.items[..self.len]
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.items[..self.len]
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.as_slice().iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.as_mut_slice().iter_mut()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.as_slice().get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.as_mut_slice().get_mut(index)
    }

    /// Append a value, overwriting the first stale slot if there is one
    pub fn push(&mut self, value: T) {
        if self.len < self.items.len() {
            self.items[self.len] = value;
        } else {
            self.items.push(value);
        }
        self.len += 1;
    }

    /// Shrink the logical range to `len`; dropped entries become stale
    pub fn truncate(&mut self, len: usize) {
        self.len = self.len.min(len);
    }

    /// Empty the logical range; every entry becomes stale
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Entries past the logical range left behind by earlier contents
    pub fn stale_tail(&self) -> &[T] {
        &self.items[self.len..]
    }

    /// Drop the stale tail for good
    pub fn discard_stale(&mut self) {
        self.items.truncate(self.len);
    }

    pub fn into_vec(mut self) -> Vec<T> {
        self.items.truncate(self.len);
        self.items
    }
}

impl<T: Default> Slots<T> {
    /// Set the logical length to `len` without touching existing entries.
    ///
    /// Slots that already exist keep their contents (stale or not); missing
    /// ones are filled with `T::default()`.
    pub fn reuse(&mut self, len: usize) {
        if self.items.len() < len {
            self.items.resize_with(len, T::default);
        }
        self.len = len;
    }
}

impl<T> Default for Slots<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: PartialEq> PartialEq for Slots<T> {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl<T> Index<usize> for Slots<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        &self.as_slice()[index]
    }
}

impl<T> IndexMut<usize> for Slots<T> {
    fn index_mut(&mut self, index: usize) -> &mut T {
        &mut self.as_mut_slice()[index]
    }
}

impl<T> From<Vec<T>> for Slots<T> {
    fn from(items: Vec<T>) -> Self {
        Self::from_vec(items)
    }
}

impl<T> FromIterator<T> for Slots<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from_vec(iter.into_iter().collect())
    }
}

impl<'a, T> IntoIterator for &'a Slots<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T: Serialize> Serialize for Slots<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.as_slice().serialize(serializer)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Slots<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::<T>::deserialize(deserializer).map(Self::from_vec)
    }
}
