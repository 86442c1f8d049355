//! Fixed-capacity inline arrays

use crate::{Error, Result};
use std::ops::{Deref, Index, IndexMut};

/// Inline array of up to `N` elements with a run-time length
///
/// This is a plain value: copying it copies the elements, so it can be moved
/// into kernels without any indirection.
#[derive(Clone, Copy, Debug)]
pub struct FixedArray<T, const N: usize> {
    /// Storage, only the first `len` elements are meaningful
    items: [T; N],

    /// Number of meaningful elements
    len: usize,
}
//
impl<T: Copy + Default, const N: usize> FixedArray<T, N> {
    /// Empty array
    pub fn new() -> Self {
        Self {
            items: [T::default(); N],
            len: 0,
        }
    }

    /// Array holding a copy of `items`, which must fit within capacity
    pub fn from_slice(items: &[T]) -> Result<Self> {
        if items.len() > N {
            return Err(Error::CapacityExceeded {
                capacity: N,
                requested: items.len(),
            });
        }
        let mut result = Self::new();
        result.items[..items.len()].copy_from_slice(items);
        result.len = items.len();
        Ok(result)
    }

    /// Append an element, failing if the array is full
    pub fn push(&mut self, item: T) -> Result<()> {
        if self.len == N {
            return Err(Error::CapacityExceeded {
                capacity: N,
                requested: N + 1,
            });
        }
        self.items[self.len] = item;
        self.len += 1;
        Ok(())
    }
}
//
impl<T, const N: usize> FixedArray<T, N> {
    /// Maximal number of elements
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Number of elements
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Truth that the array holds no element
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Elements as a slice
    pub fn as_slice(&self) -> &[T] {
        &self.items[..self.len]
    }

    /// Elements as a mutable slice
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.items[..self.len]
    }
}
//
impl<T: Copy + Default, const N: usize> Default for FixedArray<T, N> {
    fn default() -> Self {
        Self::new()
    }
}
//
impl<T, const N: usize> Deref for FixedArray<T, N> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}
//
impl<T, const N: usize> Index<usize> for FixedArray<T, N> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        &self.as_slice()[index]
    }
}
//
impl<T, const N: usize> IndexMut<usize> for FixedArray<T, N> {
    fn index_mut(&mut self, index: usize) -> &mut T {
        &mut self.as_mut_slice()[index]
    }
}
//
impl<T: PartialEq, const N: usize> PartialEq for FixedArray<T, N> {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}
//
impl<T: Eq, const N: usize> Eq for FixedArray<T, N> {}
//
impl<'a, T, const N: usize> IntoIterator for &'a FixedArray<T, N> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.as_slice().iter()
    }
}
