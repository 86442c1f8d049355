//! Cell data containers that dispatched kernels may write to

use crate::{range::RANK, scalar::Scalar, Index, IterationRange};
use ndarray::Array3;
use std::{
    marker::PhantomData,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

/// Flat container of values that can be written through a shared reference
///
/// Writes to distinct elements may happen concurrently from any backend.
pub trait Field<T>: Send + Sync {
    /// Number of addressable elements
    fn element_count(&self) -> usize;

    /// Set the `index`-th element, `index` must be below `element_count()`
    fn set_at(&self, index: usize, value: T);
}

/// Ordered group of fields addressed as one flat index space
///
/// The first field covers flat indices `[0, len0)`, the second one covers
/// `[len0, len0 + len1)`, and so on.
pub struct FieldSet<T> {
    /// Fields, in flat index order
    fields: Vec<Arc<dyn Field<T>>>,

    /// End of each field's sub-range of the flat index space
    ends: Vec<usize>,
}
//
impl<T> FieldSet<T> {
    /// Group some fields together
    pub fn new(fields: impl IntoIterator<Item = Arc<dyn Field<T>>>) -> Self {
        let mut result = Self::default();
        for field in fields {
            result.push(field);
        }
        result
    }

    /// Append one more field
    pub fn push(&mut self, field: Arc<dyn Field<T>>) {
        let end = self.total_len() + field.element_count();
        self.fields.push(field);
        self.ends.push(end);
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Truth that this set contains no field
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Total number of elements across all fields
    pub fn total_len(&self) -> usize {
        self.ends.last().copied().unwrap_or(0)
    }

    /// Set the element at position `n` of the flat index space
    pub fn set_flat(&self, n: usize, value: T) {
        debug_assert!(n < self.total_len());
        let field = self.ends.partition_point(|&end| end <= n);
        let start = if field == 0 { 0 } else { self.ends[field - 1] };
        self.fields[field].set_at(n - start, value);
    }
}
//
impl<T> Clone for FieldSet<T> {
    fn clone(&self) -> Self {
        Self {
            fields: self.fields.clone(),
            ends: self.ends.clone(),
        }
    }
}
//
impl<T> Default for FieldSet<T> {
    fn default() -> Self {
        Self {
            fields: Vec::new(),
            ends: Vec::new(),
        }
    }
}
//
impl<T> FromIterator<Arc<dyn Field<T>>> for FieldSet<T> {
    fn from_iter<I: IntoIterator<Item = Arc<dyn Field<T>>>>(iter: I) -> Self {
        Self::new(iter)
    }
}

/// Scalar values attached to every cell of a 3-D box
///
/// Values are stored as atomic bit patterns, so that kernels running on any
/// backend can write to distinct cells through a shared reference. Storage
/// order is x-fastest, like the flat indices of [`IterationRange`].
pub struct GridField<T: Scalar> {
    /// Cells covered by this field
    range: IterationRange,

    /// Bit patterns of the cell values
    bits: Box<[AtomicU64]>,

    /// Element type
    value: PhantomData<T>,
}
//
impl<T: Scalar> GridField<T> {
    /// Allocate a field over the cells of `range`, with all cells set to `fill`
    ///
    /// Streams attached to `range` are not retained.
    pub fn new(range: &IterationRange, fill: T) -> Self {
        let begin = std::array::from_fn(|a| range.begin(a));
        let end = std::array::from_fn(|a| range.end(a));
        let range = IterationRange::new(begin, end);
        let bits = (0..range.size())
            .map(|_| AtomicU64::new(fill.to_bits()))
            .collect();
        Self {
            range,
            bits,
            value: PhantomData,
        }
    }

    /// Cells covered by this field
    pub fn range(&self) -> &IterationRange {
        &self.range
    }

    /// Number of cells
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    /// Truth that this field covers no cell
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Value of a cell
    ///
    /// # Panics
    ///
    /// If the cell is not covered by this field.
    pub fn get(&self, cell: [Index; RANK]) -> T {
        T::from_bits(self.atom(cell).load(Ordering::Relaxed))
    }

    /// Set the value of a cell
    ///
    /// # Panics
    ///
    /// If the cell is not covered by this field.
    pub fn set(&self, cell: [Index; RANK], value: T) {
        self.atom(cell).store(value.to_bits(), Ordering::Relaxed);
    }

    /// Atomically replace the value of a cell with `f(value)`
    ///
    /// Returns the previous value. `f` may be called several times if other
    /// threads write the same cell concurrently.
    ///
    /// # Panics
    ///
    /// If the cell is not covered by this field.
    pub fn update(&self, cell: [Index; RANK], mut f: impl FnMut(T) -> T) -> T {
        let previous = self
            .atom(cell)
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
                Some(f(T::from_bits(bits)).to_bits())
            })
            .unwrap_or_else(|bits| bits);
        T::from_bits(previous)
    }

    /// Snapshot of all cell values, indexed as `[k, j, i]` relative to the
    /// lowest corner of the field
    pub fn to_array(&self) -> Array3<T> {
        let [ex, ey, ez] = self.range.extents().map(|e| e as usize);
        Array3::from_shape_fn((ez, ey, ex), |(k, j, i)| {
            T::from_bits(self.bits[(k * ey + j) * ex + i].load(Ordering::Relaxed))
        })
    }

    /// Storage of a cell
    fn atom(&self, cell: [Index; RANK]) -> &AtomicU64 {
        assert!(
            self.range.contains(cell),
            "cell {cell:?} is outside of field range {:?}",
            self.range
        );
        &self.bits[self.range.flat_index(cell)]
    }
}
//
impl<T: Scalar> Field<T> for GridField<T> {
    fn element_count(&self) -> usize {
        self.len()
    }

    fn set_at(&self, index: usize, value: T) {
        self.bits[index].store(value.to_bits(), Ordering::Relaxed);
    }
}
