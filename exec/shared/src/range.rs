//! Three-dimensional iteration spaces

use crate::{stream::StreamHandle, Error, Index, Result};

/// Number of axes of an iteration space
pub const RANK: usize = 3;

/// Half-open 3-D box of cell coordinates, plus the execution streams that
/// dispatches over this box should be issued on
///
/// Axes are ordered x, y, z. The box covers `[begin(a), end(a))` on each axis
/// `a`. Stream handles are weak references: the range records which streams
/// work should go to, but never keeps them alive.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IterationRange {
    /// Lowest corner of the box
    offset: [Index; RANK],

    /// Number of cells along each axis
    extent: [u32; RANK],

    /// Streams attached to this range, in launch order
    streams: Vec<StreamHandle>,
}
//
impl IterationRange {
    /// Build the box spanned by two opposite corners, given in any order
    ///
    /// The box is half-open: the greater coordinate of each axis is excluded.
    pub fn new(c0: [Index; RANK], c1: [Index; RANK]) -> Self {
        let offset = std::array::from_fn(|a| c0[a].min(c1[a]));
        let extent = std::array::from_fn(|a| {
            let high = i64::from(c0[a].max(c1[a]));
            (high - i64::from(offset[a])) as u32
        });
        Self {
            offset,
            extent,
            streams: Vec::new(),
        }
    }

    /// Attach a list of streams, replacing any previously attached ones
    pub fn with_streams(mut self, streams: impl IntoIterator<Item = StreamHandle>) -> Self {
        self.streams = streams.into_iter().collect();
        self
    }

    /// Attach one more stream
    pub fn attach_stream(&mut self, stream: StreamHandle) {
        self.streams.push(stream);
    }

    /// First coordinate along `axis`
    #[inline]
    pub fn begin(&self, axis: usize) -> Index {
        self.offset[axis]
    }

    /// One past the last coordinate along `axis`
    #[inline]
    pub fn end(&self, axis: usize) -> Index {
        (i64::from(self.offset[axis]) + i64::from(self.extent[axis])) as Index
    }

    /// Number of cells along `axis`
    #[inline]
    pub fn extent(&self, axis: usize) -> u32 {
        self.extent[axis]
    }

    /// Lowest corner of the box
    pub fn offset(&self) -> [Index; RANK] {
        self.offset
    }

    /// Number of cells along each axis
    pub fn extents(&self) -> [u32; RANK] {
        self.extent
    }

    /// Total number of cells, zero if any extent is zero
    pub fn size(&self) -> usize {
        self.extent.iter().map(|&e| e as usize).product()
    }

    /// Truth that this range contains no cell
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Truth that a coordinate lies within the box
    pub fn contains(&self, [i, j, k]: [Index; RANK]) -> bool {
        (self.begin(0)..self.end(0)).contains(&i)
            && (self.begin(1)..self.end(1)).contains(&j)
            && (self.begin(2)..self.end(2)).contains(&k)
    }

    /// Streams attached to this range
    pub fn streams(&self) -> &[StreamHandle] {
        &self.streams
    }

    /// Number of attached streams
    pub fn num_streams(&self) -> usize {
        self.streams.len()
    }

    /// Access the `index`-th attached stream
    pub fn stream(&self, index: usize) -> Result<&StreamHandle> {
        self.streams.get(index).ok_or(Error::MissingStream {
            index,
            available: self.streams.len(),
        })
    }

    /// Convert a flat cell index into a coordinate, x being fastest-varying
    ///
    /// `n` must be smaller than `size()`.
    #[inline]
    pub fn cell_at(&self, n: usize) -> [Index; RANK] {
        let [ex, ey, _ez] = self.extent.map(|e| e as usize);
        debug_assert!(n < self.size());
        let k = n / (ey * ex);
        let j = (n / ex) % ey;
        let i = n % ex;
        [
            self.offset[0] + i as Index,
            self.offset[1] + j as Index,
            self.offset[2] + k as Index,
        ]
    }

    /// Convert a coordinate into a flat cell index, x being fastest-varying
    ///
    /// The coordinate must lie within the box.
    #[inline]
    pub fn flat_index(&self, [i, j, k]: [Index; RANK]) -> usize {
        debug_assert!(self.contains([i, j, k]));
        let [ex, ey, _ez] = self.extent.map(|e| e as usize);
        let local = std::array::from_fn::<_, RANK, _>(|a| {
            ([i, j, k][a] as i64 - i64::from(self.offset[a])) as usize
        });
        (local[2] * ey + local[1]) * ex + local[0]
    }

    /// Visit every cell on the calling thread, k outermost, then j, then i
    pub fn for_each_cell(&self, mut f: impl FnMut(Index, Index, Index)) {
        let (ib, ie) = (self.begin(0), self.end(0));
        let (jb, je) = (self.begin(1), self.end(1));
        let (kb, ke) = (self.begin(2), self.end(2));
        for k in kb..ke {
            for j in jb..je {
                for i in ib..ie {
                    f(i, j, k);
                }
            }
        }
    }
}
