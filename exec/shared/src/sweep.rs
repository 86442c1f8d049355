//! Wavefront scheduling of directionally recurrent computations
//!
//! Some per-cell computations depend on the result of their upstream
//! neighbors along a traversal direction, e.g. when integrating along a ray.
//! They can still run in parallel by splitting the iteration range into a
//! grid of blocks, and processing blocks in phases: phase `p` contains the
//! blocks that are `p` steps downstream of the starting corner, and every
//! block of phase `p` only depends on blocks of earlier phases.

use crate::{range::RANK, Error, Index, IterationRange, Result};

/// Traversal direction along each axis
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub struct SweepDirections {
    /// Sweep towards increasing x
    pub plus_x: bool,

    /// Sweep towards increasing y
    pub plus_y: bool,

    /// Sweep towards increasing z
    pub plus_z: bool,
}
//
impl SweepDirections {
    /// Sweep towards increasing coordinates on every axis
    pub const POSITIVE: Self = Self {
        plus_x: true,
        plus_y: true,
        plus_z: true,
    };

    /// Direction along each axis, in x, y, z order
    pub fn as_array(self) -> [bool; RANK] {
        [self.plus_x, self.plus_y, self.plus_z]
    }
}
//
impl Default for SweepDirections {
    fn default() -> Self {
        Self::POSITIVE
    }
}

/// Coordinates of a block within the block grid
pub type Block = [usize; RANK];

/// Partition of an iteration range into `n_part³` blocks, ordered in phases
///
/// Block coordinates used by this type are physical, i.e. block `[0, 0, 0]`
/// always contains the lowest corner of the range, whatever the sweep
/// direction. The range's stream handles are retained.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SweepPlan {
    /// Cells to be swept
    range: IterationRange,

    /// Number of blocks along each axis
    n_part: usize,

    /// Sweep direction
    directions: SweepDirections,
}
//
impl SweepPlan {
    /// Plan a sweep over `range` with `n_part` blocks along each axis
    ///
    /// If an extent is not a multiple of `n_part`, the remainder cells are
    /// folded into the last block of that axis.
    pub fn new(range: IterationRange, n_part: usize, directions: SweepDirections) -> Result<Self> {
        if n_part == 0 {
            return Err(Error::InvalidPartitionCount);
        }
        Ok(Self {
            range,
            n_part,
            directions,
        })
    }

    /// Cells to be swept
    pub fn range(&self) -> &IterationRange {
        &self.range
    }

    /// Number of blocks along each axis
    pub fn n_part(&self) -> usize {
        self.n_part
    }

    /// Sweep direction
    pub fn directions(&self) -> SweepDirections {
        self.directions
    }

    /// Number of phases
    pub fn num_phases(&self) -> usize {
        3 * self.n_part - 2
    }

    /// Number of blocks in phase `phase`
    pub fn phase_len(&self, phase: usize) -> usize {
        let last = self.num_phases() - 1;
        assert!(phase <= last, "phase {phase} is out of range");
        // Phase counts are symmetric, and in the first half only one of the
        // upper bounds of block coordinates can be exceeded at a time
        let p = phase.min(last - phase);
        let triangle = |m: usize| (m + 2) * (m + 1) / 2;
        let mut len = triangle(p);
        if p >= self.n_part {
            len -= 3 * triangle(p - self.n_part);
        }
        len
    }

    /// Blocks of phase `phase`
    ///
    /// Blocks are enumerated with the z sweep coordinate outermost, then y,
    /// the x coordinate being derived from the phase number.
    pub fn phase_blocks(&self, phase: usize) -> Vec<Block> {
        let n = self.n_part;
        let mut blocks = Vec::with_capacity(self.phase_len(phase));
        for sz in 0..n.min(phase + 1) {
            for sy in 0..n.min(phase - sz + 1) {
                let sx = phase - sz - sy;
                if sx < n {
                    blocks.push(self.physical([sx, sy, sz]));
                }
            }
        }
        blocks
    }

    /// Phase that a block belongs to
    pub fn phase_of(&self, block: Block) -> usize {
        self.physical(block).iter().sum()
    }

    /// Cells of a block, as a half-open `[begin, end)` coordinate box
    pub fn block_bounds(&self, block: Block) -> ([Index; RANK], [Index; RANK]) {
        let mut begin = [0; RANK];
        let mut end = [0; RANK];
        for axis in 0..RANK {
            debug_assert!(block[axis] < self.n_part);
            let len = self.range.extent(axis) as usize / self.n_part;
            begin[axis] = self.range.begin(axis) + (block[axis] * len) as Index;
            end[axis] = if block[axis] == self.n_part - 1 {
                self.range.end(axis)
            } else {
                begin[axis] + len as Index
            };
        }
        (begin, end)
    }

    /// Visit the cells of a block, from its upstream corner to its downstream
    /// corner, k outermost and i innermost
    pub fn visit_block(&self, block: Block, mut f: impl FnMut(Index, Index, Index)) {
        let (begin, end) = self.block_bounds(block);
        let [px, py, pz] = self.directions.as_array();
        for k in directed(begin[2], end[2], pz) {
            for j in directed(begin[1], end[1], py) {
                for i in directed(begin[0], end[0], px) {
                    f(i, j, k);
                }
            }
        }
    }

    /// Map between sweep-order and physical block coordinates
    ///
    /// Mirroring is an involution, so this goes both ways.
    fn physical(&self, block: Block) -> Block {
        let dirs = self.directions.as_array();
        std::array::from_fn(|axis| {
            if dirs[axis] {
                block[axis]
            } else {
                self.n_part - 1 - block[axis]
            }
        })
    }
}

/// Iterate over `[begin, end)` in increasing or decreasing order
fn directed(begin: Index, end: Index, increasing: bool) -> impl Iterator<Item = Index> {
    let (forward, backward) = if increasing {
        (Some(begin..end), None)
    } else {
        (None, Some((begin..end).rev()))
    };
    forward
        .into_iter()
        .flatten()
        .chain(backward.into_iter().flatten())
}
