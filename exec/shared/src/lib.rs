//! Portable parallel execution over 3-D grids of cells
//!
//! This crate defines what every execution backend has in common: iteration
//! ranges, execution contexts and the streams they target, capability tags,
//! reductions, and the [`ExecutionSpace`] trait that backends implement. The
//! free functions at the root of this crate are the entry points that tasks
//! use to dispatch per-cell kernels on whichever backend they were resolved
//! to, see the `exec_selector` crate for how that resolution happens.

pub mod array;
#[cfg(feature = "criterion")]
pub mod benchmark;
pub mod config;
pub mod context;
pub mod error;
pub mod field;
pub mod lock;
pub mod range;
pub mod reduce;
pub mod scalar;
pub mod space;
pub mod stream;
pub mod sweep;
pub mod task;

pub use crate::{
    array::FixedArray,
    config::RuntimeConfig,
    context::ExecutionContext,
    error::{Error, Result},
    field::{Field, FieldSet, GridField},
    lock::{HybridLock, HybridLockGuard},
    range::IterationRange,
    reduce::{Min, Reduction, Sum},
    scalar::Scalar,
    space::{
        Capability, CapabilitySet, DeviceSpace, ExecutionHints, HostSpace, MemoryKind, MemorySpace,
    },
    stream::{Stream, StreamHandle, Work},
    sweep::{SweepDirections, SweepPlan},
    task::PortableTask,
};
use std::sync::Arc;

/// Integer cell coordinate
pub type Index = i32;

/// Per-cell kernel
///
/// Invoked once per cell with the cell's `(i, j, k)` coordinates. Kernels
/// may outlive the dispatch call on asynchronous backends, hence the
/// `'static` bound.
pub trait CellKernel: Fn(Index, Index, Index) + Send + Sync + 'static {}
//
impl<F> CellKernel for F where F: Fn(Index, Index, Index) + Send + Sync + 'static {}

/// Per-cell kernel that contributes to a reduction
///
/// Receives the cell's coordinates and a partial accumulator that it should
/// update with the cell's contribution.
pub trait ReduceKernel<T>: Fn(Index, Index, Index, &mut T) + Send + Sync + 'static {}
//
impl<T, F> ReduceKernel<T> for F where F: Fn(Index, Index, Index, &mut T) + Send + Sync + 'static {}

/// Execution backend
///
/// Implemented by zero-sized tag types, one per backend. All methods are
/// associated functions: backends hold no state of their own, everything they
/// need comes from the [`ExecutionContext`].
pub trait ExecutionSpace: Send + Sync + 'static {
    /// Capability that this backend provides
    const CAPABILITY: Capability;

    /// Memory space that kernels running on this backend address
    type Memory: MemorySpace;

    /// Invoke `kernel` exactly once for every cell of `range`
    ///
    /// Only the sequential backend guarantees an invocation order. The
    /// accelerator backend returns as soon as the work is enqueued.
    fn parallel_for<F: CellKernel>(
        ctx: &ExecutionContext,
        range: &IterationRange,
        kernel: F,
    ) -> Result<()>;

    /// Like `parallel_for`, but kernels also update a partial accumulator
    ///
    /// Partials are merged using `R`, and the merged value is combined into
    /// `acc` before this function returns, on every backend.
    fn parallel_reduce<R: Reduction, F: ReduceKernel<R::Value>>(
        ctx: &ExecutionContext,
        range: &IterationRange,
        kernel: F,
        acc: &mut R::Value,
    ) -> Result<()>;

    /// Set every element of every field of `fields` to `value`
    fn parallel_initialize<T: Scalar>(
        ctx: &ExecutionContext,
        value: T,
        fields: &FieldSet<T>,
    ) -> Result<()>;

    /// Invoke `kernel` on every cell of a sweep plan, phase by phase
    ///
    /// No block of a phase starts before every block of the previous phase
    /// has finished.
    fn sweeping_parallel_for<F: CellKernel>(
        ctx: &ExecutionContext,
        plan: &SweepPlan,
        kernel: F,
    ) -> Result<()>;

    /// Invoke `kernel` once per coordinate of an explicit cell list
    fn parallel_for_indices<F: CellKernel>(
        ctx: &ExecutionContext,
        indices: Arc<[[Index; 3]]>,
        kernel: F,
    ) -> Result<()>;
}

/// Run a per-cell kernel over `range` on backend `S`
pub fn parallel_for<S: ExecutionSpace>(
    ctx: &ExecutionContext,
    range: &IterationRange,
    kernel: impl CellKernel,
) -> Result<()> {
    S::parallel_for(ctx, range, kernel)
}

/// Sum per-cell contributions over `range` into `acc` on backend `S`
pub fn parallel_reduce_sum<S: ExecutionSpace, T: Scalar>(
    ctx: &ExecutionContext,
    range: &IterationRange,
    kernel: impl ReduceKernel<T>,
    acc: &mut T,
) -> Result<()> {
    S::parallel_reduce::<Sum<T>, _>(ctx, range, kernel, acc)
}

/// Fold the minimum of per-cell contributions over `range` into `acc`
///
/// On return, `acc` holds the minimum of its previous value and of every
/// contribution.
pub fn parallel_reduce_min<S: ExecutionSpace, T: Scalar>(
    ctx: &ExecutionContext,
    range: &IterationRange,
    kernel: impl ReduceKernel<T>,
    acc: &mut T,
) -> Result<()> {
    S::parallel_reduce::<Min<T>, _>(ctx, range, kernel, acc)
}

/// Set all elements of one or more fields to `value` on backend `S`
pub fn parallel_initialize<S: ExecutionSpace, T: Scalar>(
    ctx: &ExecutionContext,
    value: T,
    fields: &FieldSet<T>,
) -> Result<()> {
    S::parallel_initialize(ctx, value, fields)
}

/// Run a directional wavefront sweep over `range` on backend `S`
///
/// The range is split into `n_part` blocks per axis, and blocks are processed
/// in phases such that each block only starts once all of its upstream
/// neighbors along `directions` are done.
pub fn sweeping_parallel_for<S: ExecutionSpace>(
    ctx: &ExecutionContext,
    range: &IterationRange,
    n_part: usize,
    directions: SweepDirections,
    kernel: impl CellKernel,
) -> Result<()> {
    let plan = SweepPlan::new(range.clone(), n_part, directions)?;
    S::sweeping_parallel_for(ctx, &plan, kernel)
}

/// Run a per-cell kernel over an explicit list of cells on backend `S`
pub fn parallel_for_indices<S: ExecutionSpace>(
    ctx: &ExecutionContext,
    indices: impl Into<Arc<[[Index; 3]]>>,
    kernel: impl CellKernel,
) -> Result<()> {
    S::parallel_for_indices(ctx, indices.into(), kernel)
}

/// Run a host closure over `range` on the calling thread, in canonical order
///
/// Unlike the other entry points, this never involves any backend, so the
/// closure may borrow and mutate local state.
pub fn serial_for(range: &IterationRange, kernel: impl FnMut(Index, Index, Index)) {
    range.for_each_cell(kernel)
}

