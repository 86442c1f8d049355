//! Accelerator execution backend
//!
//! Work is launched onto device streams as teams of threads. A launch over a
//! 3-D range is flattened to a 1-D item space (x fastest), which is split
//! across the target streams and their teams along warp-aligned boundaries,
//! see the [`partition`] module. Each team's threads then stride over their
//! team's partition.
//!
//! The device is emulated: streams are the FIFO command queues of
//! [`DeviceStream`], and the teams of a launch run concurrently on the host's
//! rayon thread pool.
//!
//! Launches are asynchronous: `parallel_for`, `parallel_initialize`,
//! `sweeping_parallel_for` and `parallel_for_indices` return once work is
//! enqueued, and the caller must synchronize the target streams (e.g. with
//! [`ExecutionContext::synchronize()`]) before using the results.
//! Reductions wait for their result before returning.

pub mod partition;
pub mod stream;

pub use crate::stream::{DeviceStream, SpawnError};

use crate::partition::LaunchGeometry;
use exec::{
    space::DeviceSpace, Capability, CellKernel, Error, ExecutionContext, ExecutionSpace, FieldSet,
    Index, IterationRange, ReduceKernel, Reduction, Scalar, Stream, SweepPlan,
};
#[allow(unused_imports)]
use log::{debug, error, info, log, trace, warn};
use rayon::prelude::*;
use std::sync::Arc;

/// Accelerator backend tag
#[derive(Copy, Clone, Debug, Default)]
pub struct Accelerator;
//
impl Accelerator {
    /// Size a launch of `num_items` flat items over `streams`
    fn geometry(
        ctx: &ExecutionContext,
        num_items: usize,
        streams: &[Arc<dyn Stream>],
    ) -> LaunchGeometry {
        let geometry = LaunchGeometry::new(
            num_items,
            streams.len(),
            ctx.threads_per_block(),
            ctx.blocks_per_loop(),
        );
        debug!("Launching {geometry:?}");
        geometry
    }

    /// Enqueue a launch that calls `body` once per flat item on every stream
    fn launch(
        ctx: &ExecutionContext,
        streams: &[Arc<dyn Stream>],
        num_items: usize,
        body: impl Fn(usize) + Send + Sync + 'static,
    ) -> exec::Result<()> {
        let geometry = Self::geometry(ctx, num_items, streams);
        let body = Arc::new(body);
        for (stream_idx, stream) in streams.iter().enumerate() {
            let body = body.clone();
            stream.submit(Box::new(move || {
                run_threads(&geometry).for_each(|(team, thread)| {
                    geometry
                        .thread_items(stream_idx, team, thread)
                        .for_each(&*body)
                })
            }))?;
        }
        Ok(())
    }

    /// Run a reduction launch on every stream and merge the per-stream
    /// results, waiting for all of them
    fn launch_reduce<R: Reduction>(
        ctx: &ExecutionContext,
        streams: &[Arc<dyn Stream>],
        num_items: usize,
        body: impl Fn(usize, &mut R::Value) + Send + Sync + 'static,
    ) -> exec::Result<R::Value> {
        let geometry = Self::geometry(ctx, num_items, streams);
        let body = Arc::new(body);
        let (partials, results) = crossbeam_channel::bounded(streams.len());
        for (stream_idx, stream) in streams.iter().enumerate() {
            let body = body.clone();
            let partials = partials.clone();
            stream.submit(Box::new(move || {
                let stream_partial = run_threads(&geometry)
                    .map(|(team, thread)| {
                        let mut partial = R::identity();
                        for n in geometry.thread_items(stream_idx, team, thread) {
                            body(n, &mut partial);
                        }
                        partial
                    })
                    .reduce(R::identity, R::combine);
                // The receiver only goes away if another stream failed
                let _ = partials.send(stream_partial);
            }))?;
        }
        drop(partials);

        let mut merged = R::identity();
        for _ in 0..streams.len() {
            match results.recv() {
                Ok(partial) => merged = R::combine(merged, partial),
                Err(_) => return Err(first_failure(streams)),
            }
        }
        Ok(merged)
    }
}
//
impl ExecutionSpace for Accelerator {
    const CAPABILITY: Capability = Capability::Accelerator;

    type Memory = DeviceSpace;

    fn parallel_for<F: CellKernel>(
        ctx: &ExecutionContext,
        range: &IterationRange,
        kernel: F,
    ) -> exec::Result<()> {
        if range.is_empty() {
            return Ok(());
        }
        let streams = ctx.launch_streams(Some(range))?;
        let cells = IterationRange::new(range.offset(), end_corner(range));
        Self::launch(ctx, &streams, range.size(), move |n| {
            let [i, j, k] = cells.cell_at(n);
            kernel(i, j, k)
        })
    }

    fn parallel_reduce<R: Reduction, F: ReduceKernel<R::Value>>(
        ctx: &ExecutionContext,
        range: &IterationRange,
        kernel: F,
        acc: &mut R::Value,
    ) -> exec::Result<()> {
        if range.is_empty() {
            return Ok(());
        }
        let streams = ctx.launch_streams(Some(range))?;
        let cells = IterationRange::new(range.offset(), end_corner(range));
        let merged = Self::launch_reduce::<R>(ctx, &streams, range.size(), move |n, partial| {
            let [i, j, k] = cells.cell_at(n);
            kernel(i, j, k, partial)
        })?;
        *acc = R::combine(*acc, merged);
        Ok(())
    }

    fn parallel_initialize<T: Scalar>(
        ctx: &ExecutionContext,
        value: T,
        fields: &FieldSet<T>,
    ) -> exec::Result<()> {
        let num_items = fields.total_len();
        if num_items == 0 {
            return Ok(());
        }
        let streams = ctx.launch_streams(None)?;
        let fields = fields.clone();
        Self::launch(ctx, &streams, num_items, move |n| fields.set_flat(n, value))
    }

    fn sweeping_parallel_for<F: CellKernel>(
        ctx: &ExecutionContext,
        plan: &SweepPlan,
        kernel: F,
    ) -> exec::Result<()> {
        if plan.range().is_empty() {
            return Ok(());
        }
        // Phases go to a single stream, whose FIFO order is the phase barrier
        let streams = ctx.launch_streams(Some(plan.range()))?;
        let stream = &streams[0];
        let plan = Arc::new(plan.clone());
        let kernel = Arc::new(kernel);
        for phase in 0..plan.num_phases() {
            let blocks = plan.phase_blocks(phase);
            trace!(
                "Enqueuing sweep phase {phase}/{} ({} teams) on stream {:?}",
                plan.num_phases(),
                blocks.len(),
                stream.name()
            );
            let plan = plan.clone();
            let kernel = kernel.clone();
            stream.submit(Box::new(move || {
                blocks
                    .into_par_iter()
                    .for_each(|block| plan.visit_block(block, &*kernel))
            }))?;
        }
        Ok(())
    }

    fn parallel_for_indices<F: CellKernel>(
        ctx: &ExecutionContext,
        indices: Arc<[[Index; 3]]>,
        kernel: F,
    ) -> exec::Result<()> {
        if indices.is_empty() {
            return Ok(());
        }
        let streams = ctx.launch_streams(None)?;
        Self::launch(ctx, &streams, indices.len(), move |n| {
            let [i, j, k] = indices[n];
            kernel(i, j, k)
        })
    }
}

/// Enumerate the threads of the teams that a stream runs, in parallel
fn run_threads(geometry: &LaunchGeometry) -> impl ParallelIterator<Item = (usize, usize)> {
    let threads_per_team = geometry.threads_per_team;
    (0..geometry.teams_per_stream * threads_per_team)
        .into_par_iter()
        .map(move |rank| (rank / threads_per_team, rank % threads_per_team))
}

/// Upper corner of a range
fn end_corner(range: &IterationRange) -> [Index; 3] {
    std::array::from_fn(|axis| range.end(axis))
}

/// Find out why a reduction launch did not deliver its result
///
/// Every stream is synchronized, so that no failure is left to be reported
/// by a later synchronization.
fn first_failure(streams: &[Arc<dyn Stream>]) -> Error {
    streams
        .iter()
        .filter_map(|stream| stream.synchronize().err())
        .reduce(|first, _| first)
        .unwrap_or_else(|| Error::StreamDisconnected {
            stream: streams
                .first()
                .map(|stream| stream.name().to_owned())
                .unwrap_or_default(),
        })
}

/// Set up logging for every test module of this crate
#[cfg(test)]
pub(crate) fn init_logger() {
    static INIT_LOGGER: std::sync::Once = std::sync::Once::new();
    INIT_LOGGER.call_once(|| {
        // Other test modules may have installed a logger already
        let _ = env_logger::builder().is_test(true).try_init();
    });
}
