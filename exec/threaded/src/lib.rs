//! Shared-memory threaded execution backend
//!
//! Cells are distributed across the workers of the global rayon thread pool
//! using fork-join parallelism. Every dispatch call returns only once all of
//! its cells have been processed.

use exec::{
    space::HostSpace, Capability, CellKernel, ExecutionContext, ExecutionSpace, FieldSet, Index,
    IterationRange, ReduceKernel, Reduction, RuntimeConfig, Scalar, SweepPlan,
};
#[allow(unused_imports)]
use log::{debug, error, info, log, trace, warn};
use rayon::{prelude::*, ThreadPoolBuildError, ThreadPoolBuilder};
use std::sync::Arc;
use thiserror::Error;

/// Shared-memory threaded backend tag
#[derive(Copy, Clone, Debug, Default)]
pub struct Threaded;
//
impl Threaded {
    /// Minimal number of cells per work item
    fn min_len(ctx: &ExecutionContext) -> usize {
        ctx.chunk_size().map_or(1, usize::from)
    }
}
//
impl ExecutionSpace for Threaded {
    const CAPABILITY: Capability = Capability::SharedMemoryThreaded;

    type Memory = HostSpace;

    fn parallel_for<F: CellKernel>(
        ctx: &ExecutionContext,
        range: &IterationRange,
        kernel: F,
    ) -> exec::Result<()> {
        (0..range.size())
            .into_par_iter()
            .with_min_len(Self::min_len(ctx))
            .for_each(|n| {
                let [i, j, k] = range.cell_at(n);
                kernel(i, j, k)
            });
        Ok(())
    }

    fn parallel_reduce<R: Reduction, F: ReduceKernel<R::Value>>(
        ctx: &ExecutionContext,
        range: &IterationRange,
        kernel: F,
        acc: &mut R::Value,
    ) -> exec::Result<()> {
        let merged = (0..range.size())
            .into_par_iter()
            .with_min_len(Self::min_len(ctx))
            .fold(R::identity, |mut partial, n| {
                let [i, j, k] = range.cell_at(n);
                kernel(i, j, k, &mut partial);
                partial
            })
            .reduce(R::identity, R::combine);
        *acc = R::combine(*acc, merged);
        Ok(())
    }

    fn parallel_initialize<T: Scalar>(
        ctx: &ExecutionContext,
        value: T,
        fields: &FieldSet<T>,
    ) -> exec::Result<()> {
        (0..fields.total_len())
            .into_par_iter()
            .with_min_len(Self::min_len(ctx))
            .for_each(|n| fields.set_flat(n, value));
        Ok(())
    }

    fn sweeping_parallel_for<F: CellKernel>(
        _ctx: &ExecutionContext,
        plan: &SweepPlan,
        kernel: F,
    ) -> exec::Result<()> {
        // Returning from for_each is the barrier between phases
        for phase in 0..plan.num_phases() {
            trace!("Sweeping phase {phase}/{}", plan.num_phases());
            plan.phase_blocks(phase)
                .into_par_iter()
                .for_each(|block| plan.visit_block(block, &kernel));
        }
        Ok(())
    }

    fn parallel_for_indices<F: CellKernel>(
        ctx: &ExecutionContext,
        indices: Arc<[[Index; 3]]>,
        kernel: F,
    ) -> exec::Result<()> {
        indices
            .par_iter()
            .with_min_len(Self::min_len(ctx))
            .for_each(|&[i, j, k]| kernel(i, j, k));
        Ok(())
    }
}

/// Set up the global thread pool according to the run configuration
///
/// Must be called before the first dispatch, if at all. Without an explicit
/// thread count, rayon's defaults apply.
pub fn configure_thread_pool(config: &RuntimeConfig) -> Result<(), Error> {
    if let Some(num_threads) = config.num_threads {
        info!("Setting up a pool of {num_threads} worker threads");
        ThreadPoolBuilder::new()
            .num_threads(num_threads.into())
            .build_global()?;
    }
    Ok(())
}

/// Errors that can occur while setting up the threaded backend
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to configure the global thread pool
    #[error("failed to configure the global thread pool")]
    ThreadPool(#[from] ThreadPoolBuildError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use exec::{Field, GridField, SweepDirections};
    use std::{
        num::NonZeroUsize,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Once,
        },
    };

    fn init_logger() {
        static INIT_LOGGER: Once = Once::new();
        INIT_LOGGER.call_once(|| {
            let _ = env_logger::builder().is_test(true).try_init();
        });
    }

    fn chunked(chunk_size: usize) -> ExecutionContext {
        ExecutionContext::new(&RuntimeConfig {
            chunk_size: NonZeroUsize::new(chunk_size),
            ..Default::default()
        })
    }

    #[test]
    fn every_cell_once() {
        init_logger();
        let range = IterationRange::new([-4, 3, 0], [5, 9, 7]);
        for ctx in [ExecutionContext::default(), chunked(64)] {
            let visits = Arc::new(GridField::new(&range, 0u32));
            let counter = visits.clone();
            exec::parallel_for::<Threaded>(&ctx, &range, move |i: Index, j: Index, k: Index| {
                counter.update([i, j, k], |n| n + 1);
            })
            .unwrap();
            assert!(visits.to_array().iter().all(|&n| n == 1));
        }
    }

    #[test]
    fn reductions() {
        init_logger();
        let range = IterationRange::new([0; 3], [10, 10, 10]);
        let mut sum = 0usize;
        exec::parallel_reduce_sum::<Threaded, _>(
            &chunked(7),
            &range,
            |_: Index, _: Index, _: Index, acc: &mut usize| *acc += 1,
            &mut sum,
        )
        .unwrap();
        assert_eq!(sum, 1000);

        let mut min = -5i32;
        exec::parallel_reduce_min::<Threaded, _>(
            &ExecutionContext::default(),
            &range,
            |i: Index, j: Index, k: Index, acc: &mut i32| *acc = (*acc).min(i * j - k),
            &mut min,
        )
        .unwrap();
        assert_eq!(min, -9);
    }

    #[test]
    fn initialize_and_indices() {
        init_logger();
        let range = IterationRange::new([0; 3], [4, 4, 4]);
        let field = Arc::new(GridField::new(&range, 0.0f32));
        let fields = FieldSet::new([field.clone() as Arc<dyn Field<f32>>]);
        exec::parallel_initialize::<Threaded, _>(&chunked(5), 1.5, &fields).unwrap();
        assert!(field.to_array().iter().all(|&x| x == 1.5));

        let list = (0..4).map(|i| [i, i, i]).collect::<Vec<_>>();
        let target = field.clone();
        exec::parallel_for_indices::<Threaded>(
            &ExecutionContext::default(),
            list,
            move |i: Index, j: Index, k: Index| target.set([i, j, k], -1.0),
        )
        .unwrap();
        let array = field.to_array();
        assert_eq!(array.iter().filter(|&&x| x == -1.0).count(), 4);
        assert_eq!(array[[2, 2, 2]], -1.0);
    }

    #[test]
    fn sweep_covers_range() {
        init_logger();
        let range = IterationRange::new([0; 3], [7, 5, 6]);
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        exec::sweeping_parallel_for::<Threaded>(
            &ExecutionContext::default(),
            &range,
            3,
            SweepDirections {
                plus_x: true,
                plus_y: false,
                plus_z: true,
            },
            move |_: Index, _: Index, _: Index| {
                counter.fetch_add(1, Ordering::Relaxed);
            },
        )
        .unwrap();
        assert_eq!(count.load(Ordering::Relaxed), range.size());
    }
}
