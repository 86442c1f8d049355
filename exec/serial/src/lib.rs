//! Sequential execution backend
//!
//! Everything runs on the calling thread, in a fixed order: cells are
//! visited with k outermost and i innermost, which makes this backend the
//! reference that the other ones are checked against.

use exec::{
    space::HostSpace, Capability, CellKernel, ExecutionContext, ExecutionSpace, FieldSet, Index,
    IterationRange, ReduceKernel, Reduction, Result, Scalar, SweepPlan,
};
#[allow(unused_imports)]
use log::{debug, error, info, log, trace, warn};
use std::sync::Arc;

/// Sequential backend tag
#[derive(Copy, Clone, Debug, Default)]
pub struct Serial;
//
impl ExecutionSpace for Serial {
    const CAPABILITY: Capability = Capability::Sequential;

    type Memory = HostSpace;

    fn parallel_for<F: CellKernel>(
        _ctx: &ExecutionContext,
        range: &IterationRange,
        kernel: F,
    ) -> Result<()> {
        range.for_each_cell(kernel);
        Ok(())
    }

    fn parallel_reduce<R: Reduction, F: ReduceKernel<R::Value>>(
        _ctx: &ExecutionContext,
        range: &IterationRange,
        kernel: F,
        acc: &mut R::Value,
    ) -> Result<()> {
        let mut partial = R::identity();
        range.for_each_cell(|i, j, k| kernel(i, j, k, &mut partial));
        *acc = R::combine(*acc, partial);
        Ok(())
    }

    fn parallel_initialize<T: Scalar>(
        _ctx: &ExecutionContext,
        value: T,
        fields: &FieldSet<T>,
    ) -> Result<()> {
        for n in 0..fields.total_len() {
            fields.set_flat(n, value);
        }
        Ok(())
    }

    fn sweeping_parallel_for<F: CellKernel>(
        _ctx: &ExecutionContext,
        plan: &SweepPlan,
        kernel: F,
    ) -> Result<()> {
        for phase in 0..plan.num_phases() {
            trace!("Sweeping phase {phase}/{}", plan.num_phases());
            for block in plan.phase_blocks(phase) {
                plan.visit_block(block, &kernel);
            }
        }
        Ok(())
    }

    fn parallel_for_indices<F: CellKernel>(
        _ctx: &ExecutionContext,
        indices: Arc<[[Index; 3]]>,
        kernel: F,
    ) -> Result<()> {
        for &[i, j, k] in indices.iter() {
            kernel(i, j, k);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exec::{Field, GridField, SweepDirections};
    use std::sync::{Mutex, Once};

    fn init_logger() {
        static INIT_LOGGER: Once = Once::new();
        INIT_LOGGER.call_once(|| {
            let _ = env_logger::builder().is_test(true).try_init();
        });
    }

    /// Record the cells that a kernel is invoked on, in invocation order
    fn recorder() -> (Arc<Mutex<Vec<[Index; 3]>>>, impl CellKernel) {
        let cells = Arc::new(Mutex::new(Vec::new()));
        let sink = cells.clone();
        (cells, move |i: Index, j: Index, k: Index| {
            sink.lock().unwrap().push([i, j, k])
        })
    }

    #[test]
    fn canonical_order() {
        init_logger();
        let (cells, kernel) = recorder();
        let range = IterationRange::new([0; 3], [2; 3]);
        exec::parallel_for::<Serial>(&ExecutionContext::default(), &range, kernel).unwrap();
        assert_eq!(
            *cells.lock().unwrap(),
            [
                [0, 0, 0],
                [1, 0, 0],
                [0, 1, 0],
                [1, 1, 0],
                [0, 0, 1],
                [1, 0, 1],
                [0, 1, 1],
                [1, 1, 1]
            ]
        );
    }

    #[test]
    fn empty_range() {
        init_logger();
        let (cells, kernel) = recorder();
        let range = IterationRange::new([0, 0, 0], [5, 0, 5]);
        exec::parallel_for::<Serial>(&ExecutionContext::default(), &range, kernel).unwrap();
        assert!(cells.lock().unwrap().is_empty());
    }

    #[test]
    fn reductions_fold_into_accumulator() {
        init_logger();
        let ctx = ExecutionContext::default();
        let range = IterationRange::new([-2, 0, 0], [3, 4, 2]);

        let mut sum = 10i64;
        exec::parallel_reduce_sum::<Serial, _>(
            &ctx,
            &range,
            |i: Index, _: Index, _: Index, acc: &mut i64| *acc += i64::from(i),
            &mut sum,
        )
        .unwrap();
        assert_eq!(sum, 10);

        let mut min = 0.5f64;
        exec::parallel_reduce_min::<Serial, _>(
            &ctx,
            &range,
            |i: Index, j: Index, k: Index, acc: &mut f64| {
                *acc = acc.min(f64::from(i + j + k) + 3.0)
            },
            &mut min,
        )
        .unwrap();
        assert_eq!(min, 0.5);

        let mut min = 100.0f64;
        exec::parallel_reduce_min::<Serial, _>(
            &ctx,
            &range,
            |i: Index, j: Index, k: Index, acc: &mut f64| {
                *acc = acc.min(f64::from(i + j + k) + 3.0)
            },
            &mut min,
        )
        .unwrap();
        assert_eq!(min, 1.0);
    }

    #[test]
    fn initialize_several_fields() {
        init_logger();
        let a = Arc::new(GridField::new(&IterationRange::new([0; 3], [2; 3]), 1u32));
        let b = Arc::new(GridField::new(&IterationRange::new([0; 3], [3, 1, 1]), 2u32));
        let fields = FieldSet::new([a.clone() as Arc<dyn Field<u32>>, b.clone()]);
        exec::parallel_initialize::<Serial, _>(&ExecutionContext::default(), 7, &fields).unwrap();
        assert!(a.to_array().iter().all(|&x| x == 7));
        assert!(b.to_array().iter().all(|&x| x == 7));
    }

    #[test]
    fn sweep_visits_phases_in_order() {
        init_logger();
        let (cells, kernel) = recorder();
        let range = IterationRange::new([0; 3], [4; 3]);
        exec::sweeping_parallel_for::<Serial>(
            &ExecutionContext::default(),
            &range,
            2,
            SweepDirections::POSITIVE,
            kernel,
        )
        .unwrap();
        let cells = cells.lock().unwrap();
        assert_eq!(cells.len(), 64);
        let phases = cells
            .iter()
            .map(|cell| cell.iter().map(|&c| c as usize / 2).sum::<usize>())
            .collect::<Vec<_>>();
        assert!(phases.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn indices_in_list_order() {
        init_logger();
        let (cells, kernel) = recorder();
        let list = vec![[3, 1, 4], [1, 5, 9], [2, 6, 5]];
        exec::parallel_for_indices::<Serial>(&ExecutionContext::default(), list.clone(), kernel)
            .unwrap();
        assert_eq!(*cells.lock().unwrap(), list);
    }
}
