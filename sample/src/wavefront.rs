//! Sample task exercising every dispatch primitive
//!
//! A smooth source term is laid over a cubic domain, then a directional sweep
//! computes the Manhattan distance of every cell to the domain's origin
//! corner, which can only be done once upstream cells are known. Cells of the
//! bottom face are finally tallied through an explicit index list.

use exec::{
    ExecutionContext, ExecutionSpace, Field, FieldSet, GridField, HybridLock, Index,
    IterationRange, PortableTask, SweepDirections,
};
#[allow(unused_imports)]
use log::{debug, error, info, log, trace, warn};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};

/// Distance-to-origin computation over a cubic domain
pub struct Wavefront {
    /// Simulation domain
    range: IterationRange,

    /// Number of sweep blocks along each axis
    sweep_blocks: usize,

    /// Smooth source term
    source: Arc<GridField<f64>>,

    /// Manhattan distance to the origin corner
    distance: Arc<GridField<u32>>,

    /// Cells of the bottom face
    bottom: Arc<[[Index; 3]]>,

    /// Statistics of the bottom face
    tally: Arc<Tally>,

    /// Outcome of the last evaluation
    report: Mutex<Option<Report>>,
}
//
impl Wavefront {
    /// Set up a computation over `size`³ cells
    pub fn new(size: u16, sweep_blocks: usize) -> Self {
        let size = Index::from(size);
        let range = IterationRange::new([0; 3], [size; 3]);
        let bottom = (0..size)
            .flat_map(|j| (0..size).map(move |i| [i, j, 0]))
            .collect::<Vec<_>>();
        Self {
            source: Arc::new(GridField::new(&range, 0.0)),
            distance: Arc::new(GridField::new(&range, 0)),
            range,
            sweep_blocks,
            bottom: bottom.into(),
            tally: Arc::new(Tally::default()),
            report: Mutex::new(None),
        }
    }

    /// Outcome of the last evaluation, if any
    pub fn report(&self) -> Option<Report> {
        *self.report.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Expected distance statistics, computed in closed form
    pub fn expected(&self) -> DistanceStats {
        let n = u64::from(self.range.extent(0));
        let per_axis = n * n.saturating_sub(1) / 2;
        DistanceStats {
            total: 3 * n * n * per_axis,
            bottom_cells: n * n,
            bottom_total: 2 * n * per_axis,
        }
    }
}
//
impl PortableTask for Wavefront {
    fn name(&self) -> &str {
        "wavefront"
    }

    fn eval<S: ExecutionSpace>(&self, ctx: &ExecutionContext) -> exec::Result<()> {
        self.tally.reset();
        let fields = FieldSet::new([self.source.clone() as Arc<dyn Field<f64>>]);
        exec::parallel_initialize::<S, _>(ctx, 0.0, &fields)?;
        ctx.synchronize()?;

        let source = self.source.clone();
        let center = f64::from(self.range.extent(0)) / 2.0;
        exec::parallel_for::<S>(ctx, &self.range, move |i: Index, j: Index, k: Index| {
            let r2 = [i, j, k]
                .map(|x| (f64::from(x) + 0.5 - center).powi(2))
                .iter()
                .sum::<f64>();
            source.set([i, j, k], 1.0 / (1.0 + r2));
        })?;
        ctx.synchronize()?;

        let distance = self.distance.clone();
        let range = self.range.clone();
        exec::sweeping_parallel_for::<S>(
            ctx,
            &self.range,
            self.sweep_blocks,
            SweepDirections::POSITIVE,
            move |i: Index, j: Index, k: Index| {
                let nearest = [[i - 1, j, k], [i, j - 1, k], [i, j, k - 1]]
                    .into_iter()
                    .filter(|&cell| range.contains(cell))
                    .map(|cell| distance.get(cell))
                    .min();
                distance.set([i, j, k], nearest.map_or(0, |d| d + 1));
            },
        )?;
        ctx.synchronize()?;

        let (distance, tally) = (self.distance.clone(), self.tally.clone());
        exec::parallel_for_indices::<S>(
            ctx,
            self.bottom.clone(),
            move |i: Index, j: Index, k: Index| tally.add(distance.get([i, j, k]).into()),
        )?;
        ctx.synchronize()?;

        let mut source_sum = 0.0;
        let source = self.source.clone();
        exec::parallel_reduce_sum::<S, f64>(
            ctx,
            &self.range,
            move |i: Index, j: Index, k: Index, acc: &mut f64| *acc += source.get([i, j, k]),
            &mut source_sum,
        )?;
        let mut source_min = f64::INFINITY;
        let source = self.source.clone();
        exec::parallel_reduce_min::<S, f64>(
            ctx,
            &self.range,
            move |i: Index, j: Index, k: Index, acc: &mut f64| {
                *acc = (*acc).min(source.get([i, j, k]))
            },
            &mut source_min,
        )?;
        let mut distance_sum = 0;
        let distance = self.distance.clone();
        exec::parallel_reduce_sum::<S, u64>(
            ctx,
            &self.range,
            move |i: Index, j: Index, k: Index, acc: &mut u64| {
                *acc += u64::from(distance.get([i, j, k]))
            },
            &mut distance_sum,
        )?;

        let (bottom_cells, bottom_total) = self.tally.read();
        let report = Report {
            source_sum,
            source_min,
            distances: DistanceStats {
                total: distance_sum,
                bottom_cells,
                bottom_total,
            },
        };
        debug!("Evaluation of {:?} yielded {report:?}", self.name());
        *self.report.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(report);
        Ok(())
    }
}

/// Results of a [`Wavefront`] evaluation
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Report {
    /// Integral of the source term
    pub source_sum: f64,

    /// Smallest source term
    pub source_min: f64,

    /// Distance statistics
    pub distances: DistanceStats,
}

/// Statistics of the distance to the origin corner
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DistanceStats {
    /// Sum over the whole domain
    pub total: u64,

    /// Number of bottom face cells
    pub bottom_cells: u64,

    /// Sum over the bottom face
    pub bottom_total: u64,
}

/// Cell count and running total, always updated together
#[derive(Debug, Default)]
struct Tally {
    lock: HybridLock,
    cells: AtomicU64,
    total: AtomicU64,
}
//
impl Tally {
    fn add(&self, value: u64) {
        let _guard = self.lock.lock();
        self.cells.fetch_add(1, Ordering::Relaxed);
        self.total.fetch_add(value, Ordering::Relaxed);
    }

    fn read(&self) -> (u64, u64) {
        let _guard = self.lock.lock();
        (
            self.cells.load(Ordering::Relaxed),
            self.total.load(Ordering::Relaxed),
        )
    }

    fn reset(&self) {
        let _guard = self.lock.lock();
        self.cells.store(0, Ordering::Relaxed);
        self.total.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exec_serial::Serial;
    use exec_threaded::Threaded;
    use std::sync::Once;

    fn init_logger() {
        static INIT_LOGGER: Once = Once::new();
        INIT_LOGGER.call_once(|| {
            let _ = env_logger::builder().is_test(true).try_init();
        });
    }

    #[test]
    fn matches_closed_form() {
        init_logger();
        let ctx = ExecutionContext::default();
        for (size, sweep_blocks) in [(1, 1), (7, 3), (10, 4)] {
            let task = Wavefront::new(size, sweep_blocks);
            task.eval::<Serial>(&ctx).unwrap();
            let serial = task.report().unwrap();
            assert_eq!(serial.distances, task.expected());
            assert!(serial.source_min > 0.0 && serial.source_min <= serial.source_sum);

            task.eval::<Threaded>(&ctx).unwrap();
            let threaded = task.report().unwrap();
            assert_eq!(threaded.distances, serial.distances);
            assert_eq!(threaded.source_min, serial.source_min);
            assert!((threaded.source_sum - serial.source_sum).abs() < 1e-9);
        }
    }
}
