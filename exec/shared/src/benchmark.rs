//! Benchmarking utilities
//!
//! Please consider using the [`criterion_benchmark!`](crate::criterion_benchmark)
//! macro instead of calling these implementation details directly.

use crate::{
    ExecutionContext, ExecutionSpace, GridField, Index, IterationRange, RuntimeConfig, Stream,
    StreamHandle, Sum,
};
use clap::{Args, Command, FromArgMatches};
use criterion::{BenchmarkId, Criterion, Throughput};
use std::{
    hint::black_box,
    sync::{Arc, Once},
};

/// Re-export criterion for the criterion_benchmark macro
pub use criterion;

/// Macro that generates a complete criterion benchmark harness for a backend
///
/// The optional second argument is an expression evaluating to the
/// `Vec<Arc<dyn exec::Stream>>` that accelerator launches should target.
#[macro_export]
macro_rules! criterion_benchmark {
    ($space:ty) => {
        $crate::criterion_benchmark!($space, Vec::new());
    };
    ($space:ty, $streams:expr) => {
        fn criterion_benchmark(c: &mut $crate::benchmark::criterion::Criterion) {
            $crate::benchmark::criterion_benchmark::<$space>(c, stringify!($space), $streams)
        }
        $crate::benchmark::criterion::criterion_group!(benches, criterion_benchmark);
        $crate::benchmark::criterion::criterion_main!(benches);
    };
}

// Make sure env_logger is only initialized once
fn init_logger() {
    static INIT_LOGGER: Once = Once::new();
    INIT_LOGGER.call_once(env_logger::init);
}

/// Common criterion benchmark for all execution backends
/// Use via the criterion_benchmark macro
pub fn criterion_benchmark<S: ExecutionSpace>(
    c: &mut Criterion,
    space_name: &str,
    streams: Vec<Arc<dyn Stream>>,
) {
    init_logger();

    let config = RuntimeConfig::from_arg_matches(
        &RuntimeConfig::augment_args(Command::default().no_binary_name(true))
            .get_matches_from(None::<&str>),
    )
    .expect("Failed to parse arguments from defaults & environment");
    let ctx =
        ExecutionContext::new(&config).with_streams(streams.iter().map(StreamHandle::from_dyn));

    let mut group = c.benchmark_group(space_name.to_owned());
    for size_pow2 in 3..=7 {
        let size = 2i32.pow(size_pow2);
        let range = IterationRange::new([0; 3], [size; 3]);
        let num_cells = range.size() as u64;
        group.throughput(Throughput::Elements(num_cells));

        let field = Arc::new(GridField::new(&range, 0.0f32));
        group.bench_function(
            BenchmarkId::new("parallel_for", format!("{size}³cells")),
            |b| {
                b.iter(|| {
                    let field = field.clone();
                    S::parallel_for(&ctx, black_box(&range), move |i: Index, j: Index, k: Index| {
                        field.set([i, j, k], (i + j + k) as f32)
                    })
                    .unwrap();
                    ctx.synchronize().unwrap();
                })
            },
        );
        group.bench_function(
            BenchmarkId::new("parallel_reduce_sum", format!("{size}³cells")),
            |b| {
                b.iter(|| {
                    let mut acc = 0u64;
                    S::parallel_reduce::<Sum<u64>, _>(
                        &ctx,
                        black_box(&range),
                        |i: Index, j: Index, k: Index, acc: &mut u64| *acc += (i ^ j ^ k) as u64,
                        &mut acc,
                    )
                    .unwrap();
                    black_box(acc)
                })
            },
        );
        black_box(field);
    }
    group.finish();
}
