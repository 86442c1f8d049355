use exec::Stream;
use exec_accel::DeviceStream;
use std::sync::Arc;

/// Streams that the benchmarked launches are spread over
fn streams() -> Vec<Arc<dyn Stream>> {
    DeviceStream::spawn_many("bench", 2)
        .expect("Failed to create benchmark streams")
        .into_iter()
        .map(|stream| stream as Arc<dyn Stream>)
        .collect()
}

exec::criterion_benchmark!(exec_accel::Accelerator, streams());
