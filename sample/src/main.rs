mod wavefront;

use crate::wavefront::Wavefront;
use clap::Parser;
use exec::{Capability, ExecutionContext, RuntimeConfig};
use exec_selector::Candidates;
use eyre::Result;
#[allow(unused_imports)]
use log::{debug, error, info, log, trace, warn};
use std::{num::NonZeroUsize, sync::Arc};

/// Compute distances over a cubic domain with the best available backend
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Execution settings
    #[command(flatten)]
    config: RuntimeConfig,

    /// Number of cells along each axis of the domain
    #[arg(short, long, default_value_t = 32)]
    size: u16,

    /// Number of sweep blocks along each axis of the domain
    #[arg(long, default_value_t = NonZeroUsize::new(4).unwrap())]
    sweep_blocks: NonZeroUsize,

    /// Number of accelerator streams that launches are spread over
    #[arg(long, default_value_t = NonZeroUsize::new(2).unwrap())]
    streams: NonZeroUsize,
}

fn main() -> Result<()> {
    // Enable logging to stderr, configured via RUST_LOG
    env_logger::init();

    // Parse CLI arguments and set up the backends
    let args = Args::parse();
    #[cfg(feature = "threaded")]
    {
        exec_threaded::configure_thread_pool(&args.config)?;
    }

    // Register the task with every capability that it was written for
    let task = Arc::new(Wavefront::new(args.size, args.sweep_blocks.get()));
    let candidates = Candidates::from_slice(&[
        Capability::Accelerator,
        Capability::SharedMemoryThreaded,
        Capability::Sequential,
    ])?;
    let item = exec_selector::register(task.clone(), &candidates, &args.config)?;
    println!(
        "Running {:?} on the {} backend ({:?})",
        item.name(),
        item.capability(),
        item.hints()
    );

    // Streams must outlive every context that refers to them
    let ctx = ExecutionContext::new(&args.config);
    #[cfg(feature = "accel")]
    let (ctx, _streams) = {
        let streams = exec_accel::DeviceStream::spawn_many("sample", args.streams.get())?;
        let handles = streams.iter().map(exec::StreamHandle::new);
        (ctx.with_streams(handles), streams)
    };
    #[cfg(not(feature = "accel"))]
    {
        if args.streams.get() > 1 {
            warn!("Accelerator support is not compiled in, ignoring --streams");
        }
    }

    // Run the task and wait for all of its work to complete
    item.run(&ctx)?;
    ctx.synchronize()?;

    // Check results against the closed-form expectation
    let report = task
        .report()
        .ok_or_else(|| eyre::eyre!("task did not produce a report"))?;
    let expected = task.expected();
    println!("Source integral: {:.6}", report.source_sum);
    println!("Smallest source term: {:.6}", report.source_min);
    println!("Distance statistics: {:?}", report.distances);
    if report.distances != expected {
        eyre::bail!("distance statistics do not match expectations {expected:?}");
    }
    Ok(())
}
