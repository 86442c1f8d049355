//! Run-wide configuration

use clap::Args;
use std::num::{NonZeroU32, NonZeroUsize};

/// Default number of accelerator threads per team
pub const DEFAULT_THREADS_PER_BLOCK: u32 = 256;

/// Default number of accelerator teams per stream launch
pub const DEFAULT_BLOCKS_PER_LOOP: u32 = 1;

/// Run-wide execution settings
///
/// Can be flattened into a host program's CLI, and every tuning knob can also
/// be set through environment variables.
#[derive(Args, Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub struct RuntimeConfig {
    /// Run tasks that support it on the accelerator
    ///
    /// Tasks which do not declare accelerator support, and builds that were
    /// compiled without the accelerator backend, are unaffected.
    #[arg(long)]
    pub use_accelerator: bool,

    /// Number of accelerator threads per team
    ///
    /// Launches over too few cells to keep this many threads busy are
    /// automatically shrunk.
    #[arg(long, env, default_value_t = NonZeroU32::new(DEFAULT_THREADS_PER_BLOCK).unwrap())]
    pub threads_per_block: NonZeroU32,

    /// Number of accelerator teams per launch on each stream
    #[arg(long, env, default_value_t = NonZeroU32::new(DEFAULT_BLOCKS_PER_LOOP).unwrap())]
    pub blocks_per_loop: NonZeroU32,

    /// Minimal number of cells per threaded work item
    ///
    /// There is a granularity compromise between exposing opportunities for
    /// parallelism and keeping scheduling overhead low. By default, the
    /// threaded backend lets its scheduler split work down to single cells.
    #[arg(long, env)]
    pub chunk_size: Option<NonZeroUsize>,

    /// Number of worker threads of the threaded backend
    #[arg(short = 'j', long, env)]
    pub num_threads: Option<NonZeroUsize>,
}
//
impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            use_accelerator: false,
            threads_per_block: NonZeroU32::new(DEFAULT_THREADS_PER_BLOCK)
                .expect("constant is nonzero"),
            blocks_per_loop: NonZeroU32::new(DEFAULT_BLOCKS_PER_LOOP)
                .expect("constant is nonzero"),
            chunk_size: None,
            num_threads: None,
        }
    }
}
