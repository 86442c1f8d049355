//! Backend-agnostic tasks

use crate::{ExecutionContext, ExecutionSpace, Result};

/// Unit of simulation work written once for every execution backend
///
/// `eval` is generic over the backend, so a task provides all of its backend
/// variants from a single definition. Which variant actually runs is decided
/// when the task is registered, see `exec_selector::register()`.
pub trait PortableTask: Send + Sync + 'static {
    /// Name used in diagnostics
    fn name(&self) -> &str;

    /// Run the task's kernels on backend `S`
    fn eval<S: ExecutionSpace>(&self, ctx: &ExecutionContext) -> Result<()>;
}
