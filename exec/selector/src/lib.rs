//! Pick an execution backend for each task, among those allowed by enabled
//! crate features
//!
//! Tasks declare which capabilities they were written for. Capabilities that
//! the build does not support are downgraded to the best supported one below
//! them, which is exposed at the type level by the [`AcceleratorSpace`],
//! [`ThreadedSpace`] and [`SequentialSpace`] typedefs. Then [`register()`]
//! picks one of the downgraded capabilities according to the run
//! configuration, and binds the matching variant of the task into a
//! [`WorkItem`].

use exec::{
    Capability, CapabilitySet, ExecutionContext, ExecutionHints, ExecutionSpace, FixedArray,
    PortableTask, RuntimeConfig,
};
#[allow(unused_imports)]
use log::{debug, error, info, log, trace, warn};
use std::{
    fmt::{self, Debug},
    sync::Arc,
};
use thiserror::Error;

cfg_if::cfg_if! {
    if #[cfg(feature = "accel")] {
        pub type AcceleratorSpace = exec_accel::Accelerator;
    } else if #[cfg(feature = "threaded")] {
        pub type AcceleratorSpace = exec_threaded::Threaded;
    } else if #[cfg(feature = "serial")] {
        pub type AcceleratorSpace = exec_serial::Serial;
    } else {
        std::compile_error!("Please enable at least one execution backend via crate features");
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "threaded")] {
        pub type ThreadedSpace = exec_threaded::Threaded;
    } else if #[cfg(feature = "serial")] {
        pub type ThreadedSpace = exec_serial::Serial;
    }
}

#[cfg(feature = "serial")]
pub type SequentialSpace = exec_serial::Serial;

/// Capabilities that a task declares support for, up to one per backend
pub type Candidates = FixedArray<Capability, 3>;

/// Capabilities that this build supports
pub fn build_support() -> CapabilitySet {
    let mut support = CapabilitySet::EMPTY;
    if cfg!(feature = "serial") {
        support = support.with(Capability::Sequential);
    }
    if cfg!(feature = "threaded") {
        support = support.with(Capability::SharedMemoryThreaded);
    }
    if cfg!(feature = "accel") {
        support = support.with(Capability::Accelerator);
    }
    support
}

/// Pick the capability that a task should run with
///
/// Each candidate is first downgraded to the best capability of `support`
/// that can stand in for it. Among the resulting capabilities, the
/// accelerator is preferred if `use_accelerator` is set, then threads, then
/// sequential execution.
pub fn negotiate(
    task: &str,
    candidates: &Candidates,
    support: CapabilitySet,
    use_accelerator: bool,
) -> Result<Capability, NegotiationError> {
    if candidates.is_empty() {
        return Err(NegotiationError::NoCandidates { task: task.into() });
    }
    let usable = candidates
        .iter()
        .filter_map(|candidate| candidate.downgrade(support))
        .collect::<CapabilitySet>();
    if usable.is_empty() {
        return Err(NegotiationError::NoUsableCandidate {
            task: task.into(),
            declared: candidates.to_vec(),
        });
    }
    if use_accelerator && usable.contains(Capability::Accelerator) {
        Ok(Capability::Accelerator)
    } else if usable.contains(Capability::SharedMemoryThreaded) {
        Ok(Capability::SharedMemoryThreaded)
    } else if usable.contains(Capability::Sequential) {
        Ok(Capability::Sequential)
    } else {
        Err(NegotiationError::AcceleratorDisabled { task: task.into() })
    }
}

/// Register a task for execution with the best capability that it supports
///
/// Failure means that the task cannot run in this build or configuration,
/// which should be treated as fatal.
pub fn register<T: PortableTask>(
    task: Arc<T>,
    candidates: &Candidates,
    config: &RuntimeConfig,
) -> Result<WorkItem, NegotiationError> {
    register_with(task, candidates, build_support(), config)
}

/// Like [`register()`], but with an explicit set of supported capabilities
///
/// Capabilities of `support` that this build does not support are still
/// downgraded at the type level.
pub fn register_with<T: PortableTask>(
    task: Arc<T>,
    candidates: &Candidates,
    support: CapabilitySet,
    config: &RuntimeConfig,
) -> Result<WorkItem, NegotiationError> {
    let name = task.name().to_owned();
    let capability = negotiate(&name, candidates, support, config.use_accelerator)
        .inspect_err(|e| error!("Failed to register task: {e}"))?;
    let item = bind(task, capability).ok_or_else(|| {
        let e = NegotiationError::NoUsableCandidate {
            task: name.clone(),
            declared: candidates.to_vec(),
        };
        error!("Failed to register task: {e}");
        e
    })?;
    info!(
        "Task {name:?} will run with {} capability (negotiated {capability})",
        item.capability
    );
    Ok(item)
}

/// Bind the variant of a task for a capability, after type-level downgrade
fn bind<T: PortableTask>(task: Arc<T>, capability: Capability) -> Option<WorkItem> {
    match capability {
        Capability::Accelerator => Some(WorkItem::new::<AcceleratorSpace, T>(task)),
        #[cfg(any(feature = "threaded", feature = "serial"))]
        Capability::SharedMemoryThreaded => Some(WorkItem::new::<ThreadedSpace, T>(task)),
        #[cfg(feature = "serial")]
        Capability::Sequential => Some(WorkItem::new::<SequentialSpace, T>(task)),
        #[allow(unreachable_patterns)]
        _ => None,
    }
}

/// Type-erased task variant, ready for execution
pub type Kernel = Box<dyn Fn(&ExecutionContext) -> exec::Result<()> + Send + Sync>;

/// Task bound to the execution backend it will run on
pub struct WorkItem {
    /// Task name
    name: String,

    /// Capability of the backend that the task is bound to
    capability: Capability,

    /// Scheduling hints for the backend
    hints: ExecutionHints,

    /// Task variant for the backend
    kernel: Kernel,
}
//
impl WorkItem {
    /// Bind the variant of `task` for backend `S`
    fn new<S: ExecutionSpace, T: PortableTask>(task: Arc<T>) -> Self {
        Self {
            name: task.name().to_owned(),
            capability: S::CAPABILITY,
            hints: ExecutionHints::for_space::<S>(),
            kernel: Box::new(move |ctx| task.eval::<S>(ctx)),
        }
    }

    /// Task name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Capability of the backend that the task is bound to
    pub fn capability(&self) -> Capability {
        self.capability
    }

    /// Scheduling hints for the backend
    pub fn hints(&self) -> ExecutionHints {
        self.hints
    }

    /// Run the task
    ///
    /// On the accelerator, work may still be in flight when this returns.
    pub fn run(&self, ctx: &ExecutionContext) -> exec::Result<()> {
        (self.kernel)(ctx)
    }
}
//
impl Debug for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkItem")
            .field("name", &self.name)
            .field("capability", &self.capability)
            .field("hints", &self.hints)
            .finish_non_exhaustive()
    }
}

/// Reasons why a task cannot be registered
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum NegotiationError {
    /// The task declared no capability at all
    #[error("task {task:?} does not declare any supported capability")]
    NoCandidates { task: String },

    /// None of the task's capabilities can run in this build
    #[error("none of the capabilities {declared:?} of task {task:?} is supported by this build")]
    NoUsableCandidate {
        task: String,
        declared: Vec<Capability>,
    },

    /// The task only runs on the accelerator, which is disabled
    #[error("task {task:?} can only run on the accelerator, which is disabled")]
    AcceleratorDisabled { task: String },
}
