//! Things that can go wrong while dispatching work

use thiserror::Error;

/// Dispatch and resource errors
///
/// None of these are transient: they signal a configuration or programming
/// mistake, and the failed operation must not be retried.
#[derive(Debug, Error)]
pub enum Error {
    /// Accelerator work was dispatched without any stream to run it on
    #[error("accelerator dispatch requires at least one execution stream")]
    NoStreams,

    /// A stream handle was null, or its stream was already destroyed
    #[error("execution stream #{index} is null or was destroyed")]
    NullStream { index: usize },

    /// A stream was requested beyond the end of the attached list
    #[error("requested execution stream #{index}, but only {available} are attached")]
    MissingStream { index: usize, available: usize },

    /// A stream stopped accepting work
    #[error("execution stream {stream:?} is no longer accepting work")]
    StreamDisconnected { stream: String },

    /// Some kernels submitted to a stream panicked
    #[error("{count} kernel launch(es) panicked on execution stream {stream:?}")]
    KernelPanicked { stream: String, count: usize },

    /// A fixed-capacity container was asked to hold too many elements
    #[error("requested {requested} elements from a container of capacity {capacity}")]
    CapacityExceeded { capacity: usize, requested: usize },

    /// A sweep was requested with zero blocks per axis
    #[error("a sweep needs at least one block per axis")]
    InvalidPartitionCount,
}
//
pub type Result<T> = std::result::Result<T, Error>;
