//! Execution streams and the weak handles used to target them
//!
//! A stream is an in-order queue of work on some execution resource. This
//! layer never creates nor destroys streams: they are created by whoever
//! drives task execution, and only referred to here through [`StreamHandle`]s.

use crate::Result;
use std::{
    fmt::{self, Debug},
    sync::{Arc, Weak},
};

/// Unit of work submitted to a stream
pub type Work = Box<dyn FnOnce() + Send + 'static>;

/// In-order work queue
///
/// Work submitted to a stream executes in submission order, and each unit of
/// work completes before the next one starts.
pub trait Stream: Send + Sync {
    /// Human-readable stream name, for diagnostics
    fn name(&self) -> &str;

    /// Enqueue some work and return without waiting for it to execute
    fn submit(&self, work: Work) -> Result<()>;

    /// Wait for all previously submitted work to complete
    ///
    /// Failures of previously submitted work are reported here.
    fn synchronize(&self) -> Result<()>;
}

/// Non-owning reference to a [`Stream`]
///
/// A handle may be null, or may outlive the stream it points to. Both
/// situations are detected when the handle is upgraded for use.
#[derive(Clone, Default)]
pub struct StreamHandle(Option<Weak<dyn Stream>>);
//
impl StreamHandle {
    /// Handle that points to no stream
    pub fn null() -> Self {
        Self(None)
    }

    /// Handle to an existing stream
    pub fn new<S: Stream + 'static>(stream: &Arc<S>) -> Self {
        let stream: Arc<dyn Stream> = stream.clone();
        Self(Some(Arc::downgrade(&stream)))
    }

    /// Handle to an existing type-erased stream
    pub fn from_dyn(stream: &Arc<dyn Stream>) -> Self {
        Self(Some(Arc::downgrade(stream)))
    }

    /// Truth that this handle was created null
    pub fn is_null(&self) -> bool {
        self.0.is_none()
    }

    /// Access the stream, if it still exists
    pub fn upgrade(&self) -> Option<Arc<dyn Stream>> {
        self.0.as_ref().and_then(Weak::upgrade)
    }
}
//
impl Debug for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(stream) => write!(f, "StreamHandle({:?})", stream.name()),
            None if self.is_null() => f.write_str("StreamHandle(null)"),
            None => f.write_str("StreamHandle(<dropped>)"),
        }
    }
}
//
impl PartialEq for StreamHandle {
    fn eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (Some(a), Some(b)) => Weak::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}
//
impl Eq for StreamHandle {}

#[cfg(test)]
mod tests {
    use super::*;

    struct Inline;
    //
    impl Stream for Inline {
        fn name(&self) -> &str {
            "inline"
        }

        fn submit(&self, work: Work) -> Result<()> {
            work();
            Ok(())
        }

        fn synchronize(&self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn handles_are_weak() {
        let stream = Arc::new(Inline);
        let handle = StreamHandle::new(&stream);
        assert!(!handle.is_null());
        assert_eq!(handle.upgrade().map(|s| s.name().to_owned()), Some("inline".into()));
        assert_eq!(handle, handle.clone());
        assert_ne!(handle, StreamHandle::null());

        drop(stream);
        assert!(handle.upgrade().is_none());
        assert!(!handle.is_null());
    }
}
