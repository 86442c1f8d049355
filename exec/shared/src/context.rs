//! Per-invocation execution context

use crate::{
    config::RuntimeConfig,
    stream::{Stream, StreamHandle},
    Error, IterationRange, Result,
};
#[allow(unused_imports)]
use log::{debug, error, info, log, trace, warn};
use std::{
    num::{NonZeroU32, NonZeroUsize},
    sync::Arc,
};

/// State threaded through every dispatch call of one task invocation
///
/// Carries accelerator launch tuning and the streams that the invocation may
/// submit work to. It owns no resource: streams are injected by the caller
/// and only weakly referenced.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecutionContext {
    /// Launch tuning copied from the run configuration
    config: RuntimeConfig,

    /// Streams available to this invocation, in launch order
    streams: Vec<StreamHandle>,
}
//
impl ExecutionContext {
    /// Set up a context with the tuning parameters of a run configuration
    pub fn new(config: &RuntimeConfig) -> Self {
        Self {
            config: *config,
            streams: Vec::new(),
        }
    }

    /// Attach a list of streams, replacing any previously attached ones
    pub fn with_streams(mut self, streams: impl IntoIterator<Item = StreamHandle>) -> Self {
        self.streams = streams.into_iter().collect();
        self
    }

    /// Attach one more stream
    pub fn attach_stream(&mut self, stream: StreamHandle) {
        self.streams.push(stream);
    }

    /// Requested number of accelerator threads per team
    pub fn threads_per_block(&self) -> NonZeroU32 {
        self.config.threads_per_block
    }

    /// Requested number of accelerator teams per stream launch
    pub fn blocks_per_loop(&self) -> NonZeroU32 {
        self.config.blocks_per_loop
    }

    /// Minimal number of cells per threaded work item
    pub fn chunk_size(&self) -> Option<NonZeroUsize> {
        self.config.chunk_size
    }

    /// Streams attached to this context
    pub fn streams(&self) -> &[StreamHandle] {
        &self.streams
    }

    /// Number of attached streams
    pub fn num_streams(&self) -> usize {
        self.streams.len()
    }

    /// Resolve the streams that a launch over `range` should target
    ///
    /// Streams attached to the range take precedence over those of the
    /// context. Every handle is checked, so that no work is submitted if any
    /// of the target streams is unusable.
    pub fn launch_streams(&self, range: Option<&IterationRange>) -> Result<Vec<Arc<dyn Stream>>> {
        let handles = match range {
            Some(range) if range.num_streams() > 0 => range.streams(),
            _ => self.streams(),
        };
        if handles.is_empty() {
            error!("Accelerator dispatch was attempted without any stream");
            return Err(Error::NoStreams);
        }
        handles
            .iter()
            .enumerate()
            .map(|(index, handle)| {
                handle.upgrade().ok_or_else(|| {
                    error!("Accelerator stream #{index} is unusable: {handle:?}");
                    Error::NullStream { index }
                })
            })
            .collect()
    }

    /// Wait for all work submitted to this context's streams to complete
    ///
    /// This is the completion barrier that must separate asynchronous
    /// dispatches from any consumer of their results. Every stream is
    /// synchronized even if some fail, and the first failure is reported.
    pub fn synchronize(&self) -> Result<()> {
        let mut result = Ok(());
        for (index, handle) in self.streams.iter().enumerate() {
            let outcome = match handle.upgrade() {
                Some(stream) => stream.synchronize(),
                None => Err(Error::NullStream { index }),
            };
            if result.is_ok() {
                result = outcome;
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::Work;

    struct Inline(&'static str);
    //
    impl Stream for Inline {
        fn name(&self) -> &str {
            self.0
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
    fn range_streams_take_precedence() {
        let a = Arc::new(Inline("a"));
        let b = Arc::new(Inline("b"));
        let context = ExecutionContext::default().with_streams([StreamHandle::new(&a)]);
        let range = IterationRange::new([0; 3], [4; 3]);

        let streams = context.launch_streams(Some(&range)).unwrap();
        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0].name(), "a");

        let range = range.with_streams([StreamHandle::new(&b), StreamHandle::new(&a)]);
        let names = context
            .launch_streams(Some(&range))
            .unwrap()
            .iter()
            .map(|s| s.name().to_owned())
            .collect::<Vec<_>>();
        assert_eq!(names, ["b", "a"]);
    }

    #[test]
    fn unusable_streams_are_fatal() {
        let context = ExecutionContext::default();
        assert!(matches!(context.launch_streams(None), Err(Error::NoStreams)));

        let live = Arc::new(Inline("live"));
        let context = context.with_streams([StreamHandle::new(&live), StreamHandle::null()]);
        assert!(matches!(
            context.launch_streams(None),
            Err(Error::NullStream { index: 1 })
        ));
        assert!(context.synchronize().is_err());

        let dropped = {
            let stream = Arc::new(Inline("dropped"));
            StreamHandle::new(&stream)
        };
        let context = ExecutionContext::default().with_streams([dropped]);
        assert!(matches!(
            context.launch_streams(None),
            Err(Error::NullStream { index: 0 })
        ));
    }
}
