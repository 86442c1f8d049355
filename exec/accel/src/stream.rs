//! Emulated device streams
//!
//! Each stream is an in-order command queue served by a dedicated worker
//! thread, which plays the part of the device's stream scheduler.

use crossbeam_channel::{Receiver, Sender};
use exec::{Error, Stream, Work};
#[allow(unused_imports)]
use log::{debug, error, info, log, trace, warn};
use std::{
    any::Any,
    io,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
};
use thiserror::Error;

/// Commands understood by a stream worker
enum Command {
    /// Run some work
    Launch(Work),

    /// Signal that all previously submitted work has completed
    Fence(Sender<()>),
}

/// In-order queue of device work
///
/// Work runs in submission order, one launch at a time. Dropping the stream
/// waits for all pending work to complete.
pub struct DeviceStream {
    /// Stream name
    name: String,

    /// Command queue, only `None` during teardown
    commands: Option<Sender<Command>>,

    /// Worker thread, only `None` during teardown
    worker: Option<JoinHandle<()>>,

    /// Number of launches that panicked since the last synchronization
    panics: Arc<AtomicUsize>,
}
//
impl DeviceStream {
    /// Create a stream and start its worker thread
    pub fn new(name: impl Into<String>) -> Result<Arc<Self>, SpawnError> {
        let name = name.into();
        let (commands, queue) = crossbeam_channel::unbounded();
        let panics = Arc::new(AtomicUsize::new(0));
        let worker = thread::Builder::new()
            .name(format!("stream {name}"))
            .spawn({
                let name = name.clone();
                let panics = panics.clone();
                move || serve(&name, queue, &panics)
            })
            .map_err(|source| SpawnError {
                name: name.clone(),
                source,
            })?;
        info!("Created execution stream {name:?}");
        Ok(Arc::new(Self {
            name,
            commands: Some(commands),
            worker: Some(worker),
            panics,
        }))
    }

    /// Create `count` streams named `{prefix}0`, `{prefix}1`, ...
    pub fn spawn_many(prefix: &str, count: usize) -> Result<Vec<Arc<Self>>, SpawnError> {
        (0..count)
            .map(|idx| Self::new(format!("{prefix}{idx}")))
            .collect()
    }

    /// Send a command to the worker
    fn send(&self, command: Command) -> exec::Result<()> {
        self.commands
            .as_ref()
            .and_then(|commands| commands.send(command).ok())
            .ok_or_else(|| self.disconnected())
    }

    /// Error reported when the worker is gone
    fn disconnected(&self) -> Error {
        Error::StreamDisconnected {
            stream: self.name.clone(),
        }
    }
}
//
impl Stream for DeviceStream {
    fn name(&self) -> &str {
        &self.name
    }

    fn submit(&self, work: Work) -> exec::Result<()> {
        self.send(Command::Launch(work))
    }

    fn synchronize(&self) -> exec::Result<()> {
        let (done, completion) = crossbeam_channel::bounded(1);
        self.send(Command::Fence(done))?;
        completion.recv().map_err(|_| self.disconnected())?;
        match self.panics.swap(0, Ordering::Relaxed) {
            0 => Ok(()),
            count => Err(Error::KernelPanicked {
                stream: self.name.clone(),
                count,
            }),
        }
    }
}
//
impl Drop for DeviceStream {
    fn drop(&mut self) {
        // Closing the queue makes the worker exit after pending work is done
        self.commands = None;
        let Some(worker) = self.worker.take() else {
            return;
        };
        if worker.thread().id() == thread::current().id() {
            warn!("Stream {:?} was dropped by its own work, not waiting for it", self.name);
            return;
        }
        if worker.join().is_err() {
            error!("Worker thread of stream {:?} crashed", self.name);
        }
        let panics = self.panics.load(Ordering::Relaxed);
        if panics > 0 {
            warn!(
                "Stream {:?} was dropped with {panics} unreported kernel panic(s)",
                self.name
            );
        }
        debug!("Destroyed execution stream {:?}", self.name);
    }
}

/// Run the commands of a stream until its queue is closed
fn serve(name: &str, queue: Receiver<Command>, panics: &AtomicUsize) {
    for command in queue {
        match command {
            Command::Launch(work) => {
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(work)) {
                    error!(
                        "Kernel launch panicked on stream {name:?}: {}",
                        panic_message(&*payload)
                    );
                    panics.fetch_add(1, Ordering::Relaxed);
                }
            }
            Command::Fence(done) => {
                // The synchronizing thread may have given up waiting
                let _ = done.send(());
            }
        }
    }
}

/// Human-readable panic payload
fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "<non-string panic payload>"
    }
}

/// Failed to start the worker thread of a stream
#[derive(Debug, Error)]
#[error("failed to start the worker thread of stream {name:?}")]
pub struct SpawnError {
    /// Name of the stream
    name: String,

    /// Underlying OS error
    #[source]
    source: io::Error,
}
