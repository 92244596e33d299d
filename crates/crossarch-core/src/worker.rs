//! Running a core on its own thread.
//!
//! The core moves onto the worker thread and stays there until `join`.
//! The host sees only the stop flag and the notification stream.

use std::io;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Receiver;

use crate::api::{Core, RunOutcome, StopHandle};
use crate::cores::AnyCore;
use crate::{Architecture, ChannelSink, EmulatorError, Notification};

/// Final state handed back by [`WorkerHandle::join`].
#[derive(Debug)]
pub struct WorkerReport {
    /// Why the run loop ended.
    pub outcome: RunOutcome,
    /// The core, for post-mortem inspection.
    pub core: AnyCore,
}

type WorkerResult = (AnyCore, Result<RunOutcome, EmulatorError>);

/// Host-side handle to a running worker.
#[derive(Debug)]
pub struct WorkerHandle {
    architecture: Architecture,
    stop: StopHandle,
    notifications: Receiver<Notification>,
    thread: JoinHandle<WorkerResult>,
}

/// Moves `core` onto a new thread and runs it until it halts or is stopped.
///
/// The core's sink is replaced with a channel whose receiver is exposed by
/// the returned handle.
///
/// # Errors
///
/// Returns the OS error when the thread cannot be spawned.
pub fn spawn(mut core: AnyCore) -> io::Result<WorkerHandle> {
    let architecture = core.architecture();
    let (sink, notifications) = ChannelSink::pair();
    core.set_sink(Box::new(sink));
    let stop = StopHandle::new();
    let worker_stop = stop.clone();
    let thread = thread::Builder::new()
        .name(format!("crossarch-{}", architecture.tag().to_ascii_lowercase()))
        .spawn(move || {
            let outcome = core.run(&worker_stop);
            (core, outcome)
        })?;
    tracing::debug!(arch = %architecture, "worker spawned");
    Ok(WorkerHandle {
        architecture,
        stop,
        notifications,
        thread,
    })
}

impl WorkerHandle {
    /// Architecture of the core being run.
    #[must_use]
    pub const fn architecture(&self) -> Architecture {
        self.architecture
    }

    /// Clone of the worker's stop flag.
    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Asks the worker to stop at its next checked cycle boundary.
    pub fn request_stop(&self) {
        self.stop.request_stop();
    }

    /// Notifications emitted by the core, in execution order.
    #[must_use]
    pub const fn notifications(&self) -> &Receiver<Notification> {
        &self.notifications
    }

    /// Whether the worker thread has finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Waits for the worker and returns the run outcome with the core.
    ///
    /// # Errors
    ///
    /// Returns [`EmulatorError::WorkerPanicked`] when the thread panicked, or
    /// the run loop's own error.
    pub fn join(self) -> Result<WorkerReport, EmulatorError> {
        let (core, outcome) = self
            .thread
            .join()
            .map_err(|_| EmulatorError::WorkerPanicked)?;
        let outcome = outcome?;
        tracing::debug!(arch = %self.architecture, steps = outcome.steps, halt = %outcome.halt, "worker joined");
        Ok(WorkerReport { outcome, core })
    }
}
