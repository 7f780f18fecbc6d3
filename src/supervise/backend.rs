// src/supervise/backend.rs

//! Pluggable supervisor backend abstraction.
//!
//! The driver talks to a `SuperviseBackend` instead of spawning processes
//! directly, so tests can substitute a fake tool that writes scripted lines
//! to the run log and exits on cue.

use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::driver::JobEvent;
use crate::errors::Result;
use crate::supervise::process::{run_tool, ToolExit};
use crate::supervise::spec::ToolSpec;

/// Handle for one supervised attempt.
#[derive(Debug)]
pub struct SupervisorHandle {
    cancel: Arc<Mutex<Option<oneshot::Sender<()>>>>,
    exit_rx: oneshot::Receiver<ToolExit>,
}

impl SupervisorHandle {
    pub fn new(cancel: oneshot::Sender<()>, exit_rx: oneshot::Receiver<ToolExit>) -> Self {
        Self {
            cancel: Arc::new(Mutex::new(Some(cancel))),
            exit_rx,
        }
    }

    /// Sharable canceller for this attempt.
    pub fn canceller(&self) -> Canceller {
        Canceller {
            cancel: Arc::clone(&self.cancel),
        }
    }

    /// Force-terminate the supervised process. Idempotent: later calls are
    /// no-ops.
    pub fn cancel(&self) {
        Canceller {
            cancel: Arc::clone(&self.cancel),
        }
        .cancel();
    }

    /// Wait for the attempt to finish.
    ///
    /// If the supervisor task died without reporting (panic, runtime
    /// shutdown) the attempt is reported as a failed, non-timed-out exit.
    pub async fn wait(self) -> ToolExit {
        match self.exit_rx.await {
            Ok(exit) => exit,
            Err(_) => ToolExit {
                exit_code: -1,
                timed_out: false,
            },
        }
    }
}

/// Clonable cancellation handle, detached from the `SupervisorHandle` so the
/// monitor can hold it while the driver owns the wait side.
#[derive(Debug, Clone)]
pub struct Canceller {
    cancel: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

impl Canceller {
    pub fn cancel(&self) {
        let sender = self.cancel.lock().unwrap().take();
        match sender {
            Some(tx) => {
                if tx.send(()).is_err() {
                    debug!("tool already exited; cancel is a no-op");
                }
            }
            None => debug!("cancel already requested; ignoring repeat"),
        }
    }
}

/// Trait abstracting how a tool attempt is launched.
///
/// Production code uses [`RealSuperviseBackend`]; tests can provide an
/// implementation that doesn't spawn real processes.
pub trait SuperviseBackend: Send {
    fn launch(&mut self, spec: ToolSpec) -> Result<SupervisorHandle>;
}

/// Real backend: supervises an OS process via [`run_tool`].
pub struct RealSuperviseBackend {
    events: mpsc::Sender<JobEvent>,
}

impl RealSuperviseBackend {
    pub fn new(events: mpsc::Sender<JobEvent>) -> Self {
        Self { events }
    }
}

impl SuperviseBackend for RealSuperviseBackend {
    fn launch(&mut self, spec: ToolSpec) -> Result<SupervisorHandle> {
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let (exit_tx, exit_rx) = oneshot::channel();
        let events = self.events.clone();

        tokio::spawn(async move {
            match run_tool(spec, events, cancel_rx).await {
                Ok(exit) => {
                    let _ = exit_tx.send(exit);
                }
                Err(e) => {
                    tracing::error!(error = %e, "supervisor failed to run tool");
                    let _ = exit_tx.send(ToolExit {
                        exit_code: -1,
                        timed_out: false,
                    });
                }
            }
        });

        Ok(SupervisorHandle::new(cancel_tx, exit_rx))
    }
}
