use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use fragrun::driver::JobEvent;
use fragrun::errors::Result;
use fragrun::supervise::backend::{SupervisorHandle, SuperviseBackend};
use fragrun::supervise::process::ToolExit;
use fragrun::supervise::spec::ToolSpec;

/// One scripted attempt of the fake tool.
#[derive(Debug, Clone)]
pub enum ScriptedAttempt {
    /// Write the given console text to the run log, emit one tick, then exit.
    ExitAfter {
        console: String,
        delay: Duration,
        exit: ToolExit,
    },
    /// Write the console text, keep ticking until cancelled, then exit with
    /// the given status.
    HoldUntilCancelled { console: String, exit: ToolExit },
}

impl ScriptedAttempt {
    pub fn clean_exit(console: &str) -> Self {
        Self::ExitAfter {
            console: console.to_string(),
            delay: Duration::ZERO,
            exit: ToolExit {
                exit_code: 0,
                timed_out: false,
            },
        }
    }

    pub fn crash(console: &str, exit_code: i32) -> Self {
        Self::ExitAfter {
            console: console.to_string(),
            delay: Duration::ZERO,
            exit: ToolExit {
                exit_code,
                timed_out: false,
            },
        }
    }

    /// An attempt killed at its wall-clock limit, as the real supervisor
    /// reports it.
    pub fn timed_out(console: &str) -> Self {
        Self::ExitAfter {
            console: console.to_string(),
            delay: Duration::ZERO,
            exit: ToolExit {
                exit_code: -1,
                timed_out: true,
            },
        }
    }
}

/// A fake supervisor backend that:
/// - records every launched `ToolSpec`
/// - plays one `ScriptedAttempt` per launch (last script repeats)
/// - writes scripted console text to the attempt's run log, so the progress
///   parser sees realistic input.
pub struct FakeSupervisor {
    events: mpsc::Sender<JobEvent>,
    script: VecDeque<ScriptedAttempt>,
    launches: Arc<Mutex<Vec<ToolSpec>>>,
    tick_interval: Duration,
}

impl FakeSupervisor {
    pub fn new(events: mpsc::Sender<JobEvent>, script: Vec<ScriptedAttempt>) -> Self {
        Self {
            events,
            script: script.into(),
            launches: Arc::new(Mutex::new(Vec::new())),
            tick_interval: Duration::from_millis(20),
        }
    }

    /// Override the cadence of `HoldUntilCancelled` ticks. Paused-clock
    /// tests use long intervals to cover hours of simulated run time.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn launches(&self) -> Arc<Mutex<Vec<ToolSpec>>> {
        Arc::clone(&self.launches)
    }

    pub fn launch_count(&self) -> usize {
        self.launches.lock().unwrap().len()
    }
}

impl SuperviseBackend for FakeSupervisor {
    fn launch(&mut self, spec: ToolSpec) -> Result<SupervisorHandle> {
        self.launches.lock().unwrap().push(spec.clone());

        let attempt = match self.script.pop_front() {
            Some(a) => {
                if self.script.is_empty() {
                    self.script.push_back(a.clone());
                }
                a
            }
            None => ScriptedAttempt::clean_exit(""),
        };

        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        let (exit_tx, exit_rx) = oneshot::channel::<ToolExit>();
        let events = self.events.clone();
        let tick_interval = self.tick_interval;

        tokio::spawn(async move {
            let exit = match attempt {
                ScriptedAttempt::ExitAfter {
                    console,
                    delay,
                    exit,
                } => {
                    append_log(&spec, &console);
                    tokio::time::sleep(delay).await;
                    let _ = events.send(JobEvent::Tick).await;
                    exit
                }
                ScriptedAttempt::HoldUntilCancelled { console, exit } => {
                    append_log(&spec, &console);
                    let mut cancel_rx = cancel_rx;
                    loop {
                        tokio::select! {
                            _ = &mut cancel_rx => break,
                            _ = tokio::time::sleep(tick_interval) => {
                                let _ = events.send(JobEvent::Tick).await;
                            }
                        }
                    }
                    exit
                }
            };
            let _ = exit_tx.send(exit);
        });

        Ok(SupervisorHandle::new(cancel_tx, exit_rx))
    }
}

fn append_log(spec: &ToolSpec, console: &str) {
    if console.is_empty() {
        return;
    }
    if let Some(parent) = spec.log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    use std::io::Write;
    if let Ok(mut f) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&spec.log_path)
    {
        let _ = f.write_all(console.as_bytes());
    }
}
