// src/supervise/process.rs

//! Child-process supervision: launch, tee output, tick, timeout, cancel.
//!
//! The child's stdout and stderr are streamed line-by-line into an
//! append-only run log through a single writer task; nothing buffers the
//! whole output in memory (fully buffering multi-hour runs has caused
//! production hangs in predecessors of this design).

use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::driver::JobEvent;
use crate::supervise::spec::ToolSpec;

/// Exit report for one supervised attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolExit {
    pub exit_code: i32,
    pub timed_out: bool,
}

impl ToolExit {
    pub fn clean(self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }
}

/// Run the tool to completion, emitting `JobEvent::Tick` on a fixed interval
/// while it runs. The tick is the only scheduling/suspension point exposed
/// to the driver and monitors.
///
/// `cancel_rx` firing force-terminates the child (the only cancellation
/// path; there is no cooperative protocol with the tool).
pub async fn run_tool(
    spec: ToolSpec,
    events: mpsc::Sender<JobEvent>,
    mut cancel_rx: oneshot::Receiver<()>,
) -> Result<ToolExit> {
    info!(cmd = %spec.command_line(), "launching external tool");

    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .current_dir(&spec.work_dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning tool {:?}", spec.program))?;

    // Single log sink: both stream readers feed one bounded channel so the
    // run log never sees interleaved partial lines.
    let (line_tx, line_rx) = mpsc::channel::<String>(256);
    let writer = spawn_log_writer(spec.log_path.clone(), line_rx);

    if let Some(stdout) = child.stdout.take() {
        spawn_stream_reader("stdout", stdout, line_tx.clone());
    }
    if let Some(stderr) = child.stderr.take() {
        spawn_stream_reader("stderr", stderr, line_tx.clone());
    }
    drop(line_tx);

    let mut tick = tokio::time::interval(spec.tick_interval);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first interval tick fires immediately; skip it so ticks start one
    // interval after launch.
    tick.tick().await;

    let deadline = spec.timeout.map(|t| tokio::time::Instant::now() + t);
    let mut timed_out = false;

    let exit_status = loop {
        let timeout_sleep = async {
            match deadline {
                Some(d) => tokio::time::sleep_until(d).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            status = child.wait() => {
                break status.context("waiting for tool process")?;
            }
            _ = tick.tick() => {
                let _ = events.send(JobEvent::Tick).await;
            }
            _ = &mut cancel_rx => {
                info!("cancellation requested; force-terminating tool");
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "failed to kill tool process");
                }
                break child.wait().await.context("waiting for killed tool")?;
            }
            _ = timeout_sleep => {
                warn!(timeout = ?spec.timeout, "tool exceeded its wall-clock limit; killing");
                timed_out = true;
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "failed to kill timed-out tool process");
                }
                break child.wait().await.context("waiting for timed-out tool")?;
            }
        }
    };

    // Readers finish when the child's pipes close; wait for the writer so
    // the run log is complete before the exit event is observed.
    let _ = writer.await;

    let exit = ToolExit {
        exit_code: exit_status.code().unwrap_or(-1),
        timed_out,
    };
    info!(
        exit_code = exit.exit_code,
        timed_out = exit.timed_out,
        "tool process exited"
    );

    Ok(exit)
}

fn spawn_stream_reader(
    stream: &'static str,
    source: impl tokio::io::AsyncRead + Unpin + Send + 'static,
    line_tx: mpsc::Sender<String>,
) {
    tokio::spawn(async move {
        let reader = BufReader::new(source);
        let mut lines = reader.lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(stream, "tool: {}", line);
            if line_tx.send(line).await.is_err() {
                break;
            }
        }
        debug!(stream, "tool stream closed");
    });
}

fn spawn_log_writer(
    log_path: std::path::PathBuf,
    mut line_rx: mpsc::Receiver<String>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .await;

        let mut file = match file {
            Ok(f) => f,
            Err(e) => {
                warn!(path = ?log_path, error = %e, "cannot open run log; tool output will not be persisted");
                // Drain the channel so readers don't block.
                while line_rx.recv().await.is_some() {}
                return;
            }
        };

        while let Some(mut line) = line_rx.recv().await {
            line.push('\n');
            if let Err(e) = file.write_all(line.as_bytes()).await {
                warn!(path = ?log_path, error = %e, "failed to append to run log");
            }
        }
        let _ = file.flush().await;
        debug!(path = ?log_path, "run log writer finished");
    })
}
