//! Per-driver runner tasks.
//!
//! Every active driver gets exactly one task, started at (re)start and
//! stopped through a one-shot stop channel. A driver whose parameters fail
//! validation, or whose external child cannot be spawned or produces an
//! undecodable record, is disabled: its task parks until the stop signal so
//! shutdown accounting stays uniform.

use crate::driver::Driver;
use crate::params::build_params;
use anyhow::{Context, Result};
use relaymon_common::types::{Event, EventPatch};
use relaymon_modules::{ModuleCapability, ParamMap, Probe};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

const CHILD_EXIT_GRACE: Duration = Duration::from_secs(5);

/// Handle to a running driver task.
pub struct DriverHandle {
    pub id: String,
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl DriverHandle {
    /// Requests termination and waits for the task to finish.
    pub async fn stop(self) {
        let _ = self.stop.send(());
        let _ = self.task.await;
    }
}

/// Spawns one runner task per driver.
pub fn start_drivers(drivers: Vec<Driver>, queue: mpsc::Sender<Event>) -> Vec<DriverHandle> {
    drivers
        .into_iter()
        .map(|driver| start_driver(driver, queue.clone()))
        .collect()
}

pub fn start_driver(driver: Driver, queue: mpsc::Sender<Event>) -> DriverHandle {
    let (stop_tx, stop_rx) = oneshot::channel();
    let id = driver.id.clone();
    let task = tokio::spawn(run_driver(driver, stop_rx, queue));
    DriverHandle {
        id,
        stop: stop_tx,
        task,
    }
}

async fn run_driver(driver: Driver, stop: oneshot::Receiver<()>, queue: mpsc::Sender<Event>) {
    let params = match build_params(&driver.module.parameters, &driver.configuration) {
        Ok(params) => params,
        Err(e) => {
            tracing::error!(driver = %driver.id, error = %e, "Can't run driver - driver disabled");
            let _ = stop.await;
            return;
        }
    };

    match driver.module.capability.clone() {
        ModuleCapability::Builtin(probe) => run_builtin(driver, probe, params, stop, queue).await,
        ModuleCapability::Executable(path) => {
            run_executable(driver, path, params, stop, queue).await
        }
    }
}

fn driver_ticker(driver: &Driver) -> tokio::time::Interval {
    let period = Duration::from_secs(driver.interval);
    let mut tick = interval_at(Instant::now() + period, period);
    // a slow iteration delays subsequent ticks on this driver only
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tick
}

async fn run_builtin(
    driver: Driver,
    probe: Arc<dyn Probe>,
    params: ParamMap,
    mut stop: oneshot::Receiver<()>,
    queue: mpsc::Sender<Event>,
) {
    let mut tick = driver_ticker(&driver);

    loop {
        tokio::select! {
            _ = &mut stop => {
                tracing::debug!(driver = %driver.id, "Terminating driver");
                return;
            }
            _ = tick.tick() => {
                for mut event in probe.run(&params).await {
                    driver.enrich(&mut event);
                    tokio::select! {
                        sent = queue.send(event) => {
                            if sent.is_err() {
                                return;
                            }
                        }
                        _ = &mut stop => {
                            tracing::debug!(driver = %driver.id, "Terminating driver");
                            return;
                        }
                    }
                }
            }
        }
    }
}

async fn run_executable(
    driver: Driver,
    executable: PathBuf,
    params: ParamMap,
    mut stop: oneshot::Receiver<()>,
    queue: mpsc::Sender<Event>,
) {
    let mut child = match Command::new(&executable)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            tracing::error!(
                driver = %driver.id,
                module = %driver.module.name,
                error = %e,
                "Can't run driver - driver disabled"
            );
            let _ = stop.await;
            return;
        }
    };

    let (Some(mut stdin), Some(mut stdout)) = (child.stdin.take(), child.stdout.take()) else {
        tracing::error!(
            driver = %driver.id,
            module = %driver.module.name,
            "Can't run driver: no stdio pipes - driver disabled"
        );
        let _ = child.kill().await;
        let _ = stop.await;
        return;
    };

    // one `call` line is reused for every tick
    let mut call_line = b"call ".to_vec();
    match serde_json::to_vec(&params) {
        Ok(json) => call_line.extend_from_slice(&json),
        Err(e) => {
            tracing::error!(driver = %driver.id, error = %e, "Can't run driver - driver disabled");
            let _ = child.kill().await;
            let _ = stop.await;
            return;
        }
    }
    call_line.push(b'\n');

    let mut tick = driver_ticker(&driver);

    loop {
        tokio::select! {
            _ = &mut stop => {
                tracing::debug!(driver = %driver.id, "Terminating driver");
                shutdown_child(&mut stdin, &mut child).await;
                return;
            }
            _ = tick.tick() => {
                match run_call(&driver, &call_line, &mut stdin, &mut stdout, &queue).await {
                    Ok(true) => {}
                    // queue closed, the agent is shutting down
                    Ok(false) => {
                        shutdown_child(&mut stdin, &mut child).await;
                        return;
                    }
                    Err(e) => {
                        tracing::error!(
                            driver = %driver.id,
                            module = %driver.module.name,
                            error = %e,
                            "Can't run driver - driver disabled"
                        );
                        let _ = child.kill().await;
                        let _ = stop.await;
                        return;
                    }
                }
            }
        }
    }
}

/// Performs one call round: sends the parameter line, then decodes the
/// framed response (an i32-LE record count, then per record an i32-LE size
/// and `size` bytes of JSON event body). Returns `Ok(false)` when the event
/// queue has closed.
async fn run_call(
    driver: &Driver,
    call_line: &[u8],
    stdin: &mut ChildStdin,
    stdout: &mut ChildStdout,
    queue: &mpsc::Sender<Event>,
) -> Result<bool> {
    stdin.write_all(call_line).await.context("can't send call")?;
    stdin.flush().await.context("can't send call")?;

    let count = stdout
        .read_i32_le()
        .await
        .context("can't read record count")?;

    for _ in 0..count {
        let size = stdout
            .read_i32_le()
            .await
            .context("can't read record size")?;
        let size = usize::try_from(size).context("negative record size")?;
        let mut buf = vec![0u8; size];
        stdout
            .read_exact(&mut buf)
            .await
            .context("can't read record body")?;

        let patch: EventPatch = serde_json::from_slice(&buf).context("invalid record")?;
        let mut event = driver.seed_event();
        patch.apply(&mut event);
        driver.substitute_service(&mut event);

        if queue.send(event).await.is_err() {
            return Ok(false);
        }
    }

    Ok(true)
}

/// Orderly child teardown: send `exit`, give the child a grace period to
/// leave on its own, then kill. Either way the child is reaped.
async fn shutdown_child(stdin: &mut ChildStdin, child: &mut Child) {
    let _ = stdin.write_all(b"exit").await;
    let _ = stdin.flush().await;
    if tokio::time::timeout(CHILD_EXIT_GRACE, child.wait())
        .await
        .is_err()
    {
        let _ = child.kill().await;
    }
}
