//! Process orchestration: startup, reload, shutdown, signal handling.

use crate::config::Configuration;
use crate::driver;
use crate::runner::{self, DriverHandle};
use crate::sender::{run_sender, BusConnector, SenderExit};
use anyhow::{bail, Context, Result};
use relaymon_common::types::Event;
use relaymon_modules::registry;
use std::path::Path;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

pub const EVENT_QUEUE_CAPACITY: usize = 10_000;

/// Command-line arguments, already parsed.
#[derive(Debug, Clone)]
pub struct CmdlineArgs {
    pub config_file: String,
    pub verbose: bool,
    /// Pid-file override; the sentinel `<none>` means "unset".
    pub pid_file: String,
}

/// One started generation of the agent: the sender plus one runner per
/// driver, torn down as a unit on shutdown or reload.
struct Instance {
    configuration: Configuration,
    drivers: Vec<DriverHandle>,
    sender_done: oneshot::Sender<()>,
    sender_task: JoinHandle<SenderExit>,
}

/// Runs the agent until a terminating signal arrives or a fatal error
/// occurs. `SIGHUP` tears the instance down and starts a fresh one from the
/// current configuration and descriptor files.
pub async fn run(args: CmdlineArgs) -> Result<()> {
    let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);

    let mut sigint = signal(SignalKind::interrupt()).context("can't install signal handler")?;
    let mut sigterm = signal(SignalKind::terminate()).context("can't install signal handler")?;
    let mut sighup = signal(SignalKind::hangup()).context("can't install signal handler")?;

    enum Wakeup {
        Shutdown(&'static str),
        Reload,
        SenderExit(std::result::Result<SenderExit, tokio::task::JoinError>),
    }

    let mut logging_ready = false;
    let mut queue_rx = events_rx;

    loop {
        let mut instance = start(&args, &events_tx, queue_rx, &mut logging_ready).await?;

        tracing::info!(pid = std::process::id(), "Instance started");
        write_pid_file(&instance.configuration.pid_file);

        let wakeup = tokio::select! {
            _ = sigint.recv() => Wakeup::Shutdown("SIGINT"),
            _ = sigterm.recv() => Wakeup::Shutdown("SIGTERM"),
            _ = sighup.recv() => Wakeup::Reload,
            exit = &mut instance.sender_task => Wakeup::SenderExit(exit),
        };

        match wakeup {
            Wakeup::Shutdown(signal_name) => {
                tracing::info!(signal = signal_name, "Exiting");
                let pid_file = instance.configuration.pid_file.clone();
                let result = stop_instance(instance).await;
                remove_pid_file(&pid_file);
                result?;
                return Ok(());
            }
            Wakeup::Reload => {
                tracing::info!("Reloading");
                queue_rx = stop_instance(instance).await?;
            }
            Wakeup::SenderExit(exit) => {
                // the sender never stops on its own unless the reconnect
                // budget is exhausted
                remove_pid_file(&instance.configuration.pid_file);
                for driver_handle in instance.drivers {
                    driver_handle.stop().await;
                }
                match exit {
                    Ok(SenderExit::Fatal) => bail!("can't connect to event bus"),
                    Ok(SenderExit::Stopped(_)) => bail!("sender stopped unexpectedly"),
                    Err(e) => bail!("sender task failed: {e}"),
                }
            }
        }
    }
}

/// Loads configuration, launches the sender, then the drivers.
async fn start(
    args: &CmdlineArgs,
    events_tx: &mpsc::Sender<Event>,
    queue_rx: mpsc::Receiver<Event>,
    logging_ready: &mut bool,
) -> Result<Instance> {
    let mut configuration = Configuration::load(Path::new(&args.config_file))
        .with_context(|| format!("can't read configuration file {}", args.config_file))?;

    if args.pid_file != "<none>" {
        configuration.pid_file = args.pid_file.clone();
    }
    if args.verbose {
        configuration.log_file = "-".into();
        configuration.log_level = "debug".into();
    }

    if !*logging_ready {
        init_logging(&configuration);
        *logging_ready = true;
    }

    let (sender_done, done_rx) = oneshot::channel();
    let connector = Arc::new(BusConnector::new(
        configuration.protocol(),
        configuration.riemann_host.clone(),
    ));
    let sender_task = tokio::spawn(run_sender(
        connector,
        queue_rx,
        events_tx.clone(),
        done_rx,
    ));

    let modules = registry::scan_modules(configuration.modules_directory_path().as_deref());
    tracing::info!(count = modules.len(), "Modules loaded");

    let drivers = driver::load_drivers(&modules, Path::new(&configuration.drivers_directory));
    tracing::info!(count = drivers.len(), "Drivers loaded");

    let drivers = runner::start_drivers(drivers, events_tx.clone());

    Ok(Instance {
        configuration,
        drivers,
        sender_done,
        sender_task,
    })
}

/// Stops the sender, then every driver. Returns the queue receiver so the
/// next start can reuse it; a sender that already exhausted its reconnect
/// budget turns the teardown into a fatal error.
async fn stop_instance(instance: Instance) -> Result<mpsc::Receiver<Event>> {
    let _ = instance.sender_done.send(());
    let exit = instance.sender_task.await.context("sender task failed")?;

    for driver_handle in instance.drivers {
        driver_handle.stop().await;
    }

    match exit {
        SenderExit::Stopped(queue_rx) => Ok(queue_rx),
        SenderExit::Fatal => bail!("can't connect to event bus"),
    }
}

/// Installs the global tracing subscriber; called once per process. A log
/// file that cannot be opened falls back to stdout.
fn init_logging(configuration: &Configuration) {
    if configuration.log_file.is_empty() {
        return;
    }

    let writer = if configuration.log_file == "-" {
        BoxMakeWriter::new(std::io::stdout)
    } else {
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&configuration.log_file)
        {
            Ok(file) => BoxMakeWriter::new(Arc::new(file)),
            Err(e) => {
                eprintln!("can't open log file {}: {e}", configuration.log_file);
                BoxMakeWriter::new(std::io::stdout)
            }
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(level_filter(&configuration.log_level))
        .with_writer(writer)
        .init();
}

/// Maps a configured level name to a filter; unknown names fall back to
/// `info`.
fn level_filter(level: &str) -> EnvFilter {
    let directive = match level.to_ascii_lowercase().as_str() {
        "critical" | "error" => "error",
        "warning" | "warn" => "warn",
        "debug" => "debug",
        "trace" => "trace",
        _ => "info",
    };
    EnvFilter::new(directive)
}

pub(crate) fn write_pid_file(path: &str) {
    if path.is_empty() {
        return;
    }
    if let Err(e) = std::fs::write(path, std::process::id().to_string()) {
        tracing::error!(path, error = %e, "Can't create pid file");
    }
}

pub(crate) fn remove_pid_file(path: &str) {
    if path.is_empty() {
        return;
    }
    if let Err(e) = std::fs::remove_file(path) {
        tracing::debug!(path, error = %e, "Can't remove pid file");
    }
}
