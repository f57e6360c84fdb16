//! Reconnecting event forwarder.
//!
//! The sender is the sole consumer of the event queue. It holds at most one
//! live connection to the remote bus; a failed send puts the event back at
//! the tail of the queue and triggers a reconnect with exponential backoff.

use anyhow::{Context, Result};
use async_trait::async_trait;
use relaymon_common::types::Event;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::{mpsc, oneshot};

use crate::config::Protocol;

/// Opens connections to the remote event bus.
#[async_trait]
pub trait RemoteConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn RemoteConnection>>;
}

/// A live connection to the remote event bus.
#[async_trait]
pub trait RemoteConnection: Send {
    async fn send(&mut self, event: &Event) -> Result<()>;
}

/// Default bus transport: each event as a single-line JSON object, shipped
/// over a persistent tcp stream or one udp datagram per event.
pub struct BusConnector {
    protocol: Protocol,
    addr: String,
}

impl BusConnector {
    pub fn new(protocol: Protocol, addr: impl Into<String>) -> Self {
        Self {
            protocol,
            addr: addr.into(),
        }
    }
}

#[async_trait]
impl RemoteConnector for BusConnector {
    async fn connect(&self) -> Result<Box<dyn RemoteConnection>> {
        match self.protocol {
            Protocol::Tcp => {
                let stream = TcpStream::connect(&self.addr)
                    .await
                    .with_context(|| format!("can't connect to {}", self.addr))?;
                Ok(Box::new(TcpConnection { stream }))
            }
            Protocol::Udp => {
                let socket = UdpSocket::bind("0.0.0.0:0")
                    .await
                    .context("can't bind udp socket")?;
                socket
                    .connect(&self.addr)
                    .await
                    .with_context(|| format!("can't connect to {}", self.addr))?;
                Ok(Box::new(UdpConnection { socket }))
            }
        }
    }
}

struct TcpConnection {
    stream: TcpStream,
}

#[async_trait]
impl RemoteConnection for TcpConnection {
    async fn send(&mut self, event: &Event) -> Result<()> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');
        self.stream.write_all(&line).await?;
        Ok(())
    }
}

struct UdpConnection {
    socket: UdpSocket,
}

#[async_trait]
impl RemoteConnection for UdpConnection {
    async fn send(&mut self, event: &Event) -> Result<()> {
        let payload = serde_json::to_vec(event)?;
        self.socket.send(&payload).await?;
        Ok(())
    }
}

/// Why the sender task stopped.
#[derive(Debug)]
pub enum SenderExit {
    /// Stop requested or queue closed; the receiver is handed back so a
    /// reload can reuse the queue without losing buffered events.
    Stopped(mpsc::Receiver<Event>),
    /// The reconnect budget is exhausted; the process must abort.
    Fatal,
}

const MAX_CONNECT_ATTEMPTS: u32 = 11;

enum Connect {
    Connected(Box<dyn RemoteConnection>),
    Cancelled,
    Exhausted,
}

async fn connect_with_backoff(
    connector: &dyn RemoteConnector,
    done: &mut oneshot::Receiver<()>,
) -> Connect {
    for attempt in 0..MAX_CONNECT_ATTEMPTS {
        match connector.connect().await {
            Ok(conn) => {
                tracing::info!("Connected to event bus");
                return Connect::Connected(conn);
            }
            Err(e) => {
                let wait = Duration::from_secs(1u64 << attempt);
                tracing::error!(
                    error = %e,
                    wait_secs = wait.as_secs(),
                    "Can't connect to event bus"
                );
                tokio::select! {
                    _ = &mut *done => return Connect::Cancelled,
                    _ = tokio::time::sleep(wait) => {}
                }
            }
        }
    }
    Connect::Exhausted
}

/// Runs the sender loop until stopped or the reconnect budget runs out.
///
/// `requeue` is a producer handle onto the same queue; it receives the
/// event in hand when a send fails.
pub async fn run_sender(
    connector: Arc<dyn RemoteConnector>,
    mut queue: mpsc::Receiver<Event>,
    requeue: mpsc::Sender<Event>,
    mut done: oneshot::Receiver<()>,
) -> SenderExit {
    let mut conn = match connect_with_backoff(connector.as_ref(), &mut done).await {
        Connect::Connected(conn) => conn,
        Connect::Cancelled => return SenderExit::Stopped(queue),
        Connect::Exhausted => return SenderExit::Fatal,
    };

    loop {
        tokio::select! {
            _ = &mut done => {
                tracing::debug!("Terminating sender");
                return SenderExit::Stopped(queue);
            }
            message = queue.recv() => {
                let Some(event) = message else {
                    return SenderExit::Stopped(queue);
                };
                if let Err(e) = conn.send(&event).await {
                    tracing::error!(error = %e, "Error during send");
                    // the event in hand goes back to the tail of the queue
                    let _ = requeue.send(event).await;
                    match connect_with_backoff(connector.as_ref(), &mut done).await {
                        Connect::Connected(new_conn) => conn = new_conn,
                        Connect::Cancelled => {
                            tracing::debug!("Terminating sender");
                            return SenderExit::Stopped(queue);
                        }
                        Connect::Exhausted => return SenderExit::Fatal,
                    }
                }
            }
        }
    }
}
