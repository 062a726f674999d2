//! Transport seam
//!
//! The engine only needs a way to fire a line at the device ([`LineSender`]) and
//! to be told about inbound lines and connection changes ([`TransportEvent`]).
//! [`TcpLineTransport`] is a plain TCP implementation; serial links and
//! reconnect policy belong to the caller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tesira_protocol::LineFramer;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::TransportError;

/// Terminator appended to every outbound command
pub const COMMAND_TERMINATOR: &str = "\n";

/// Send primitive: fire one line, expect nothing back
pub trait LineSender: Send + Sync {
    /// Send `line` followed by the command terminator
    fn send_line(&self, line: &str) -> Result<(), TransportError>;

    fn is_connected(&self) -> bool;
}

/// Connection state as reported by the transport or its liveness monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Connected,
    /// Still connected, but the liveness monitor reports trouble
    Degraded,
    Disconnected,
}

/// Events produced by a transport, consumed in order by the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected,
    Line(String),
    Disconnected,
}

/// Line transport over a TCP socket
pub struct TcpLineTransport {
    writer_tx: mpsc::UnboundedSender<String>,
    connected: Arc<AtomicBool>,
    reader_task: JoinHandle<()>,
    writer_task: JoinHandle<()>,
}

impl TcpLineTransport {
    /// Connect and start the reader and writer tasks
    ///
    /// The returned receiver yields `Connected` first, then every framed
    /// inbound line, and finally a single `Disconnected`.
    pub async fn connect(
        addr: impl ToSocketAddrs,
    ) -> Result<(Arc<Self>, mpsc::UnboundedReceiver<TransportEvent>), TransportError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr().ok();
        let (mut reader, mut writer) = stream.into_split();

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (writer_tx, mut writer_rx) = mpsc::unbounded_channel::<String>();
        let connected = Arc::new(AtomicBool::new(true));

        let _ = event_tx.send(TransportEvent::Connected);
        tracing::info!("Connected to {:?}", peer);

        let reader_task = {
            let event_tx = event_tx.clone();
            let connected = Arc::clone(&connected);
            tokio::spawn(async move {
                let mut framer = LineFramer::new();
                let mut buffer = [0u8; 4096];
                loop {
                    match reader.read(&mut buffer).await {
                        Ok(0) => {
                            tracing::info!("Device closed the connection");
                            break;
                        }
                        Ok(n) => {
                            for line in framer.push(&buffer[..n]) {
                                if event_tx.send(TransportEvent::Line(line)).is_err() {
                                    return;
                                }
                            }
                        }
                        Err(e) => {
                            tracing::warn!("Read failed: {}", e);
                            break;
                        }
                    }
                }
                mark_disconnected(&connected, &event_tx);
            })
        };

        let writer_task = {
            let connected = Arc::clone(&connected);
            tokio::spawn(async move {
                while let Some(line) = writer_rx.recv().await {
                    tracing::trace!("-> {}", line);
                    let framed = format!("{line}{COMMAND_TERMINATOR}");
                    if let Err(e) = writer.write_all(framed.as_bytes()).await {
                        tracing::warn!("Write failed: {}", e);
                        break;
                    }
                }
                mark_disconnected(&connected, &event_tx);
            })
        };

        Ok((
            Arc::new(Self {
                writer_tx,
                connected,
                reader_task,
                writer_task,
            }),
            event_rx,
        ))
    }

    /// Stop both tasks; the event receiver sees `Disconnected` if it hadn't yet
    pub fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.reader_task.abort();
        self.writer_task.abort();
    }
}

impl LineSender for TcpLineTransport {
    fn send_line(&self, line: &str) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.writer_tx
            .send(line.to_string())
            .map_err(|_| TransportError::ChannelClosed)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Drop for TcpLineTransport {
    fn drop(&mut self) {
        self.close();
    }
}

fn mark_disconnected(connected: &AtomicBool, event_tx: &mpsc::UnboundedSender<TransportEvent>) {
    if connected.swap(false, Ordering::SeqCst) {
        let _ = event_tx.send(TransportEvent::Disconnected);
    }
}
