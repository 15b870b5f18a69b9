//! TCP transport adapter
//!
//! Turns a TCP byte stream into connect / data / error / disconnect events for
//! the session actor and accepts fire-and-forget line writes. Each transport
//! instance tags its events with the session epoch it was opened for, so the
//! actor can drop events from a connection it already tore down.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::error::{Result, SessionError};

/// Give up on a TCP connect after this long
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

const READ_BUFFER_SIZE: usize = 4096;

/// Lifecycle and data events reported by a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected,
    /// Decoded text chunk, not aligned to lines
    Data(String),
    Error(String),
    /// Peer closed the connection
    Disconnected,
}

/// Event tagged with the epoch of the transport that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedEvent {
    pub epoch: u64,
    pub event: TransportEvent,
}

/// Sending side handed to a transport for reporting events
#[derive(Debug, Clone)]
pub struct EventSink {
    epoch: u64,
    tx: mpsc::UnboundedSender<TaggedEvent>,
}

impl EventSink {
    pub fn new(epoch: u64, tx: mpsc::UnboundedSender<TaggedEvent>) -> Self {
        Self { epoch, tx }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Report an event, returns false once the session is gone
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx
            .send(TaggedEvent {
                epoch: self.epoch,
                event,
            })
            .is_ok()
    }
}

/// An open (or opening) connection to the DSP
pub trait Transport: Send {
    /// Queue a line for writing, never waits for the network
    fn send(&self, line: &str) -> Result<()>;

    /// Close the connection; no events are emitted afterwards
    fn close(&mut self);
}

/// Opens transports for the session
pub trait Connector: Send + Sync {
    fn open(&self, host: &str, port: u16, events: EventSink) -> Box<dyn Transport>;
}

/// Plain TCP connector
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    fn open(&self, host: &str, port: u16, events: EventSink) -> Box<dyn Transport> {
        let (line_tx, line_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_connection(host.to_string(), port, events, line_rx));
        Box::new(TcpTransport {
            line_tx: Some(line_tx),
            task,
        })
    }
}

/// Handle to a spawned TCP connection task
pub struct TcpTransport {
    line_tx: Option<mpsc::UnboundedSender<String>>,
    task: JoinHandle<()>,
}

impl Transport for TcpTransport {
    fn send(&self, line: &str) -> Result<()> {
        let tx = self
            .line_tx
            .as_ref()
            .ok_or_else(|| SessionError::Transport("transport closed".to_string()))?;
        tx.send(line.to_string())
            .map_err(|_| SessionError::Transport("connection task ended".to_string()))
    }

    fn close(&mut self) {
        self.line_tx = None;
        self.task.abort();
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_connection(
    host: String,
    port: u16,
    events: EventSink,
    mut line_rx: mpsc::UnboundedReceiver<String>,
) {
    debug!(%host, port, epoch = events.epoch(), "Opening TCP connection");

    let stream = match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect((host.as_str(), port))).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            events.emit(TransportEvent::Error(format!("connect to {}:{} failed: {}", host, port, e)));
            return;
        },
        Err(_) => {
            events.emit(TransportEvent::Error(format!("connect to {}:{} timed out", host, port)));
            return;
        },
    };

    if let Err(e) = stream.set_nodelay(true) {
        trace!("set_nodelay failed: {}", e);
    }

    if !events.emit(TransportEvent::Connected) {
        return;
    }

    let (mut reader, mut writer) = stream.into_split();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        tokio::select! {
            read = reader.read(&mut buf) => match read {
                Ok(0) => {
                    debug!("DSP closed the connection");
                    events.emit(TransportEvent::Disconnected);
                    break;
                },
                Ok(n) => {
                    let chunk = String::from_utf8_lossy(&buf[..n]).into_owned();
                    if !events.emit(TransportEvent::Data(chunk)) {
                        break;
                    }
                },
                Err(e) => {
                    events.emit(TransportEvent::Error(e.to_string()));
                    break;
                },
            },
            line = line_rx.recv() => match line {
                Some(line) => {
                    trace!(line = line.trim_end(), "TX");
                    if let Err(e) = writer.write_all(line.as_bytes()).await {
                        warn!("Write to DSP failed: {}", e);
                        events.emit(TransportEvent::Error(e.to_string()));
                        break;
                    }
                },
                None => break,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::TcpListener;

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<TaggedEvent>) -> TransportEvent {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("event within timeout")
            .expect("channel open")
            .event
    }

    #[tokio::test]
    async fn test_tcp_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut transport = TcpConnector.open("127.0.0.1", port, EventSink::new(7, tx));

        let (socket, _) = listener.accept().await.unwrap();
        let (read_half, mut write_half) = socket.into_split();

        assert_eq!(next_event(&mut rx).await, TransportEvent::Connected);

        transport.send("$e GPR\r\n").unwrap();
        let mut lines = BufReader::new(read_half).lines();
        let line = tokio::time::timeout(Duration::from_secs(2), lines.next_line())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(line.as_deref(), Some("$e GPR"));

        write_half.write_all(b"#1=2\r\n").await.unwrap();
        assert_eq!(next_event(&mut rx).await, TransportEvent::Data("#1=2\r\n".to_string()));

        drop(write_half);
        drop(lines);
        assert_eq!(next_event(&mut rx).await, TransportEvent::Disconnected);

        transport.close();
        assert!(transport.send("R!\r\n").is_err());
    }

    #[tokio::test]
    async fn test_refused_connection_reports_error() {
        // Grab a free port, then release it so nothing is listening
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _transport = TcpConnector.open("127.0.0.1", port, EventSink::new(1, tx));

        assert!(matches!(next_event(&mut rx).await, TransportEvent::Error(_)));
    }
}
