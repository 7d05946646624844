//! Connection Handler Module
//!
//! This module handles individual connections to relaykv: client sockets
//! accepted by the server, and a replica's link to its primary once the
//! handshake is done. Both run the same loop, reading commands and handing
//! them to the [`CommandHandler`].
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Socket accepted (or replica handshake finished)
//!        │
//!        ▼
//! 2. Split: read half -> ConnectionHandler, write half -> writer task
//!        │
//!        ▼
//! 3. ┌──────────────────────────────┐      ┌───────────────────────┐
//!    │      Read loop               │      │  Writer task          │
//!    │  read bytes                  │      │  drains the Outbound  │
//!    │  parse frames                │─────>│  queue onto the socket│
//!    │  execute commands            │ reply│                       │
//!    └──────────────────────────────┘      └───────────────────────┘
//!        │                                          ▲
//!        ▼                                          │ propagated writes
//! 4. Peer disconnects / protocol error      (other connections, when this
//!        │                                   peer is a registered replica)
//!        ▼
//! 5. Read loop ends, writer flushes what is queued and stops
//! ```
//!
//! ## Buffer Management
//!
//! We use a BytesMut buffer to accumulate incoming data. TCP is a stream
//! protocol - we might receive partial commands, or multiple commands in a
//! single read.

use crate::commands::CommandHandler;
use crate::connection::session::{Outbound, Session};
use crate::protocol::{Frame, ParseError, RespParser, MAX_FRAME_SIZE};
use bytes::{Bytes, BytesMut};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, trace, warn};

/// Maximum size of a partially received frame.
///
/// Equal to the parser's frame limit: a frame the parser would accept
/// always fits, and header lines that never end hit this instead.
const MAX_BUFFER_SIZE: usize = MAX_FRAME_SIZE;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total commands processed
    pub commands_processed: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// The read side of one connection.
///
/// Owns the read half of the socket, the read buffer, and the session the
/// command handler replies through.
pub struct ConnectionHandler {
    /// Read half of the socket
    reader: OwnedReadHalf,

    /// Peer address (for logging)
    addr: SocketAddr,

    /// Buffer for incoming data
    buffer: BytesMut,

    /// The command handler (shared across connections)
    command_handler: CommandHandler,

    /// RESP parser
    parser: RespParser,

    /// Where replies go
    session: Session,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,
}

impl ConnectionHandler {
    /// Creates a new connection handler.
    ///
    /// # Arguments
    ///
    /// * `reader` - The read half of the connection
    /// * `session` - Peer address, origin and reply queue
    /// * `command_handler` - The command handler for executing commands
    /// * `stats` - Shared connection statistics
    pub fn new(
        reader: OwnedReadHalf,
        session: Session,
        command_handler: CommandHandler,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.connection_opened();

        Self {
            reader,
            addr: session.peer(),
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            command_handler,
            parser: RespParser::new(),
            session,
            stats,
        }
    }

    /// Starts from bytes already read off the socket.
    ///
    /// The replica link uses this to hand over whatever arrived after the
    /// last handshake reply.
    pub fn with_buffer(mut self, buffer: BytesMut) -> Self {
        self.buffer = buffer;
        self
    }

    /// Runs the read loop until the peer disconnects or breaks the protocol.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(peer = %self.addr, origin = ?self.session.origin(), "Connection opened");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(peer = %self.addr, "Connection closed gracefully"),
            Err(e) => match e {
                ConnectionError::ClientDisconnected => {
                    debug!(peer = %self.addr, "Peer disconnected")
                }
                ConnectionError::IoError(io_err)
                    if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
                {
                    debug!(peer = %self.addr, "Connection reset by peer")
                }
                _ => warn!(peer = %self.addr, error = %e, "Connection error"),
            },
        }

        self.stats.connection_closed();
        result
    }

    /// The main read-parse-execute loop.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            while let Some(frame) = self.try_parse_frame()? {
                match frame {
                    Frame::Command(args) => {
                        self.command_handler.execute(args, &self.session);
                        self.stats.command_processed();
                    }
                    Frame::Skipped => {
                        trace!(peer = %self.addr, "Skipped reply-only frame");
                    }
                }
            }

            self.read_more_data().await?;
        }
    }

    /// Attempts to parse one frame from the buffer.
    fn try_parse_frame(&mut self) -> Result<Option<Frame>, ConnectionError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        match self.parser.parse(&self.buffer) {
            Ok(Some((frame, consumed))) => {
                let _ = self.buffer.split_to(consumed);
                trace!(
                    peer = %self.addr,
                    consumed = consumed,
                    remaining = self.buffer.len(),
                    "Parsed frame"
                );
                Ok(Some(frame))
            }
            Ok(None) => {
                trace!(
                    peer = %self.addr,
                    buffered = self.buffer.len(),
                    "Incomplete frame, need more data"
                );
                Ok(None)
            }
            Err(e) => {
                warn!(peer = %self.addr, error = %e, "Protocol error, closing connection");
                Err(ConnectionError::ParseError(e))
            }
        }
    }

    /// Reads more data from the socket into the buffer.
    async fn read_more_data(&mut self) -> Result<(), ConnectionError> {
        if self.buffer.len() >= MAX_BUFFER_SIZE {
            error!(
                peer = %self.addr,
                size = self.buffer.len(),
                "Buffer size limit exceeded"
            );
            return Err(ConnectionError::BufferFull);
        }

        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(INITIAL_BUFFER_SIZE);
        }

        let n = self.reader.read_buf(&mut self.buffer).await?;

        if n == 0 {
            if self.buffer.is_empty() {
                return Err(ConnectionError::ClientDisconnected);
            } else {
                // Partial frame in buffer
                return Err(ConnectionError::UnexpectedEof);
            }
        }

        self.stats.bytes_read(n);
        trace!(peer = %self.addr, bytes = n, "Read data");

        Ok(())
    }
}

/// Errors that can occur while handling a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// The peer sent a malformed frame
    #[error("Parse error: {0}")]
    ParseError(#[from] ParseError),

    /// Peer disconnected normally
    #[error("Client disconnected")]
    ClientDisconnected,

    /// Unexpected end of stream (partial frame)
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    /// Buffer size limit exceeded
    #[error("Buffer size limit exceeded")]
    BufferFull,
}

/// Keeps a connection's writer task alive while the read side runs.
///
/// Dropping it tells the writer to flush whatever is queued and stop.
#[derive(Debug)]
pub(crate) struct WriterGuard(#[allow(dead_code)] oneshot::Sender<()>);

/// Spawns the writer task for `writer` and returns its queue.
pub(crate) fn spawn_writer(
    writer: OwnedWriteHalf,
    addr: SocketAddr,
    stats: Arc<ConnectionStats>,
) -> (Outbound, WriterGuard) {
    let (outbound, rx) = Outbound::channel();
    let (done_tx, done_rx) = oneshot::channel();

    tokio::spawn(write_loop(writer, rx, done_rx, addr, stats));

    (outbound, WriterGuard(done_tx))
}

/// Drains the outbound queue onto the socket.
///
/// Stops when the socket fails, or when the read side is done and the
/// queue is empty. Once this returns every [`Outbound`] for the connection
/// reports closed, which is how a replica handle learns its peer is gone.
async fn write_loop(
    writer: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<Bytes>,
    mut reader_done: oneshot::Receiver<()>,
    addr: SocketAddr,
    stats: Arc<ConnectionStats>,
) {
    let mut writer = BufWriter::new(writer);

    loop {
        tokio::select! {
            biased;
            chunk = rx.recv() => {
                let Some(chunk) = chunk else { break };
                if let Err(e) = write_chunk(&mut writer, &chunk, rx.is_empty()).await {
                    debug!(peer = %addr, error = %e, "Write failed, stopping writer");
                    return;
                }
                stats.bytes_written(chunk.len());
                trace!(peer = %addr, bytes = chunk.len(), "Sent data");
            }
            _ = &mut reader_done => {
                rx.close();
                while let Some(chunk) = rx.recv().await {
                    if write_chunk(&mut writer, &chunk, rx.is_empty()).await.is_err() {
                        return;
                    }
                    stats.bytes_written(chunk.len());
                }
                break;
            }
        }
    }

    let _ = writer.shutdown().await;
}

async fn write_chunk(
    writer: &mut BufWriter<OwnedWriteHalf>,
    chunk: &[u8],
    flush: bool,
) -> std::io::Result<()> {
    writer.write_all(chunk).await?;
    if flush {
        writer.flush().await?;
    }
    Ok(())
}

/// Serves one accepted client connection to completion.
///
/// # Arguments
///
/// * `stream` - The TCP stream for this connection
/// * `addr` - The client's socket address
/// * `command_handler` - The command handler for executing commands
/// * `stats` - Shared connection statistics
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    command_handler: CommandHandler,
    stats: Arc<ConnectionStats>,
) {
    let (reader, writer) = stream.into_split();
    let (outbound, _writer) = spawn_writer(writer, addr, Arc::clone(&stats));

    let session = Session::client(addr, outbound);
    let handler = ConnectionHandler::new(reader, session, command_handler, stats);
    if let Err(e) = handler.run().await {
        match e {
            ConnectionError::ClientDisconnected => {}
            ConnectionError::IoError(ref io_err)
                if io_err.kind() == std::io::ErrorKind::ConnectionReset => {}
            _ => {
                debug!(client = %addr, error = %e, "Connection ended with error");
            }
        }
    }
}
