//! Replica Link
//!
//! Connects a replica to its primary, walks the handshake, then hands the
//! socket to an ordinary [`ConnectionHandler`] running an upstream session.
//! From then on every command the primary streams is applied locally and
//! nothing is written back.

use crate::commands::CommandHandler;
use crate::config::PrimaryAddress;
use crate::connection::{
    spawn_writer, ConnectionError, ConnectionHandler, ConnectionStats, Session,
};
use crate::protocol::parser::find_crlf;
use crate::replication::handshake::{Handshake, HandshakeEvent};
use anyhow::{bail, Context};
use bytes::{Bytes, BytesMut};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tracing::{debug, info};

/// Runs the replica side of replication until the primary goes away.
///
/// # Arguments
///
/// * `primary` - Where the primary listens
/// * `listening_port` - Port this replica serves clients on
/// * `command_handler` - Applies the streamed writes
/// * `stats` - Shared connection statistics
pub async fn run_replica_link(
    primary: PrimaryAddress,
    listening_port: u16,
    command_handler: CommandHandler,
    stats: Arc<ConnectionStats>,
) -> anyhow::Result<()> {
    let stream = TcpStream::connect((primary.host.as_str(), primary.port))
        .await
        .with_context(|| format!("failed to connect to primary {}", primary))?;
    let peer = stream
        .peer_addr()
        .context("failed to read primary address")?;
    info!(primary = %peer, "Connected to primary, starting handshake");

    let (mut reader, mut writer) = stream.into_split();
    let mut buffer = BytesMut::with_capacity(4096);
    let mut handshake = Handshake::new(listening_port);

    let mut next = handshake.advance(HandshakeEvent::Connected);
    while let Some(command) = next.take() {
        writer
            .write_all(&command.serialize())
            .await
            .context("failed to send handshake command")?;
        debug!(primary = %peer, sent = %command, state = ?handshake.state(), "Handshake step");

        if handshake.is_streaming() {
            break;
        }

        let reply = read_reply(&mut reader, &mut buffer).await?;
        debug!(
            primary = %peer,
            reply = %String::from_utf8_lossy(&reply).trim_end(),
            "Handshake reply"
        );
        next = handshake.advance(HandshakeEvent::Reply);
    }

    info!(primary = %peer, "Handshake complete, streaming from primary");

    let (outbound, _writer) = spawn_writer(writer, peer, Arc::clone(&stats));
    let session = Session::upstream(peer, outbound);
    let result = ConnectionHandler::new(reader, session, command_handler, stats)
        .with_buffer(buffer)
        .run()
        .await;

    match result {
        Ok(()) | Err(ConnectionError::ClientDisconnected) => {
            info!(primary = %peer, "Primary closed the replication link");
            Ok(())
        }
        Err(e) => Err(e).context("replication link to primary failed"),
    }
}

/// Reads one CRLF-terminated reply line off the handshake socket.
///
/// Bytes after the line stay in `buffer`.
async fn read_reply(reader: &mut OwnedReadHalf, buffer: &mut BytesMut) -> anyhow::Result<Bytes> {
    loop {
        if let Some(end) = find_crlf(&buffer[..]) {
            return Ok(buffer.split_to(end + 2).freeze());
        }

        let n = reader
            .read_buf(buffer)
            .await
            .context("failed to read handshake reply")?;
        if n == 0 {
            bail!("primary closed the connection during the handshake");
        }
    }
}
