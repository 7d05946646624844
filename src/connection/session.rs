//! Reply Sinks
//!
//! Every socket relaykv serves has one writer task that owns the write half.
//! Anything that wants to send bytes on that socket (the connection's own
//! command handler, or a SET on some other connection propagating to this
//! replica) goes through an [`Outbound`] handle, which is a sender on the
//! writer task's unbounded queue.
//!
//! A [`Session`] is what the command handler sees of the connection it is
//! serving: who the peer is, where replies go, and whether replies should be
//! sent at all.

use crate::protocol::RespValue;
use bytes::Bytes;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// The writer task for a connection has stopped.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("connection writer closed")]
pub struct WriterClosed;

/// Handle for queueing bytes onto a connection's socket.
///
/// Cloning is cheap; all clones feed the same writer task. Sends never
/// block and are not acknowledged.
#[derive(Debug, Clone)]
pub struct Outbound {
    tx: mpsc::UnboundedSender<Bytes>,
}

impl Outbound {
    /// Creates a handle and the receiving end the writer task drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Bytes>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queues the wire encoding of `value`. Returns the number of bytes queued.
    pub fn send(&self, value: &RespValue) -> Result<usize, WriterClosed> {
        self.send_raw(Bytes::from(value.serialize()))
    }

    /// Queues already-encoded bytes. Returns the number of bytes queued.
    pub fn send_raw(&self, bytes: Bytes) -> Result<usize, WriterClosed> {
        let len = bytes.len();
        self.tx.send(bytes).map_err(|_| WriterClosed)?;
        Ok(len)
    }

    /// Returns true once the writer task has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Where the commands on a connection come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// An ordinary client.
    Client,
    /// This replica's link to its primary. Commands are applied silently.
    Primary,
}

/// The command handler's view of one connection.
#[derive(Debug, Clone)]
pub struct Session {
    peer: SocketAddr,
    origin: Origin,
    outbound: Outbound,
}

impl Session {
    /// A session for a client connection.
    pub fn client(peer: SocketAddr, outbound: Outbound) -> Self {
        Self {
            peer,
            origin: Origin::Client,
            outbound,
        }
    }

    /// A session for the replica's link to its primary.
    pub fn upstream(peer: SocketAddr, outbound: Outbound) -> Self {
        Self {
            peer,
            origin: Origin::Primary,
            outbound,
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    /// True for the replica's link to its primary.
    pub fn is_from_primary(&self) -> bool {
        self.origin == Origin::Primary
    }

    pub fn outbound(&self) -> &Outbound {
        &self.outbound
    }

    /// Sends a reply to the peer.
    ///
    /// Commands streamed from a primary are never answered, so on an
    /// upstream session this only traces the discarded reply.
    pub fn reply(&self, value: &RespValue) {
        if self.is_from_primary() {
            trace!(primary = %self.peer, reply = %value, "Reply suppressed on upstream link");
            return;
        }

        if self.outbound.send(value).is_err() {
            debug!(client = %self.peer, "Reply dropped, connection writer closed");
        }
    }
}
