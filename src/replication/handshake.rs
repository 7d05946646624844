//! Replica Handshake State Machine
//!
//! A replica joins its primary in four request/reply steps before the link
//! turns into a one-way stream of writes:
//!
//! ```text
//!   Init ──connected──> AwaitPingReply ──reply──> AwaitReplconf1Reply
//!     send PING            send REPLCONF              send REPLCONF
//!                          listening-port <port>      capa eof capa psync2
//!
//!   AwaitReplconf1Reply ──reply──> AwaitReplconf2Reply ──reply──> Streaming
//!                                    send PSYNC ? -1             (terminal)
//! ```
//!
//! The machine is pure: [`Handshake::advance`] takes an event and returns
//! the command to send, if any. The socket loop lives in
//! [`crate::replication::replica`]. Nothing here times out; a primary that
//! never answers leaves the replica in the current state.

use crate::protocol::RespValue;

/// Where the replica is in its handshake with the primary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Init,
    AwaitPingReply,
    AwaitReplconf1Reply,
    AwaitReplconf2Reply,
    Streaming,
}

/// Inputs that drive the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeEvent {
    /// The outbound connection to the primary is established.
    Connected,
    /// The primary answered the last request.
    Reply,
}

/// The replica side of the handshake.
#[derive(Debug, Clone)]
pub struct Handshake {
    state: HandshakeState,
    /// Port this replica serves clients on, announced to the primary
    listening_port: u16,
}

impl Handshake {
    pub fn new(listening_port: u16) -> Self {
        Self {
            state: HandshakeState::Init,
            listening_port,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// True once PSYNC has been sent and the link only carries writes.
    pub fn is_streaming(&self) -> bool {
        self.state == HandshakeState::Streaming
    }

    /// Applies `event` and returns the command to send to the primary.
    ///
    /// Events that make no sense in the current state leave it unchanged
    /// and return `None`.
    pub fn advance(&mut self, event: HandshakeEvent) -> Option<RespValue> {
        use HandshakeEvent::{Connected, Reply};
        use HandshakeState::*;

        let (next, command) = match (self.state, event) {
            (Init, Connected) => (AwaitPingReply, RespValue::command(["PING"])),
            (AwaitPingReply, Reply) => (
                AwaitReplconf1Reply,
                RespValue::command([
                    "REPLCONF".to_string(),
                    "listening-port".to_string(),
                    self.listening_port.to_string(),
                ]),
            ),
            (AwaitReplconf1Reply, Reply) => (
                AwaitReplconf2Reply,
                RespValue::command(["REPLCONF", "capa", "eof", "capa", "psync2"]),
            ),
            (AwaitReplconf2Reply, Reply) => (Streaming, RespValue::command(["PSYNC", "?", "-1"])),
            _ => return None,
        };

        self.state = next;
        Some(command)
    }
}
