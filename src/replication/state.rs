//! Primary-Side Replication State
//!
//! A primary keeps one [`ReplicaHandle`] per replica that completed PSYNC.
//! Every client SET is forwarded to each live handle, in the same order the
//! primary applied the writes.
//!
//! ## Locking
//!
//! One mutex guards the registry. A write is applied to the store and then
//! forwarded while that mutex is held, so:
//! - two SETs from different clients reach every replica in application order;
//! - a PSYNC either completes before a write (the new replica then receives
//!   the write after its snapshot) or after it (and never sees it).

use crate::config::{InstanceConfig, Role};
use crate::connection::Outbound;
use crate::protocol::RespValue;
use crate::replication::snapshot::snapshot_frame;
use bytes::Bytes;
use parking_lot::Mutex;
use std::net::SocketAddr;
use tracing::{debug, info, warn};

/// A replica registered on this primary.
#[derive(Debug)]
pub struct ReplicaHandle {
    /// Replica's address on the replication connection
    peer: SocketAddr,
    /// Writer queue of the replication connection
    outbound: Outbound,
    /// Bytes forwarded to this replica since its PSYNC
    offset: u64,
    /// Cleared when a forward fails; the next write prunes the handle
    active: bool,
}

impl ReplicaHandle {
    fn new(peer: SocketAddr, outbound: Outbound) -> Self {
        Self {
            peer,
            outbound,
            offset: 0,
            active: true,
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Queues one encoded write, advancing the offset or going inactive.
    fn forward(&mut self, frame: &Bytes) {
        match self.outbound.send_raw(frame.clone()) {
            Ok(n) => self.offset += n as u64,
            Err(e) => {
                warn!(replica = %self.peer, error = %e, "Replica unreachable, dropping from propagation");
                self.active = false;
            }
        }
    }
}

/// Replication state shared by every connection of one instance.
#[derive(Debug)]
pub struct ReplicationState {
    config: InstanceConfig,
    replicas: Mutex<Vec<ReplicaHandle>>,
}

impl ReplicationState {
    pub fn new(config: InstanceConfig) -> Self {
        Self {
            config,
            replicas: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &InstanceConfig {
        &self.config
    }

    pub fn role(&self) -> Role {
        self.config.role()
    }

    pub fn is_primary(&self) -> bool {
        self.role() == Role::Primary
    }

    /// Body of the `INFO replication` reply.
    pub fn info(&self) -> String {
        format!(
            "role:{}\nmaster_replid:{}\nmaster_repl_offset:{}",
            self.config.role(),
            self.config.replication_id(),
            self.config.replication_offset()
        )
    }

    /// The two frames that start a full resynchronization: the FULLRESYNC
    /// line and the snapshot.
    pub fn full_resync(&self) -> [RespValue; 2] {
        [
            RespValue::simple_string(format!(
                "FULLRESYNC {} 0",
                self.config.replication_id()
            )),
            snapshot_frame(),
        ]
    }

    /// Serves PSYNC for the connection behind `outbound` and registers it
    /// as a replica.
    ///
    /// The FULLRESYNC line and the snapshot are queued before the handle is
    /// visible to propagation, so the replica never sees a write ahead of its
    /// snapshot.
    pub fn register_replica(&self, peer: SocketAddr, outbound: &Outbound) {
        let mut replicas = self.replicas.lock();

        for frame in self.full_resync() {
            if outbound.send(&frame).is_err() {
                debug!(replica = %peer, "Replica left during full resync");
                return;
            }
        }

        replicas.push(ReplicaHandle::new(peer, outbound.clone()));
        info!(replica = %peer, replicas = replicas.len(), "Replica registered");
    }

    /// Applies a client write and forwards `command` to every live replica.
    ///
    /// `apply` runs under the registry lock; see the module docs.
    pub fn propagate_write<F, R>(&self, command: &[Bytes], apply: F) -> R
    where
        F: FnOnce() -> R,
    {
        let mut replicas = self.replicas.lock();
        let applied = apply();

        replicas.retain(|replica| {
            if !replica.active {
                debug!(replica = %replica.peer, "Pruned inactive replica");
            }
            replica.active
        });
        if replicas.is_empty() {
            return applied;
        }

        let frame = Bytes::from(RespValue::command(command.iter().cloned()).serialize());
        for replica in replicas.iter_mut() {
            replica.forward(&frame);
        }

        applied
    }

    /// Number of registered replicas, including ones not yet pruned.
    pub fn replica_count(&self) -> usize {
        self.replicas.lock().len()
    }

    /// Per-replica forwarded byte counts, in registration order.
    pub fn replica_offsets(&self) -> Vec<u64> {
        self.replicas.lock().iter().map(ReplicaHandle::offset).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::decode;

    fn peer(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn set_command(key: &str, value: &str) -> Vec<Bytes> {
        vec![Bytes::from("SET"), Bytes::from(key.to_string()), Bytes::from(value.to_string())]
    }

    fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<Bytes>) -> Vec<u8> {
        let mut out = Vec::new();
        while let Ok(chunk) = rx.try_recv() {
            out.extend_from_slice(&chunk);
        }
        out
    }

    #[test]
    fn test_info_for_primary() {
        let state = ReplicationState::new(InstanceConfig::primary(6379));
        let info = state.info();

        assert!(info.starts_with("role:primary\n"));
        assert!(info.contains(&format!("master_replid:{}", state.config().replication_id())));
        assert!(info.ends_with("master_repl_offset:0"));
    }

    #[test]
    fn test_register_sends_resync_then_snapshot() {
        let state = ReplicationState::new(InstanceConfig::primary(6379));
        let (outbound, mut rx) = Outbound::channel();

        state.register_replica(peer(7001), &outbound);

        let resync = rx.try_recv().unwrap();
        let expected = format!("+FULLRESYNC {} 0\r\n", state.config().replication_id());
        assert_eq!(resync, Bytes::from(expected));

        let snapshot = rx.try_recv().unwrap();
        assert!(snapshot.starts_with(b"$88\r\nREDIS"));

        assert_eq!(state.replica_count(), 1);
        assert_eq!(state.replica_offsets(), vec![0]);
    }

    #[test]
    fn test_propagate_forwards_and_counts_bytes() {
        let state = ReplicationState::new(InstanceConfig::primary(6379));
        let (first, mut first_rx) = Outbound::channel();
        let (second, mut second_rx) = Outbound::channel();
        state.register_replica(peer(7001), &first);
        state.register_replica(peer(7002), &second);
        drain(&mut first_rx);
        drain(&mut second_rx);

        let command = set_command("foo", "bar");
        let applied = state.propagate_write(&command, || 42);
        assert_eq!(applied, 42);

        let wire = RespValue::command(command.clone()).serialize();
        assert_eq!(drain(&mut first_rx), wire);
        assert_eq!(drain(&mut second_rx), wire);
        assert_eq!(state.replica_offsets(), vec![wire.len() as u64; 2]);
    }

    #[test]
    fn test_propagation_preserves_order() {
        let state = ReplicationState::new(InstanceConfig::primary(6379));
        let (outbound, mut rx) = Outbound::channel();
        state.register_replica(peer(7001), &outbound);
        drain(&mut rx);

        for i in 0..10 {
            state.propagate_write(&set_command("k", &i.to_string()), || ());
        }

        let commands = decode(&drain(&mut rx)).unwrap();
        let values: Vec<Bytes> = commands.into_iter().map(|c| c[2].clone()).collect();
        let expected: Vec<Bytes> = (0..10).map(|i| Bytes::from(i.to_string())).collect();
        assert_eq!(values, expected);
    }

    #[test]
    fn test_failed_replica_is_marked_then_pruned() {
        let state = ReplicationState::new(InstanceConfig::primary(6379));
        let (alive, mut alive_rx) = Outbound::channel();
        let (gone, gone_rx) = Outbound::channel();
        state.register_replica(peer(7001), &alive);
        state.register_replica(peer(7002), &gone);
        drain(&mut alive_rx);
        drop(gone_rx);

        // First write marks the dead replica inactive
        state.propagate_write(&set_command("a", "1"), || ());
        assert_eq!(state.replica_count(), 2);

        // Second write prunes it before forwarding
        state.propagate_write(&set_command("b", "2"), || ());
        assert_eq!(state.replica_count(), 1);

        let commands = decode(&drain(&mut alive_rx)).unwrap();
        assert_eq!(commands.len(), 2);
    }

    #[test]
    fn test_register_to_closed_connection_is_ignored() {
        let state = ReplicationState::new(InstanceConfig::primary(6379));
        let (outbound, rx) = Outbound::channel();
        drop(rx);

        state.register_replica(peer(7001), &outbound);
        assert_eq!(state.replica_count(), 0);
    }

    #[test]
    fn test_propagate_without_replicas_still_applies() {
        let state = ReplicationState::new(InstanceConfig::primary(6379));
        let mut applied = false;
        state.propagate_write(&set_command("k", "v"), || applied = true);
        assert!(applied);
    }
}
