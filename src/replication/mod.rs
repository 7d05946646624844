//! Replication Module
//!
//! Primary/replica replication for relaykv.
//!
//! ```text
//!        replica                                   primary
//!   ┌──────────────┐  PING / REPLCONF x2 / PSYNC ┌──────────────┐
//!   │  Handshake   │────────────────────────────>│ CommandHandler│
//!   │  (replica.rs)│<────────────────────────────│ +PONG, +OK... │
//!   └──────┬───────┘  +FULLRESYNC, snapshot      └──────┬───────┘
//!          │                                           │ register
//!          ▼                                           ▼
//!   ┌──────────────┐        SET k v ...        ┌──────────────────┐
//!   │ upstream     │<──────────────────────────│ ReplicationState │
//!   │ Connection   │   (no replies sent back)  │ (state.rs)       │
//!   └──────────────┘                           └──────────────────┘
//! ```
//!
//! - [`handshake`]: the replica's handshake state machine
//! - [`replica`]: drives the handshake over a socket and streams writes
//! - [`state`]: the primary's replica registry and write propagation
//! - [`snapshot`]: the empty snapshot sent on full resync

pub mod handshake;
pub mod replica;
pub mod snapshot;
pub mod state;

pub use handshake::{Handshake, HandshakeEvent, HandshakeState};
pub use replica::run_replica_link;
pub use snapshot::{snapshot_frame, EMPTY_SNAPSHOT};
pub use state::{ReplicaHandle, ReplicationState};
