//! # relaykv - An In-Memory Key-Value Store with Replication
//!
//! relaykv speaks the RESP protocol, stores byte-string keys and values in
//! memory with optional millisecond expiry, and streams every write from a
//! primary to any number of replicas.
//!
//! ## Features
//!
//! - **RESP**: Length-driven decoding, binary-safe keys and values
//! - **Sharded storage**: 64 independently locked shards, lazy TTL expiry
//! - **Replication**: PING / REPLCONF / PSYNC handshake, full resync with an
//!   empty snapshot, then ordered write propagation
//! - **Async I/O**: One Tokio task per connection plus a writer task per socket
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              relaykv                                    │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │                  │
//! │  │ (Listener)  │    │  Handler    │    │  Handler    │                  │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘                  │
//! │                                               │                         │
//! │                          ┌────────────────────┴─────────────┐           │
//! │                          ▼                                  ▼           │
//! │  ┌─────────────┐   ┌──────────────────────────┐   ┌──────────────────┐  │
//! │  │   RESP      │   │      StorageEngine       │   │ ReplicationState │  │
//! │  │   Parser    │   │  Shard 0 .. Shard 63     │   │  replica handles │  │
//! │  └─────────────┘   └──────────────────────────┘   └────────┬─────────┘  │
//! │                                                            │            │
//! │  ┌─────────────────────────┐                               ▼            │
//! │  │ Replica link (replica   │               writer tasks of replica      │
//! │  │ role only): handshake,  │               connections                  │
//! │  │ then upstream commands  │                                            │
//! │  └─────────────────────────┘                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use relaykv::{InstanceConfig, Server};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let server = Server::bind(InstanceConfig::primary(6379)).await?;
//!     server.run_until_ctrl_c().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: RESP parser and value types
//! - [`storage`]: Thread-safe storage engine with TTL support
//! - [`commands`]: Command dispatch
//! - [`connection`]: Per-connection read loop, writer task and sessions
//! - [`replication`]: Handshake, replica registry and write propagation
//! - [`config`]: Boot-time instance configuration
//! - [`server`]: Listener and accept loop
//!
//! ## Design Highlights
//!
//! ### Ordered Propagation
//!
//! A client SET on a primary is applied to the store and queued to every
//! replica while the replica registry lock is held. Replicas therefore see
//! writes in exactly the order the primary applied them.
//!
//! ### Lazy Expiry
//!
//! An expired key is removed the first time a GET finds it expired. There
//! is no background sweep.

pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod replication;
pub mod server;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::CommandHandler;
pub use config::{InstanceConfig, PrimaryAddress, Role};
pub use connection::{handle_connection, ConnectionStats, Session};
pub use protocol::{ParseError, RespParser, RespValue};
pub use replication::ReplicationState;
pub use server::Server;
pub use storage::StorageEngine;

/// The default port relaykv listens on (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// The host relaykv binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of relaykv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
