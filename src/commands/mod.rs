//! Command Handler Module
//!
//! This module implements the command processing layer for relaykv.
//! It receives decoded commands, executes them against the storage engine
//! and the replication state, and replies through the connection's session.
//!
//! ## Architecture
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  RESP Parser    │  (protocol module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! └────────┬────────┘
//!          │
//!          ├──────────────────────┐
//!          ▼                      ▼
//! ┌─────────────────┐   ┌──────────────────┐
//! │ StorageEngine   │   │ ReplicationState │
//! └─────────────────┘   └──────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! - `PING`, `ECHO`, `SET`, `GET`, `INFO`
//! - `REPLCONF`, `PSYNC` (replication handshake)

pub mod handler;

// Re-export the main command handler
pub use handler::CommandHandler;
