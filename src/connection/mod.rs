//! Connection Handler Module
//!
//! This module manages the sockets relaykv serves. Each connection is split
//! into a read task that parses and executes commands, and a writer task
//! that owns the write half and drains an [`Outbound`] queue.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TCP Listener                            │
//! │                    (server.rs)                              │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │
//!                        │ accept()
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ConnectionHandler                           │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │  │ Read bytes  │───>│ Parse RESP  │───>│ Execute cmd │      │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘      │
//! │                                               │ Session     │
//! │                                               ▼             │
//! │                                   ┌──────────────────────┐  │
//! │   propagated writes ─────────────>│ Outbound -> writer   │  │
//! │   (when the peer is a replica)    └──────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Async I/O**: Uses Tokio for non-blocking network operations
//! - **Buffer Management**: Efficient BytesMut buffer for incoming data
//! - **Pipelining**: Supports multiple commands in a single TCP packet
//! - **Statistics**: Tracks connection and command metrics
//!
//! ## Example
//!
//! ```ignore
//! use relaykv::connection::{handle_connection, ConnectionStats};
//! use relaykv::commands::CommandHandler;
//!
//! let stats = Arc::new(ConnectionStats::new());
//! let handler = CommandHandler::new(storage, replication);
//!
//! // For each accepted connection...
//! let (stream, addr) = listener.accept().await?;
//! tokio::spawn(handle_connection(stream, addr, handler, stats));
//! ```

pub mod handler;
pub mod session;

// Re-export commonly used types
pub(crate) use handler::spawn_writer;
pub use handler::{handle_connection, ConnectionError, ConnectionHandler, ConnectionStats};
pub use session::{Origin, Outbound, Session, WriterClosed};
