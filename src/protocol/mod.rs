//! RESP Protocol Implementation
//!
//! This module provides the wire codec for relaykv.
//!
//! ## Overview
//!
//! Requests (from clients, and from a primary to its replicas) are arrays of
//! bulk strings. Replies are simple strings, bulk strings, the null bulk
//! string, arrays, and the length-prefixed snapshot blob sent during a full
//! resynchronization.
//!
//! ## Modules
//!
//! - `types`: Defines the `RespValue` enum and serialization
//! - `parser`: Length-driven parser for incoming requests
//!
//! ## Example
//!
//! ```
//! use relaykv::protocol::{decode, RespValue};
//! use bytes::Bytes;
//!
//! // Encoding a command for a peer
//! let wire = RespValue::command(["SET", "name", "demo"]).serialize();
//!
//! // Decoding it back into arguments
//! let commands = decode(&wire).unwrap();
//! assert_eq!(commands[0][2], Bytes::from("demo"));
//! ```

pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use parser::{decode, Frame, ParseError, ParseResult, RespParser, MAX_FRAME_SIZE};
pub use types::RespValue;
