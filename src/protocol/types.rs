//! RESP Frame Types and Encoding
//!
//! This module defines the frames relaykv writes to the wire, both replies to
//! clients and commands sent to peers (the replica handshake and propagated
//! writes).
//!
//! ## Protocol Format
//!
//! Each frame starts with a type prefix byte:
//! - `+` Simple String
//! - `-` Error
//! - `$` Bulk String
//! - `*` Array
//!
//! All headers are decimal ASCII terminated with CRLF (`\r\n`).
//!
//! ## Examples
//!
//! Simple String: `+OK\r\n`
//! Bulk String: `$5\r\nhello\r\n`
//! Null Bulk String: `$-1\r\n`
//! Array: `*2\r\n$3\r\nGET\r\n$4\r\nname\r\n`
//! Snapshot: `$88\r\n<88 raw bytes>` (no trailing CRLF)

use bytes::Bytes;
use std::fmt;

/// The CRLF terminator used in RESP protocol
pub const CRLF: &[u8] = b"\r\n";

/// RESP protocol type prefixes
pub mod prefix {
    pub const SIMPLE_STRING: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// An outbound RESP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// Format: `+<string>\r\n`
    SimpleString(String),

    /// Format: `-<error message>\r\n`
    Error(String),

    /// Binary-safe string.
    /// Format: `$<length>\r\n<data>\r\n`
    BulkString(Bytes),

    /// The null bulk string, `$-1\r\n`. Means "no value".
    Null,

    /// Format: `*<count>\r\n<element1><element2>...`
    Array(Vec<RespValue>),

    /// A length-prefixed binary blob with no trailing terminator.
    /// Format: `$<length>\r\n<data>`
    Snapshot(Bytes),
}

impl RespValue {
    /// Creates a new simple string reply.
    ///
    /// # Example
    /// ```
    /// use relaykv::protocol::types::RespValue;
    /// assert_eq!(RespValue::simple_string("OK").serialize(), b"+OK\r\n");
    /// ```
    pub fn simple_string(s: impl Into<String>) -> Self {
        RespValue::SimpleString(s.into())
    }

    /// Creates a new error reply.
    pub fn error(s: impl Into<String>) -> Self {
        RespValue::Error(s.into())
    }

    /// Creates a bulk string reply.
    ///
    /// An empty payload becomes the null bulk string: relaykv does not
    /// distinguish an empty value from an absent one in replies.
    ///
    /// # Example
    /// ```
    /// use relaykv::protocol::types::RespValue;
    /// use bytes::Bytes;
    /// assert_eq!(RespValue::bulk_string(Bytes::from("hi")).serialize(), b"$2\r\nhi\r\n");
    /// assert_eq!(RespValue::bulk_string(Bytes::new()), RespValue::Null);
    /// ```
    pub fn bulk_string(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        if data.is_empty() {
            RespValue::Null
        } else {
            RespValue::BulkString(data)
        }
    }

    /// Creates a null bulk reply.
    pub fn null() -> Self {
        RespValue::Null
    }

    /// Creates an array of bulk strings.
    ///
    /// Used both for array replies and for commands sent to a peer. Unlike
    /// [`RespValue::bulk_string`], empty elements stay empty (`$0\r\n\r\n`),
    /// so a decoded command always matches what was encoded.
    pub fn command<I, B>(args: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        RespValue::Array(
            args.into_iter()
                .map(|arg| RespValue::BulkString(arg.into()))
                .collect(),
        )
    }

    /// Creates a snapshot frame carrying `data` verbatim.
    pub fn snapshot(data: impl Into<Bytes>) -> Self {
        RespValue::Snapshot(data.into())
    }

    /// Common response for successful operations
    pub fn ok() -> Self {
        RespValue::SimpleString("OK".to_string())
    }

    /// Common response for PONG
    pub fn pong() -> Self {
        RespValue::SimpleString("PONG".to_string())
    }

    /// Serializes the frame to its wire format.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.serialize_into(&mut buf);
        buf
    }

    /// Serializes the frame into an existing buffer.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        match self {
            RespValue::SimpleString(s) => {
                buf.push(prefix::SIMPLE_STRING);
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            RespValue::Error(s) => {
                buf.push(prefix::ERROR);
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            RespValue::BulkString(data) => {
                write_length_header(buf, data.len());
                buf.extend_from_slice(data);
                buf.extend_from_slice(CRLF);
            }
            RespValue::Null => {
                buf.push(prefix::BULK_STRING);
                buf.extend_from_slice(b"-1");
                buf.extend_from_slice(CRLF);
            }
            RespValue::Array(values) => {
                buf.push(prefix::ARRAY);
                buf.extend_from_slice(values.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                for value in values {
                    value.serialize_into(buf);
                }
            }
            RespValue::Snapshot(data) => {
                write_length_header(buf, data.len());
                buf.extend_from_slice(data);
            }
        }
    }

    /// Returns true if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, RespValue::Null)
    }
}

fn write_length_header(buf: &mut Vec<u8>, len: usize) {
    buf.push(prefix::BULK_STRING);
    buf.extend_from_slice(len.to_string().as_bytes());
    buf.extend_from_slice(CRLF);
}

impl fmt::Display for RespValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RespValue::SimpleString(s) => write!(f, "\"{}\"", s),
            RespValue::Error(s) => write!(f, "(error) {}", s),
            RespValue::BulkString(data) => {
                if let Ok(s) = std::str::from_utf8(data) {
                    write!(f, "\"{}\"", s)
                } else {
                    write!(f, "(binary data, {} bytes)", data.len())
                }
            }
            RespValue::Null => write!(f, "(nil)"),
            RespValue::Array(values) => {
                if values.is_empty() {
                    write!(f, "(empty array)")
                } else {
                    writeln!(f)?;
                    for (i, v) in values.iter().enumerate() {
                        writeln!(f, "{}) {}", i + 1, v)?;
                    }
                    Ok(())
                }
            }
            RespValue::Snapshot(data) => write!(f, "(snapshot, {} bytes)", data.len()),
        }
    }
}
