//! Length-Driven RESP Request Parser
//!
//! Inbound traffic is always a sequence of arrays of bulk strings. The parser
//! reads each bulk string by its declared length and advances a cursor by
//! exactly that many bytes, so payloads may contain `\r\n` or any other
//! byte.
//!
//! ## How the Parser Works
//!
//! [`RespParser::parse`] looks at the front of a buffer and returns:
//! - `Ok(Some((frame, consumed)))` - a complete frame, `consumed` bytes used
//! - `Ok(None)` - the frame is incomplete, wait for more data
//! - `Err(ParseError)` - the peer violated the protocol
//!
//! A frame is either a command (the elements of one array) or a skipped
//! reply-only frame. Two reply-only frames are tolerated at the top level
//! because a replica's link to its primary carries them before the first
//! propagated write:
//! - `+FULLRESYNC <replid> <offset>\r\n`
//! - `$<len>\r\n<len raw bytes>` (the snapshot, no trailing CRLF)
//!
//! [`decode`] is the one-shot form over a complete chunk.

use crate::protocol::types::{prefix, CRLF};
use bytes::Bytes;
use thiserror::Error;

/// Errors that can occur while parsing inbound frames.
///
/// Every variant is a protocol violation; the connection that produced it is
/// closed.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// A top-level frame did not start with `*`
    #[error("expected array, got prefix {0:#04x}")]
    ExpectedArray(u8),

    /// An array element did not start with `$`
    #[error("expected bulk string, got prefix {0:#04x}")]
    ExpectedBulkString(u8),

    /// A length header was not a valid decimal count
    #[error("invalid length header: {0:?}")]
    InvalidLength(String),

    /// The payload did not end where its declared length said it would
    #[error("bulk string length mismatch: declared {declared} bytes")]
    LengthMismatch { declared: usize },

    /// The message exceeds maximum allowed size
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// A one-shot decode ended in the middle of a frame
    #[error("incomplete frame: {0} trailing bytes")]
    Incomplete(usize),
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size of one inbound frame, headers included (8 MB).
///
/// Connections buffer at most this much of a partial frame, and a forwarded
/// write is never larger than the client frame it came from, so anything a
/// primary accepts also fits on its replicas.
pub const MAX_FRAME_SIZE: usize = 8 * 1024 * 1024;

/// Prefix of the simple-string reply that starts a full resynchronization.
const RESYNC_MARKER: &[u8] = b"FULLRESYNC";

/// One complete inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// The ordered arguments of one command, name first.
    Command(Vec<Bytes>),
    /// A reply-only frame that carries no command.
    Skipped,
}

/// An incremental, length-driven RESP request parser.
///
/// # Example
///
/// ```
/// use relaykv::protocol::{Frame, RespParser};
/// use bytes::Bytes;
///
/// let parser = RespParser::new();
/// let (frame, consumed) = parser
///     .parse(b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n")
///     .unwrap()
///     .unwrap();
///
/// assert_eq!(consumed, 23);
/// assert_eq!(frame, Frame::Command(vec![Bytes::from("GET"), Bytes::from("name")]));
/// ```
#[derive(Debug, Clone)]
pub struct RespParser {
    /// Largest frame accepted before it is rejected
    max_frame_size: usize,
}

impl Default for RespParser {
    fn default() -> Self {
        Self::new()
    }
}

impl RespParser {
    /// Creates a parser with the default frame size limit.
    pub fn new() -> Self {
        Self {
            max_frame_size: MAX_FRAME_SIZE,
        }
    }

    /// Creates a parser that rejects frames larger than `max_frame_size`.
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    /// Attempts to parse one frame from the front of `buf`.
    pub fn parse(&self, buf: &[u8]) -> ParseResult<Option<(Frame, usize)>> {
        let Some(&first) = buf.first() else {
            return Ok(None);
        };

        match first {
            prefix::ARRAY => self.parse_array(buf),
            prefix::BULK_STRING => self.skip_snapshot(buf),
            prefix::SIMPLE_STRING => skip_resync_line(buf),
            other => Err(ParseError::ExpectedArray(other)),
        }
    }

    /// Parses `*<count>\r\n` followed by `count` bulk strings.
    fn parse_array(&self, buf: &[u8]) -> ParseResult<Option<(Frame, usize)>> {
        let Some(header_end) = find_crlf(&buf[1..]) else {
            return Ok(None);
        };
        let count = parse_length(&buf[1..1 + header_end])?;
        let mut cursor = 1 + header_end + 2;

        let mut args = Vec::with_capacity(count.min(64));
        for _ in 0..count {
            match self.parse_bulk(&buf[cursor..], cursor)? {
                Some((arg, used)) => {
                    args.push(arg);
                    cursor += used;
                }
                None => return Ok(None),
            }
        }

        Ok(Some((Frame::Command(args), cursor)))
    }

    /// Parses one `$<len>\r\n<data>\r\n` element starting `offset` bytes
    /// into its frame.
    ///
    /// The size check runs on the declared length, before the payload
    /// arrives.
    fn parse_bulk(&self, buf: &[u8], offset: usize) -> ParseResult<Option<(Bytes, usize)>> {
        let Some(&first) = buf.first() else {
            return Ok(None);
        };
        if first != prefix::BULK_STRING {
            return Err(ParseError::ExpectedBulkString(first));
        }

        let Some(header_end) = find_crlf(&buf[1..]) else {
            return Ok(None);
        };
        let declared = parse_length(&buf[1..1 + header_end])?;
        let data_start = 1 + header_end + 2;
        let frame_size = offset
            .saturating_add(data_start)
            .saturating_add(declared)
            .saturating_add(2);
        if frame_size > self.max_frame_size {
            return Err(ParseError::MessageTooLarge {
                size: frame_size,
                max: self.max_frame_size,
            });
        }

        let data_end = data_start + declared;
        if buf.len() < data_end + 2 {
            return Ok(None);
        }
        if &buf[data_end..data_end + 2] != CRLF {
            return Err(ParseError::LengthMismatch { declared });
        }

        let data = Bytes::copy_from_slice(&buf[data_start..data_end]);
        Ok(Some((data, data_end + 2)))
    }

    /// Consumes a bare `$<len>\r\n` header and exactly `len` raw bytes.
    fn skip_snapshot(&self, buf: &[u8]) -> ParseResult<Option<(Frame, usize)>> {
        let Some(header_end) = find_crlf(&buf[1..]) else {
            return Ok(None);
        };
        let header = &buf[1..1 + header_end];
        let data_start = 1 + header_end + 2;

        // A stray null bulk has no payload.
        if header == b"-1" {
            return Ok(Some((Frame::Skipped, data_start)));
        }

        let len = parse_length(header)?;
        if data_start.saturating_add(len) > self.max_frame_size {
            return Err(ParseError::MessageTooLarge {
                size: data_start.saturating_add(len),
                max: self.max_frame_size,
            });
        }
        if buf.len() < data_start + len {
            return Ok(None);
        }

        Ok(Some((Frame::Skipped, data_start + len)))
    }
}

/// Consumes a `+FULLRESYNC ...\r\n` line. Any other simple string is an error.
fn skip_resync_line(buf: &[u8]) -> ParseResult<Option<(Frame, usize)>> {
    let line = &buf[1..];
    let comparable = line.len().min(RESYNC_MARKER.len());
    if line[..comparable] != RESYNC_MARKER[..comparable] {
        return Err(ParseError::ExpectedArray(prefix::SIMPLE_STRING));
    }

    match find_crlf(line) {
        Some(end) if end >= RESYNC_MARKER.len() => Ok(Some((Frame::Skipped, 1 + end + 2))),
        Some(_) => Err(ParseError::ExpectedArray(prefix::SIMPLE_STRING)),
        None => Ok(None),
    }
}

/// Parses a non-negative decimal length header.
fn parse_length(header: &[u8]) -> ParseResult<usize> {
    std::str::from_utf8(header)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(|| ParseError::InvalidLength(String::from_utf8_lossy(header).into_owned()))
}

/// Finds the position of CRLF in the buffer.
///
/// Returns the position of `\r` if found, or None if CRLF is not present.
#[inline]
pub(crate) fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}

/// Decodes every frame in a complete chunk into command argument lists.
///
/// Reply-only frames contribute nothing, so a chunk holding only a
/// FULLRESYNC line and a snapshot decodes to an empty list. A chunk that ends
/// in the middle of a frame is an error.
///
/// # Example
///
/// ```
/// use relaykv::protocol::decode;
/// use bytes::Bytes;
///
/// let commands = decode(b"*1\r\n$4\r\nPING\r\n*2\r\n$4\r\nECHO\r\n$2\r\nhi\r\n").unwrap();
/// assert_eq!(commands, vec![
///     vec![Bytes::from("PING")],
///     vec![Bytes::from("ECHO"), Bytes::from("hi")],
/// ]);
/// ```
pub fn decode(buf: &[u8]) -> ParseResult<Vec<Vec<Bytes>>> {
    let parser = RespParser::new();
    let mut commands = Vec::new();
    let mut cursor = 0;

    while cursor < buf.len() {
        match parser.parse(&buf[cursor..])? {
            Some((Frame::Command(args), used)) => {
                commands.push(args);
                cursor += used;
            }
            Some((Frame::Skipped, used)) => cursor += used,
            None => return Err(ParseError::Incomplete(buf.len() - cursor)),
        }
    }

    Ok(commands)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::RespValue;

    fn parse(input: &[u8]) -> ParseResult<Option<(Frame, usize)>> {
        RespParser::new().parse(input)
    }

    fn args(items: &[&str]) -> Vec<Bytes> {
        items.iter().map(|s| Bytes::from(s.to_string())).collect()
    }

    #[test]
    fn test_parse_array() {
        let input = b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n";
        let (frame, consumed) = parse(input).unwrap().unwrap();
        assert_eq!(frame, Frame::Command(args(&["GET", "name"])));
        assert_eq!(consumed, 23);
    }

    #[test]
    fn test_parse_set_with_px() {
        let input = b"*5\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n$2\r\npx\r\n$3\r\n100\r\n";
        let (frame, _) = parse(input).unwrap().unwrap();
        assert_eq!(frame, Frame::Command(args(&["SET", "foo", "bar", "px", "100"])));
    }

    #[test]
    fn test_parse_empty_array() {
        let (frame, consumed) = parse(b"*0\r\n").unwrap().unwrap();
        assert_eq!(frame, Frame::Command(vec![]));
        assert_eq!(consumed, 4);
    }

    #[test]
    fn test_parse_incomplete() {
        assert!(parse(b"*2\r\n$3\r\nGET\r\n$4\r\nna").unwrap().is_none());
        assert!(parse(b"*2\r\n$3\r\nGET\r\n").unwrap().is_none());
        assert!(parse(b"*2").unwrap().is_none());
        assert!(parse(b"").unwrap().is_none());
    }

    #[test]
    fn test_bulk_payload_may_contain_crlf() {
        let input = b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$6\r\na\r\nb\r\n\r\n";
        let (frame, consumed) = parse(input).unwrap().unwrap();
        assert_eq!(
            frame,
            Frame::Command(vec![
                Bytes::from("SET"),
                Bytes::from("k"),
                Bytes::from_static(b"a\r\nb\r\n"),
            ])
        );
        assert_eq!(consumed, input.len());
    }

    #[test]
    fn test_binary_safe_bulk_string() {
        let input = b"*1\r\n$5\r\nhel\x00o\r\n";
        let (frame, _) = parse(input).unwrap().unwrap();
        assert_eq!(frame, Frame::Command(vec![Bytes::from_static(b"hel\x00o")]));
    }

    #[test]
    fn test_top_level_must_be_array() {
        assert_eq!(parse(b":1\r\n"), Err(ParseError::ExpectedArray(b':')));
        assert_eq!(parse(b"PING\r\n"), Err(ParseError::ExpectedArray(b'P')));
        assert_eq!(
            parse(b"+OK\r\n"),
            Err(ParseError::ExpectedArray(prefix::SIMPLE_STRING))
        );
    }

    #[test]
    fn test_elements_must_be_bulk_strings() {
        assert_eq!(
            parse(b"*1\r\n:5\r\n"),
            Err(ParseError::ExpectedBulkString(b':'))
        );
    }

    #[test]
    fn test_length_mismatch() {
        // Declared 5 bytes, sent 3 followed by the next header
        let input = b"*2\r\n$5\r\nabc\r\n$1\r\nx\r\n";
        assert_eq!(
            parse(input),
            Err(ParseError::LengthMismatch { declared: 5 })
        );

        // Declared 2 bytes, sent 4
        let input = b"*1\r\n$2\r\nabcd\r\n";
        assert_eq!(
            parse(input),
            Err(ParseError::LengthMismatch { declared: 2 })
        );
    }

    #[test]
    fn test_invalid_length_header() {
        assert!(matches!(
            parse(b"*x\r\n"),
            Err(ParseError::InvalidLength(_))
        ));
        assert!(matches!(
            parse(b"*1\r\n$-3\r\n"),
            Err(ParseError::InvalidLength(_))
        ));
    }

    #[test]
    fn test_frame_size_limit() {
        // *1\r\n$5\r\nhello\r\n is 15 bytes
        let exact = RespParser::with_max_frame_size(15);
        let (frame, consumed) = exact.parse(b"*1\r\n$5\r\nhello\r\n").unwrap().unwrap();
        assert_eq!(frame, Frame::Command(args(&["hello"])));
        assert_eq!(consumed, 15);

        let tight = RespParser::with_max_frame_size(14);
        assert_eq!(
            tight.parse(b"*1\r\n$5\r\nhello\r\n"),
            Err(ParseError::MessageTooLarge { size: 15, max: 14 })
        );
    }

    #[test]
    fn test_oversized_frame_rejected_from_header() {
        // Only the header of the second element has arrived
        let parser = RespParser::with_max_frame_size(1024);
        assert_eq!(
            parser.parse(b"*2\r\n$3\r\nSET\r\n$2000\r\n"),
            Err(ParseError::MessageTooLarge { size: 2022, max: 1024 })
        );

        assert!(matches!(
            parser.parse(b"$4096\r\n"),
            Err(ParseError::MessageTooLarge { .. })
        ));
    }

    #[test]
    fn test_fullresync_line_is_skipped() {
        let input = b"+FULLRESYNC 8371b4fb1155b71f4a04d3e1bc3e18c4a990aeeb 0\r\n";
        let (frame, consumed) = parse(input).unwrap().unwrap();
        assert_eq!(frame, Frame::Skipped);
        assert_eq!(consumed, input.len());

        assert!(parse(b"+FULLRES").unwrap().is_none());
    }

    #[test]
    fn test_snapshot_is_skipped_by_length() {
        // Snapshot payload contains CRLF and is not terminated
        let input = b"$6\r\nRE\r\nDI*1\r\n$4\r\nPING\r\n";
        let (frame, consumed) = parse(input).unwrap().unwrap();
        assert_eq!(frame, Frame::Skipped);
        assert_eq!(consumed, 10);

        assert!(parse(b"$6\r\nRE").unwrap().is_none());
    }

    #[test]
    fn test_decode_multiple_commands() {
        let commands = decode(b"*1\r\n$4\r\nPING\r\n*2\r\n$3\r\nGET\r\n$1\r\nk\r\n").unwrap();
        assert_eq!(commands, vec![args(&["PING"]), args(&["GET", "k"])]);
    }

    #[test]
    fn test_decode_handoff_yields_no_commands() {
        let mut input = b"+FULLRESYNC abcdefabcdefabcdefabcdefabcdefabcdefabcd 0\r\n".to_vec();
        input.extend_from_slice(&RespValue::snapshot(Bytes::from_static(b"\x00\xffREDIS")).serialize());
        assert_eq!(decode(&input).unwrap(), Vec::<Vec<Bytes>>::new());
    }

    #[test]
    fn test_decode_handoff_then_commands() {
        let mut input = b"+FULLRESYNC abc 0\r\n".to_vec();
        input.extend_from_slice(&RespValue::snapshot(Bytes::from_static(b"REDIS0011")).serialize());
        input.extend_from_slice(&RespValue::command(["SET", "foo", "bar"]).serialize());
        assert_eq!(decode(&input).unwrap(), vec![args(&["SET", "foo", "bar"])]);
    }

    #[test]
    fn test_decode_truncated_chunk() {
        assert_eq!(
            decode(b"*1\r\n$4\r\nPI"),
            Err(ParseError::Incomplete(10))
        );
    }

    #[test]
    fn test_roundtrip_with_delimiter_bytes() {
        let original = vec![
            Bytes::from("SET"),
            Bytes::from_static(b"key\r\n"),
            Bytes::from_static(b"*2\r\n$3\r\nfoo"),
            Bytes::from_static(b"\r\n"),
            Bytes::new(),
        ];
        let encoded = RespValue::command(original.clone()).serialize();
        assert_eq!(decode(&encoded).unwrap(), vec![original]);
    }

    #[test]
    fn test_random_commands_roundtrip() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        const ALPHABET: &[u8] = b"\r\n$*\r\n-+:0123456789abc";
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let parser = RespParser::new();

        for _ in 0..500 {
            let pipeline: Vec<Vec<Bytes>> = (0..rng.gen_range(1..=4))
                .map(|_| {
                    (0..rng.gen_range(1..=6))
                        .map(|_| {
                            let len = rng.gen_range(0..24);
                            let arg: Vec<u8> = (0..len)
                                .map(|_| {
                                    if rng.gen_bool(0.7) {
                                        ALPHABET[rng.gen_range(0..ALPHABET.len())]
                                    } else {
                                        rng.gen()
                                    }
                                })
                                .collect();
                            Bytes::from(arg)
                        })
                        .collect()
                })
                .collect();

            let mut encoded = Vec::new();
            for command in &pipeline {
                RespValue::command(command.clone()).serialize_into(&mut encoded);
            }
            assert_eq!(decode(&encoded).unwrap(), pipeline);

            // A truncated first frame is never mistaken for a whole one
            let first_len = RespValue::command(pipeline[0].clone()).serialize().len();
            let cut = rng.gen_range(0..first_len);
            assert!(parser.parse(&encoded[..cut]).unwrap().is_none());
        }
    }

    #[test]
    fn test_incremental_byte_by_byte() {
        let encoded = RespValue::command(["ECHO", "a\r\nb"]).serialize();
        let parser = RespParser::new();
        for end in 0..encoded.len() {
            assert!(parser.parse(&encoded[..end]).unwrap().is_none());
        }
        let (frame, consumed) = parser.parse(&encoded).unwrap().unwrap();
        assert_eq!(frame, Frame::Command(args(&["ECHO", "a\r\nb"])));
        assert_eq!(consumed, encoded.len());
    }
}
