//! RESP frame types.
//!
//! The [`Frame`] enum represents a single parsed reply or request. Bulk
//! strings use `Bytes` so replies can be handed to callers without copying.

use bytes::Bytes;

/// A single RESP protocol frame.
///
/// Covers every reply shape a store node sends back to the router:
/// RESP2 strings, errors, integers, bulk data and arrays, plus the RESP3
/// null, map, double and boolean types.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Simple string reply, e.g. `+OK\r\n`.
    Simple(String),

    /// Error reply, e.g. `-ERR unknown command\r\n`.
    Error(String),

    /// 64-bit signed integer, e.g. `:42\r\n`.
    Integer(i64),

    /// Bulk (binary-safe) string, e.g. `$5\r\nhello\r\n`.
    Bulk(Bytes),

    /// Ordered array of frames, e.g. `*2\r\n+hello\r\n+world\r\n`.
    Array(Vec<Frame>),

    /// Null value. Parsed from RESP3 `_\r\n` as well as the RESP2
    /// `$-1\r\n` and `*-1\r\n` forms.
    Null,

    /// Ordered map of key-value frame pairs, e.g. `%1\r\n+key\r\n+val\r\n`.
    Map(Vec<(Frame, Frame)>),

    /// RESP3 double, e.g. `,1.5\r\n`.
    Double(f64),

    /// RESP3 boolean, e.g. `#t\r\n`.
    Boolean(bool),
}

impl Frame {
    /// Builds a request frame: an array of bulk strings.
    ///
    /// This is the standard client → server wire format.
    pub fn command<I, T>(args: I) -> Frame
    where
        I: IntoIterator<Item = T>,
        T: Into<Bytes>,
    {
        Frame::Array(args.into_iter().map(|a| Frame::Bulk(a.into())).collect())
    }

    /// Returns `true` if this frame is a null value.
    pub fn is_null(&self) -> bool {
        matches!(self, Frame::Null)
    }

    /// Returns `true` if this frame is an error reply.
    pub fn is_error(&self) -> bool {
        matches!(self, Frame::Error(_))
    }

    /// Returns `true` for the `+OK` status reply.
    pub fn is_ok(&self) -> bool {
        matches!(self, Frame::Simple(s) if s == "OK")
    }

    /// Returns the error message if this is an error reply.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Frame::Error(msg) => Some(msg),
            _ => None,
        }
    }

    /// Returns the integer value of an integer reply.
    ///
    /// Bulk strings holding a decimal integer are accepted too, since some
    /// nodes answer numeric queries with bulk replies.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Frame::Integer(n) => Some(*n),
            Frame::Boolean(b) => Some(i64::from(*b)),
            Frame::Bulk(data) => std::str::from_utf8(data).ok()?.parse().ok(),
            _ => None,
        }
    }

    /// Returns the payload of a simple or bulk string as UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Frame::Simple(s) => Some(s),
            Frame::Bulk(data) => std::str::from_utf8(data).ok(),
            _ => None,
        }
    }

    /// Returns the raw payload of a bulk or simple string.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Frame::Bulk(data) => Some(data),
            Frame::Simple(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// Consumes an array of bulk strings and returns the payloads.
    ///
    /// Null becomes an empty list. Returns `None` if the frame is not an
    /// array or if any element is not a string.
    pub fn into_bulk_list(self) -> Option<Vec<Bytes>> {
        match self {
            Frame::Null => Some(Vec::new()),
            Frame::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Frame::Bulk(data) => Some(data),
                    Frame::Simple(s) => Some(Bytes::from(s)),
                    _ => None,
                })
                .collect(),
            _ => None,
        }
    }
}

impl From<&str> for Frame {
    fn from(s: &str) -> Self {
        Frame::Bulk(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<i64> for Frame {
    fn from(n: i64) -> Self {
        Frame::Integer(n)
    }
}
