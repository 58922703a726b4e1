//! Incremental RESP reply parser.
//!
//! Replies arrive from nodes in arbitrary chunks. The parser reads from
//! the front of the buffered bytes and reports `Ok(None)` until a whole
//! frame is present, so the connection can append the next socket read
//! and try again without having consumed anything.
//!
//! Nodes speak RESP2 unless asked otherwise: a missing value is `$-1\r\n`
//! and a missing multi-bulk is `*-1\r\n`. Both become [`Frame::Null`], as
//! does the RESP3 `_\r\n` form.

use bytes::Bytes;

use crate::error::ProtocolError;
use crate::types::Frame;

const MAX_DEPTH: usize = 64;
const MAX_ELEMENTS: usize = 1_048_576;
/// 512 MiB, the node's own limit for a single value.
const MAX_BULK_LEN: usize = 512 * 1024 * 1024;
/// Capacity reserved up front for a declared element count; longer
/// collections grow as their elements show up.
const PREALLOC_LIMIT: usize = 1024;

/// Parses one frame from the front of `buf`, slicing bulk payloads out of
/// it instead of copying them.
///
/// Returns the frame with the number of bytes it occupied, or `Ok(None)`
/// when `buf` holds only part of a frame.
pub fn parse_frame_bytes(buf: &Bytes) -> Result<Option<(Frame, usize)>, ProtocolError> {
    Reader::new(buf, Some(buf)).finish()
}

/// Like [`parse_frame_bytes`] for a plain slice. Bulk payloads are copied.
pub fn parse_frame(buf: &[u8]) -> Result<Option<(Frame, usize)>, ProtocolError> {
    Reader::new(buf, None).finish()
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
    /// Set when `buf` is backed by `Bytes` that bulk payloads can share.
    shared: Option<&'a Bytes>,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8], shared: Option<&'a Bytes>) -> Self {
        Self { buf, pos: 0, shared }
    }

    fn finish(mut self) -> Result<Option<(Frame, usize)>, ProtocolError> {
        if self.buf.is_empty() {
            return Ok(None);
        }
        match self.frame(0) {
            Ok(frame) => Ok(Some((frame, self.pos))),
            Err(ProtocolError::Incomplete) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn frame(&mut self, depth: usize) -> Result<Frame, ProtocolError> {
        let prefix = *self.buf.get(self.pos).ok_or(ProtocolError::Incomplete)?;
        self.pos += 1;

        match prefix {
            b'+' => Ok(Frame::Simple(self.text("simple string")?)),
            b'-' => Ok(Frame::Error(self.text("error string")?)),
            b':' => Ok(Frame::Integer(self.integer()?)),
            b'$' => match self.length()? {
                None => Ok(Frame::Null),
                Some(len) => self.bulk(len),
            },
            b'*' => {
                let depth = Self::nest(depth)?;
                let Some(count) = self.length()? else {
                    return Ok(Frame::Null);
                };
                let count = Self::element_count(count)?;
                let mut items = Vec::with_capacity(count.min(PREALLOC_LIMIT));
                for _ in 0..count {
                    items.push(self.frame(depth)?);
                }
                Ok(Frame::Array(items))
            }
            b'%' => {
                let depth = Self::nest(depth)?;
                let count = match self.length()? {
                    Some(n) => Self::element_count(n)?,
                    None => return Err(ProtocolError::InvalidFrameLength(-1)),
                };
                let mut pairs = Vec::with_capacity(count.min(PREALLOC_LIMIT));
                for _ in 0..count {
                    let key = self.frame(depth)?;
                    let value = self.frame(depth)?;
                    pairs.push((key, value));
                }
                Ok(Frame::Map(pairs))
            }
            b'_' => {
                self.line()?;
                Ok(Frame::Null)
            }
            // `inf`, `-inf` and `nan` are all accepted by f64's FromStr
            b',' => std::str::from_utf8(self.line()?)
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Frame::Double)
                .ok_or(ProtocolError::InvalidScalar("double")),
            b'#' => match self.line()? {
                b"t" => Ok(Frame::Boolean(true)),
                b"f" => Ok(Frame::Boolean(false)),
                _ => Err(ProtocolError::InvalidScalar("boolean")),
            },
            other => Err(ProtocolError::InvalidPrefix(other)),
        }
    }

    /// Bytes up to the next CRLF. Advances past the terminator.
    fn line(&mut self) -> Result<&'a [u8], ProtocolError> {
        let buf = self.buf;
        let start = self.pos;
        let mut from = start;
        while let Some(offset) = memchr::memchr(b'\r', &buf[from..]) {
            let cr = from + offset;
            match buf.get(cr + 1) {
                Some(b'\n') => {
                    self.pos = cr + 2;
                    return Ok(&buf[start..cr]);
                }
                Some(_) => from = cr + 1,
                None => break,
            }
        }
        Err(ProtocolError::Incomplete)
    }

    fn text(&mut self, what: &'static str) -> Result<String, ProtocolError> {
        let line = self.line()?;
        std::str::from_utf8(line)
            .map(str::to_owned)
            .map_err(|_| ProtocolError::InvalidUtf8(what))
    }

    fn integer(&mut self) -> Result<i64, ProtocolError> {
        decimal(self.line()?)
    }

    /// A length header. `-1` is the RESP2 null marker.
    fn length(&mut self) -> Result<Option<usize>, ProtocolError> {
        match self.integer()? {
            -1 => Ok(None),
            n if n < 0 => Err(ProtocolError::InvalidFrameLength(n)),
            n => usize::try_from(n)
                .map(Some)
                .map_err(|_| ProtocolError::InvalidFrameLength(n)),
        }
    }

    fn bulk(&mut self, len: usize) -> Result<Frame, ProtocolError> {
        if len > MAX_BULK_LEN {
            return Err(ProtocolError::BulkStringTooLarge(len));
        }
        let start = self.pos;
        let end = start + len;
        if self.buf.len() < end + 2 {
            return Err(ProtocolError::Incomplete);
        }
        if &self.buf[end..end + 2] != b"\r\n" {
            return Err(ProtocolError::InvalidFrameLength(len as i64));
        }
        self.pos = end + 2;
        let data = match self.shared {
            Some(bytes) => bytes.slice(start..end),
            None => Bytes::copy_from_slice(&self.buf[start..end]),
        };
        Ok(Frame::Bulk(data))
    }

    fn nest(depth: usize) -> Result<usize, ProtocolError> {
        if depth >= MAX_DEPTH {
            return Err(ProtocolError::NestingTooDeep(MAX_DEPTH));
        }
        Ok(depth + 1)
    }

    fn element_count(count: usize) -> Result<usize, ProtocolError> {
        if count > MAX_ELEMENTS {
            return Err(ProtocolError::TooManyElements(count));
        }
        Ok(count)
    }
}

/// Parses an optionally negative run of ASCII digits. Signs other than a
/// leading `-` and whitespace are rejected.
fn decimal(line: &[u8]) -> Result<i64, ProtocolError> {
    let digits = line.strip_prefix(b"-").unwrap_or(line);
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return Err(ProtocolError::InvalidInteger);
    }
    // all ASCII at this point, so the conversion can't fail
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(ProtocolError::InvalidInteger)
}
