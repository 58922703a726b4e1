//! shardis-protocol: RESP wire format for talking to store nodes.
//!
//! Provides an incremental reply parser and direct-to-buffer
//! serialization for the requests the router sends.
//!
//! # quick start
//!
//! ```
//! use bytes::BytesMut;
//! use shardis_protocol::{Frame, parse_frame};
//!
//! // encode a request
//! let mut buf = BytesMut::new();
//! Frame::serialize_command(&["GET", "user:1"], &mut buf);
//! assert_eq!(&buf[..], b"*2\r\n$3\r\nGET\r\n$6\r\nuser:1\r\n");
//!
//! // decode a RESP2 null reply
//! let (frame, consumed) = parse_frame(b"$-1\r\n").unwrap().unwrap();
//! assert_eq!(frame, Frame::Null);
//! assert_eq!(consumed, 5);
//! ```

pub mod error;
pub mod parse;
mod serialize;
pub mod types;

pub use error::ProtocolError;
pub use parse::{parse_frame, parse_frame_bytes};
pub use types::Frame;
