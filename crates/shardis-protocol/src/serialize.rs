//! Encoding frames onto the wire.
//!
//! The router only ever sends requests, so [`Frame::serialize_command`] is
//! the hot path. [`Frame::serialize`] covers every reply shape and backs
//! the test doubles that play a node.

use bytes::{BufMut, BytesMut};

use crate::types::Frame;

const CRLF: &[u8] = b"\r\n";

impl Frame {
    /// Appends the RESP encoding of this frame to `dst`.
    pub fn serialize(&self, dst: &mut BytesMut) {
        match self {
            Frame::Simple(s) => line(b'+', s.as_bytes(), dst),
            Frame::Error(msg) => line(b'-', msg.as_bytes(), dst),
            Frame::Integer(n) => {
                let mut digits = itoa::Buffer::new();
                line(b':', digits.format(*n).as_bytes(), dst);
            }
            Frame::Bulk(data) => bulk(data, dst),
            Frame::Array(items) => {
                header(b'*', items.len(), dst);
                items.iter().for_each(|item| item.serialize(dst));
            }
            Frame::Map(pairs) => {
                header(b'%', pairs.len(), dst);
                for (key, value) in pairs {
                    key.serialize(dst);
                    value.serialize(dst);
                }
            }
            Frame::Null => dst.put_slice(b"_\r\n"),
            Frame::Double(v) if v.is_nan() => line(b',', b"nan", dst),
            Frame::Double(v) if v.is_infinite() => {
                let text: &[u8] = if v.is_sign_positive() { b"inf" } else { b"-inf" };
                line(b',', text, dst);
            }
            Frame::Double(v) => line(b',', v.to_string().as_bytes(), dst),
            Frame::Boolean(true) => dst.put_slice(b"#t\r\n"),
            Frame::Boolean(false) => dst.put_slice(b"#f\r\n"),
        }
    }

    /// Appends a request, `args` as an array of bulk strings, without
    /// building a `Frame` first.
    pub fn serialize_command<A: AsRef<[u8]>>(args: &[A], dst: &mut BytesMut) {
        let payload: usize = args.iter().map(|a| a.as_ref().len() + 16).sum();
        dst.reserve(payload + 16);
        header(b'*', args.len(), dst);
        for arg in args {
            bulk(arg.as_ref(), dst);
        }
    }
}

fn line(prefix: u8, body: &[u8], dst: &mut BytesMut) {
    dst.put_u8(prefix);
    dst.put_slice(body);
    dst.put_slice(CRLF);
}

fn header(prefix: u8, len: usize, dst: &mut BytesMut) {
    let mut digits = itoa::Buffer::new();
    line(prefix, digits.format(len).as_bytes(), dst);
}

fn bulk(data: &[u8], dst: &mut BytesMut) {
    header(b'$', data.len(), dst);
    dst.put_slice(data);
    dst.put_slice(CRLF);
}
