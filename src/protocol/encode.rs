//! Frame encoding

use super::constants::HEADER_LENGTH;
use super::message::Message;
use bytes::{BufMut, BytesMut};
use std::io;

/// Encode a message into bytes
pub fn encode_message(msg: &Message) -> io::Result<BytesMut> {
    let body = serde_json::to_vec(&msg.body)?;
    let len = HEADER_LENGTH + body.len();
    let len = i32::try_from(len).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("frame of {} bytes is too large to encode", len),
        )
    })?;

    let mut buf = BytesMut::with_capacity(len as usize);
    buf.put_i32_le(len);
    buf.put_i32_le(msg.request_id);
    buf.put_i32_le(msg.response_to);
    buf.put_i32_le(msg.op_code.as_i32());
    buf.put_slice(&body);

    Ok(buf)
}
