//! Frame decoding

use super::constants::{HEADER_LENGTH, MAX_FRAME_LENGTH};
use super::message::{Message, OpCode};
use bytes::BytesMut;
use std::io;

/// Decode one frame from the front of `data`
///
/// The buffer is not advanced; the caller advances by the returned byte count.
///
/// # Returns
/// `Ok((msg, consumed))` - Message and number of bytes consumed
/// `Err(e)` - `UnexpectedEof` if more bytes are needed, `InvalidData` if the frame is malformed
pub fn decode_message(data: &mut BytesMut) -> io::Result<(Message, usize)> {
    if data.len() < HEADER_LENGTH {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "incomplete message header",
        ));
    }

    let raw_len = read_i32(data, 0);
    if raw_len < HEADER_LENGTH as i32 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("message length {} is shorter than the header", raw_len),
        ));
    }

    let len = raw_len as usize;
    if len > MAX_FRAME_LENGTH {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "message length {} exceeds maximum allowed {}",
                len, MAX_FRAME_LENGTH
            ),
        ));
    }

    if data.len() < len {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "incomplete message body",
        ));
    }

    let request_id = read_i32(data, 4);
    let response_to = read_i32(data, 8);
    let raw_op = read_i32(data, 12);
    let op_code = OpCode::from_i32(raw_op).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unknown op code: {}", raw_op),
        )
    })?;

    let body = serde_json::from_slice(&data[HEADER_LENGTH..len]).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("invalid document body: {}", e),
        )
    })?;

    Ok((
        Message {
            request_id,
            response_to,
            op_code,
            body,
        },
        len,
    ))
}

fn read_i32(data: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}
