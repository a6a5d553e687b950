#![no_main]

use bytes::{Buf, BytesMut};
use docstore_wire::protocol::decode_message;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut buf = BytesMut::from(data);

    // Several frames may arrive in one read
    while !buf.is_empty() {
        match decode_message(&mut buf) {
            Ok((_, consumed)) => {
                assert!(consumed <= buf.len());
                buf.advance(consumed);
            }
            Err(_) => break,
        }
    }
});
