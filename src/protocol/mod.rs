//! Wire framing
//!
//! Frames carry a 16-byte little-endian header followed by a JSON document
//! body. Document encoding proper is owned by the layer above this crate;
//! this module only frames and unframes command/reply documents.

pub mod constants;
pub mod decode;
pub mod encode;
pub mod message;

pub use decode::decode_message;
pub use encode::encode_message;
pub use message::{Message, OpCode};
