#![no_main]

use docstore_wire::connection::NodeDescriptor;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(reply) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };
    if let Ok(node) = NodeDescriptor::from_reply(&reply) {
        if reply.is_object() && reply.get("maxMessageSizeBytes").is_none() {
            assert_eq!(node.max_message_size, node.max_document_size.saturating_mul(2));
        }
    }
});
