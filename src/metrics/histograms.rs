//! Histogram metrics

/// Time spent in the discovery handshake, in milliseconds
pub fn handshake_duration(address: &str, duration_ms: u64) {
    metrics::histogram!("docstore_wire_handshake_duration_ms", "address" => address.to_string())
        .record(duration_ms as f64);
}

/// Time a checkout waited before receiving a socket, in milliseconds
pub fn checkout_wait(duration_ms: u64) {
    metrics::histogram!("docstore_wire_checkout_wait_ms").record(duration_ms as f64);
}
