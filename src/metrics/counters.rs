//! Counter metrics

/// A connect attempt started
pub fn connect_attempted(address: &str) {
    metrics::counter!("docstore_wire_connect_attempts_total", "address" => address.to_string())
        .increment(1);
}

/// A connect attempt finished with `outcome`; `error` is the error category on failure
pub fn connect_completed(address: &str, outcome: &'static str, error: Option<&'static str>) {
    metrics::counter!(
        "docstore_wire_connect_completed_total",
        "address" => address.to_string(),
        "outcome" => outcome,
        "error" => error.unwrap_or("none")
    )
    .increment(1);
}

/// A new socket was opened by a pool
pub fn socket_opened(transport: &'static str) {
    metrics::counter!("docstore_wire_sockets_opened_total", "transport" => transport).increment(1);
}

/// A checked-in socket was dropped instead of being returned to its pool
pub fn socket_discarded(reason: &'static str) {
    metrics::counter!("docstore_wire_sockets_discarded_total", "reason" => reason).increment(1);
}

/// A socket was handed out by checkout
pub fn checkout(intent: &'static str) {
    metrics::counter!("docstore_wire_checkouts_total", "intent" => intent).increment(1);
}

/// A checkout gave up waiting for a socket
pub fn pool_timeout(address: &str) {
    metrics::counter!("docstore_wire_pool_timeouts_total", "address" => address.to_string())
        .increment(1);
}

/// A liveness probe finished
pub fn liveness_probe(alive: bool) {
    metrics::counter!(
        "docstore_wire_liveness_probes_total",
        "alive" => if alive { "true" } else { "false" }
    )
    .increment(1);
}
