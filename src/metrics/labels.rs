//! Metric label values

/// Connect outcome: success
pub const OUTCOME_SUCCESS: &str = "success";
/// Connect outcome: failure
pub const OUTCOME_FAILURE: &str = "failure";

/// Checkout intent: read
pub const INTENT_READ: &str = "read";
/// Checkout intent: write
pub const INTENT_WRITE: &str = "write";

/// Transport: plain TCP
pub const TRANSPORT_TCP: &str = "tcp";
/// Transport: TLS over TCP
pub const TRANSPORT_TLS: &str = "tls";
/// Transport: Unix domain socket
pub const TRANSPORT_UNIX: &str = "unix";
