//! Framing constants

/// Header length in bytes (length, request id, response-to, op code)
pub const HEADER_LENGTH: usize = 16;

/// Largest frame accepted from a peer (48 MB), checked before allocation
pub const MAX_FRAME_LENGTH: usize = 48_000_000;

/// Op codes
pub mod op {
    /// Client command
    pub const COMMAND: i32 = 2010;

    /// Server reply to a command
    pub const COMMAND_REPLY: i32 = 2011;
}

/// Command names
pub mod commands {
    /// Capability discovery
    pub const IS_MASTER: &str = "isMaster";

    /// No-op liveness command
    pub const PING: &str = "ping";
}

/// Discovery reply values
pub mod fields {
    /// Value of `msg` reported by cluster routers
    pub const ROUTER_MARKER: &str = "isdbgrid";
}
