//! Error types

use crate::client::WireVersionRange;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the connection core
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or contradictory configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Socket establishment exceeded the connect timeout
    #[error("timed out connecting to {address} after {timeout:?}")]
    ConnectTimeout {
        /// Address that was being dialed
        address: String,
        /// Configured connect timeout
        timeout: Duration,
    },

    /// Command exchange exceeded the operation timeout
    #[error("operation timed out after {timeout:?}")]
    OperationTimeout {
        /// Configured operation timeout
        timeout: Duration,
    },

    /// Socket-level failure (refused, reset, I/O error)
    #[error("failed to connect to {address}: {reason}")]
    ConnectionFailure {
        /// Address of the node
        address: String,
        /// Underlying failure
        reason: String,
    },

    /// Client and server wire version ranges do not overlap
    #[error("client wire version range {client} is incompatible with server range {server}")]
    VersionMismatch {
        /// Range supported by this client
        client: WireVersionRange,
        /// Range reported by the server
        server: WireVersionRange,
    },

    /// No pooled socket became available within the wait timeout
    #[error("no socket available from pool for {address} within {timeout:?}")]
    PoolTimeout {
        /// Address the pool is bound to
        address: String,
        /// Configured pool wait timeout
        timeout: Duration,
    },

    /// The pool was closed while a checkout was pending
    #[error("pool is closed")]
    PoolClosed,

    /// Server replied to a command with `ok: 0`
    #[error("command failed: {message} (code {code})")]
    Command {
        /// Server error code (0 if absent)
        code: i64,
        /// Server error message
        message: String,
    },

    /// Malformed frame or reply
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Invalid state transition
    #[error("invalid state: expected {expected}, got {actual}")]
    InvalidState {
        /// Expected state
        expected: String,
        /// Actual state
        actual: String,
    },

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// JSON body encoding/decoding error
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Build a connection failure for `address` from any displayable cause
    pub fn connection_failure(address: impl Into<String>, reason: impl ToString) -> Self {
        Self::ConnectionFailure {
            address: address.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether this error means the socket or node is unreachable
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::ConnectionFailure { .. } | Self::Io(_))
    }

    /// Whether this error is one of the timeout kinds
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectTimeout { .. } | Self::OperationTimeout { .. } | Self::PoolTimeout { .. }
        )
    }

    /// Stable category name, used as a metrics label
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::ConnectTimeout { .. } => "connect_timeout",
            Self::OperationTimeout { .. } => "operation_timeout",
            Self::ConnectionFailure { .. } => "connection_failure",
            Self::VersionMismatch { .. } => "version_mismatch",
            Self::PoolTimeout { .. } => "pool_timeout",
            Self::PoolClosed => "pool_closed",
            Self::Command { .. } => "command",
            Self::Protocol(_) => "protocol",
            Self::InvalidState { .. } => "invalid_state",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_classification() {
        let err = Error::PoolTimeout {
            address: "localhost:27017".into(),
            timeout: Duration::from_millis(10),
        };
        assert!(err.is_timeout());
        assert!(!err.is_connection_error());
        assert_eq!(err.category(), "pool_timeout");
    }

    #[test]
    fn test_connection_failure_display() {
        let err = Error::connection_failure("db.example.com:27017", "connection refused");
        assert!(err.is_connection_error());
        assert_eq!(
            err.to_string(),
            "failed to connect to db.example.com:27017: connection refused"
        );
    }

    #[test]
    fn test_version_mismatch_carries_ranges() {
        let err = Error::VersionMismatch {
            client: WireVersionRange::new(0, 3),
            server: WireVersionRange::new(4, 5),
        };
        let msg = err.to_string();
        assert!(msg.contains("[0, 3]"));
        assert!(msg.contains("[4, 5]"));
    }
}
