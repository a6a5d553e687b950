//! Per-node connection plumbing
//!
//! This module handles:
//! * Transport abstraction (TCP, TLS, Unix socket)
//! * Single-socket command exchange
//! * The capability discovery handshake
//! * The bounded socket pool
//! * Client connection state machine

mod conn;
mod handshake;
mod pool;
mod provider;
mod state;
mod tls;
mod transport;

pub use conn::Connection;
pub use handshake::{
    discovery_command, handshake, ping_command, ping_node, NodeDescriptor,
    DEFAULT_MAX_DOCUMENT_SIZE, DEFAULT_MAX_WRITE_BATCH_SIZE,
};
pub use pool::{Pool, PoolAuth, PoolOptions, PooledSocket};
pub use provider::{
    open_with_timeout, CredentialProvider, Endpoint, SocketProvider, SocketTarget,
    TcpSocketProvider,
};
pub use state::ConnectionState;
pub use tls::{parse_server_name, TlsConfig, TlsConfigBuilder};
pub use transport::{TcpVariant, Transport};
