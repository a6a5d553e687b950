//! Client API
//!
//! [`Client`] owns the connection to one node: it runs the handshake,
//! gates on wire version compatibility, and hands out pooled sockets.
//! The resolvers it depends on are usable on their own.

mod config;
mod manager;
mod preferences;
mod socket_config;
mod wire_version;

pub use config::{
    ClientConfig, ClientConfigBuilder, Credential, OptionKey, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_POOL_SIZE, DEFAULT_POOL_TIMEOUT, DEFAULT_PORT,
};
pub use manager::{Client, ClientBuilder, Intent};
pub use preferences::{
    parse_tag_sets, resolve_read_preference, resolve_write_concern, Acknowledgement, ReadMode,
    ReadPreference, TagSet, WriteConcern, WriteConcernOptions, DEFAULT_ACCEPTABLE_LATENCY_MS,
};
pub use socket_config::{
    resolve_transport, RawTlsOptions, TlsSettings, TransportConfig, TransportKind,
    DOMAIN_SOCKET_SUFFIX,
};
pub use wire_version::{
    compatible, feature_available, features, WireVersionRange, CLIENT_WIRE_VERSIONS,
};
