//! Capability discovery handshake

use super::conn::Connection;
use super::provider::{open_with_timeout, Endpoint, SocketProvider};
use crate::client::WireVersionRange;
use crate::protocol::constants::{commands, fields};
use crate::Result;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::{Duration, Instant};
use tracing::Instrument;

/// Document size assumed when the node does not report one (4 MiB)
pub const DEFAULT_MAX_DOCUMENT_SIZE: u64 = 4 * 1024 * 1024;

/// Write batch size assumed when the node does not report one
pub const DEFAULT_MAX_WRITE_BATCH_SIZE: u64 = 1000;

/// Role and limits reported by a node during the handshake
///
/// Produced fresh by every successful handshake and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeDescriptor {
    /// Node currently accepts writes
    pub writable: bool,
    /// Node is a sharded-cluster router
    pub router: bool,
    /// Node reports itself as a secondary
    pub secondary: bool,
    /// Replica set name, if any
    pub set_name: Option<String>,
    /// Largest document the node accepts, in bytes
    pub max_document_size: u64,
    /// Largest message the node accepts, in bytes
    pub max_message_size: u64,
    /// Largest batch for bulk write commands
    pub max_write_batch_size: u64,
    /// Wire versions the node speaks
    pub wire_versions: WireVersionRange,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DiscoveryReply {
    #[serde(rename = "ismaster")]
    is_master: bool,
    secondary: bool,
    msg: Option<String>,
    #[serde(rename = "setName")]
    set_name: Option<String>,
    #[serde(rename = "maxBsonObjectSize")]
    max_bson_object_size: Option<u64>,
    #[serde(rename = "maxMessageSizeBytes")]
    max_message_size_bytes: Option<u64>,
    #[serde(rename = "maxWriteBatchSize")]
    max_write_batch_size: Option<u64>,
    #[serde(rename = "minWireVersion")]
    min_wire_version: Option<u32>,
    #[serde(rename = "maxWireVersion")]
    max_wire_version: Option<u32>,
}

impl NodeDescriptor {
    /// Parse a discovery reply, filling absent limits with defaults
    ///
    /// The message size default is twice the effective document size.
    pub fn from_reply(reply: &Value) -> Result<Self> {
        let parsed = DiscoveryReply::deserialize(reply)?;

        let max_document_size = parsed
            .max_bson_object_size
            .unwrap_or(DEFAULT_MAX_DOCUMENT_SIZE);

        Ok(Self {
            writable: parsed.is_master,
            router: parsed.msg.as_deref() == Some(fields::ROUTER_MARKER),
            secondary: parsed.secondary,
            set_name: parsed.set_name,
            max_document_size,
            max_message_size: parsed
                .max_message_size_bytes
                .unwrap_or_else(|| max_document_size.saturating_mul(2)),
            max_write_batch_size: parsed
                .max_write_batch_size
                .unwrap_or(DEFAULT_MAX_WRITE_BATCH_SIZE),
            wire_versions: WireVersionRange::new(
                parsed.min_wire_version.unwrap_or(0),
                parsed.max_wire_version.unwrap_or(0),
            ),
        })
    }
}

/// Build the discovery command, including client metadata
pub fn discovery_command(app_name: Option<&str>) -> Value {
    let mut client = Map::new();
    client.insert(
        "driver".to_string(),
        json!({
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        }),
    );
    client.insert(
        "os".to_string(),
        json!({
            "type": std::env::consts::OS,
            "name": whoami::distro(),
            "architecture": std::env::consts::ARCH,
        }),
    );
    if let Some(name) = app_name {
        client.insert("application".to_string(), json!({ "name": name }));
    }

    let mut cmd = Map::new();
    cmd.insert(commands::IS_MASTER.to_string(), json!(1));
    cmd.insert("client".to_string(), Value::Object(client));
    Value::Object(cmd)
}

/// Build the no-op liveness command
pub fn ping_command() -> Value {
    let mut cmd = Map::new();
    cmd.insert(commands::PING.to_string(), json!(1));
    Value::Object(cmd)
}

/// Open a transient socket, run discovery, and close the socket
///
/// The socket is closed whether discovery succeeds or fails; a failed
/// close is logged and never replaces the discovery result.
///
/// # Errors
///
/// - [`crate::Error::ConnectTimeout`] if the socket is not established in time
/// - [`crate::Error::OperationTimeout`] if discovery exceeds `read_timeout`
/// - [`crate::Error::ConnectionFailure`] on any socket-level failure
pub async fn handshake(
    provider: &dyn SocketProvider,
    endpoint: &Endpoint,
    connect_timeout: Duration,
    read_timeout: Option<Duration>,
    app_name: Option<&str>,
) -> Result<NodeDescriptor> {
    let address = endpoint.address();

    async {
        let started = Instant::now();
        let transport = open_with_timeout(provider, endpoint, connect_timeout).await?;
        let mut conn = Connection::new(transport, address.clone()).with_op_timeout(read_timeout);
        tracing::debug!(transport = conn.transport_kind(), "handshake socket open");

        let reply = conn.command(discovery_command(app_name)).await;

        if let Err(e) = conn.close().await {
            tracing::warn!(error = %e, "failed to close handshake socket");
        }

        let node = NodeDescriptor::from_reply(&reply?)?;
        crate::metrics::histograms::handshake_duration(
            &address,
            started.elapsed().as_millis() as u64,
        );
        tracing::debug!(
            writable = node.writable,
            router = node.router,
            wire_versions = %node.wire_versions,
            "handshake complete"
        );
        Ok(node)
    }
    .instrument(tracing::info_span!("handshake", address = %address))
    .await
}

/// Ping the node over a transient socket
///
/// Used when every pooled socket is busy, so liveness does not depend on
/// pool capacity.
pub async fn ping_node(
    provider: &dyn SocketProvider,
    endpoint: &Endpoint,
    connect_timeout: Duration,
    read_timeout: Option<Duration>,
) -> Result<()> {
    let transport = open_with_timeout(provider, endpoint, connect_timeout).await?;
    let mut conn = Connection::new(transport, endpoint.address()).with_op_timeout(read_timeout);

    let reply = conn.command(ping_command()).await;
    if let Err(e) = conn.close().await {
        tracing::debug!(error = %e, "failed to close ping socket");
    }
    reply.map(|_| ())
}
