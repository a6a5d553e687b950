//! Client connection manager

use super::config::{ClientConfig, Credential};
use super::preferences::{ReadMode, ReadPreference, WriteConcern};
use super::wire_version::{self, features, WireVersionRange, CLIENT_WIRE_VERSIONS};
use crate::connection::{
    handshake, ping_command, ping_node, ConnectionState, CredentialProvider, Endpoint,
    NodeDescriptor, Pool, PoolAuth, PoolOptions, PooledSocket, SocketProvider, TcpSocketProvider,
    DEFAULT_MAX_DOCUMENT_SIZE, DEFAULT_MAX_WRITE_BATCH_SIZE,
};
use crate::metrics::{counters, labels};
use crate::{Error, Result};
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

/// What a checked-out socket will be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// Read operations
    Read,
    /// Write operations
    Write,
}

impl Intent {
    fn label(self) -> &'static str {
        match self {
            Self::Read => labels::INTENT_READ,
            Self::Write => labels::INTENT_WRITE,
        }
    }
}

#[derive(Default)]
struct Shared {
    state: ConnectionState,
    node: Option<Arc<NodeDescriptor>>,
    pool: Option<Arc<Pool>>,
}

impl Shared {
    fn set_state(&mut self, next: ConnectionState) {
        if let Err(e) = self.state.transition(next) {
            tracing::warn!(error = %e, "forcing connection state");
            self.state = next;
        }
    }
}

/// Connection manager for a single node
///
/// Connect, reconnect, and close are serialized; checkout and checkin take
/// a snapshot of the current pool and never hold the transition lock while
/// waiting for a socket.
pub struct Client {
    config: ClientConfig,
    endpoint: Arc<Endpoint>,
    socket_provider: Arc<dyn SocketProvider>,
    credential_provider: Option<Arc<dyn CredentialProvider>>,
    credentials: Arc<RwLock<Vec<Credential>>>,
    transition: tokio::sync::Mutex<()>,
    shared: RwLock<Shared>,
}

/// Builder for [`Client`] with replaceable capability providers
pub struct ClientBuilder {
    config: ClientConfig,
    socket_provider: Arc<dyn SocketProvider>,
    credential_provider: Option<Arc<dyn CredentialProvider>>,
}

impl ClientBuilder {
    /// Open sockets through `provider` instead of the default TCP provider
    pub fn socket_provider(mut self, provider: Arc<dyn SocketProvider>) -> Self {
        self.socket_provider = provider;
        self
    }

    /// Authenticate pooled sockets through `provider`
    pub fn credential_provider(mut self, provider: Arc<dyn CredentialProvider>) -> Self {
        self.credential_provider = Some(provider);
        self
    }

    /// Validate and build the client without connecting
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if TLS material cannot be loaded or
    /// credentials are configured without a credential provider.
    pub fn build(self) -> Result<Client> {
        if !self.config.credentials().is_empty() && self.credential_provider.is_none() {
            return Err(Error::Config(
                "credentials configured without a credential provider".into(),
            ));
        }

        let endpoint = Endpoint::resolve(
            self.config.host(),
            self.config.port(),
            self.config.transport(),
        )?;

        let mut credentials: Vec<Credential> = Vec::new();
        for credential in self.config.credentials() {
            upsert_credential(&mut credentials, credential.clone());
        }

        Ok(Client {
            endpoint: Arc::new(endpoint),
            socket_provider: self.socket_provider,
            credential_provider: self.credential_provider,
            credentials: Arc::new(RwLock::new(credentials)),
            transition: tokio::sync::Mutex::new(()),
            shared: RwLock::new(Shared::default()),
            config: self.config,
        })
    }

    /// Build the client and connect if the configuration asks for it
    pub async fn open(self) -> Result<Client> {
        let client = self.build()?;
        if client.config.auto_connect() {
            client.connect().await?;
        }
        Ok(client)
    }
}

fn upsert_credential(credentials: &mut Vec<Credential>, credential: Credential) {
    match credentials.iter_mut().find(|c| c.source == credential.source) {
        Some(existing) => *existing = credential,
        None => credentials.push(credential),
    }
}

/// Marks the state Failed if a connect attempt is abandoned mid-flight
struct ConnectAttempt<'a> {
    shared: &'a RwLock<Shared>,
    armed: bool,
}

impl ConnectAttempt<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ConnectAttempt<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut shared = self.shared.write();
            if shared.state == ConnectionState::Connecting {
                shared.set_state(ConnectionState::Failed);
            }
        }
    }
}

impl Client {
    /// Create a client without connecting
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # async fn example() -> docstore_wire::Result<()> {
    /// use docstore_wire::{Client, ClientConfig};
    ///
    /// let config = ClientConfig::builder("localhost", 27017).build()?;
    /// let client = Client::new(config)?;
    /// client.connect().await?;
    /// assert!(client.is_connected());
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(config: ClientConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    /// Start a builder to replace the socket or credential provider
    pub fn builder(config: ClientConfig) -> ClientBuilder {
        ClientBuilder {
            config,
            socket_provider: Arc::new(TcpSocketProvider),
            credential_provider: None,
        }
    }

    /// Create a client, connecting immediately when `auto_connect` is set
    pub async fn open(config: ClientConfig) -> Result<Self> {
        Self::builder(config).open().await
    }

    /// Run the handshake and replace the pool
    ///
    /// Always a full reset: an existing pool is closed and the node
    /// descriptor discarded before the handshake runs.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectTimeout`] / [`Error::OperationTimeout`] from the handshake
    /// - [`Error::ConnectionFailure`] naming the address for any other handshake failure
    /// - [`Error::VersionMismatch`] if the node's wire range does not overlap ours
    ///
    /// The state is Failed after any of these.
    pub async fn connect(&self) -> Result<()> {
        let _guard = self.transition.lock().await;
        self.connect_locked().await
    }

    /// Same as [`Client::connect`]
    pub async fn reconnect(&self) -> Result<()> {
        self.connect().await
    }

    async fn connect_locked(&self) -> Result<()> {
        let address = self.endpoint.address();

        async {
            counters::connect_attempted(&address);

            let (previous, attempt) = {
                let mut shared = self.shared.write();
                shared.state.transition(ConnectionState::Connecting)?;
                shared.node = None;
                let previous = shared.pool.take();
                (
                    previous,
                    ConnectAttempt {
                        shared: &self.shared,
                        armed: true,
                    },
                )
            };
            if let Some(pool) = previous {
                tracing::debug!(pool = pool.id(), "tearing down previous pool");
                pool.close().await;
            }

            let node = match handshake(
                self.socket_provider.as_ref(),
                &self.endpoint,
                self.config.connect_timeout(),
                self.config.op_timeout(),
                self.config.app_name(),
            )
            .await
            {
                Ok(node) => node,
                Err(e) => {
                    let err = match e {
                        e @ (Error::ConnectTimeout { .. }
                        | Error::OperationTimeout { .. }
                        | Error::ConnectionFailure { .. }
                        | Error::Config(_)) => e,
                        other => Error::connection_failure(address.clone(), other),
                    };
                    return Err(self.fail(attempt, &address, err));
                }
            };

            if !wire_version::compatible(CLIENT_WIRE_VERSIONS, node.wire_versions) {
                let err = Error::VersionMismatch {
                    client: CLIENT_WIRE_VERSIONS,
                    server: node.wire_versions,
                };
                return Err(self.fail(attempt, &address, err));
            }

            if !node.writable {
                tracing::info!(router = node.router, "node is not writable");
            }

            let pool = Pool::open(
                self.endpoint.clone(),
                self.socket_provider.clone(),
                self.credential_provider
                    .as_ref()
                    .map(|p| PoolAuth::new(p.clone(), self.credentials.clone())),
                PoolOptions {
                    size: self.config.pool_size(),
                    wait_timeout: self.config.pool_timeout(),
                    connect_timeout: self.config.connect_timeout(),
                    op_timeout: self.config.op_timeout(),
                },
            );

            {
                let mut shared = self.shared.write();
                shared.set_state(ConnectionState::Connected);
                shared.node = Some(Arc::new(node));
                shared.pool = Some(pool);
            }
            attempt.disarm();

            counters::connect_completed(&address, labels::OUTCOME_SUCCESS, None);
            tracing::info!("connected");
            Ok(())
        }
        .instrument(tracing::info_span!("connect", address = %address))
        .await
    }

    fn fail(&self, attempt: ConnectAttempt<'_>, address: &str, err: Error) -> Error {
        {
            let mut shared = self.shared.write();
            shared.set_state(ConnectionState::Failed);
        }
        attempt.disarm();

        counters::connect_completed(address, labels::OUTCOME_FAILURE, Some(err.category()));
        tracing::warn!(error = %err, "connect failed");
        err
    }

    /// Whether the state is Connected and the pool is open
    pub fn is_connected(&self) -> bool {
        self.current_pool().is_some()
    }

    fn current_pool(&self) -> Option<Arc<Pool>> {
        let shared = self.shared.read();
        match (&shared.state, &shared.pool) {
            (ConnectionState::Connected, Some(pool)) if !pool.is_closed() => Some(pool.clone()),
            _ => None,
        }
    }

    async fn live_pool(&self) -> Result<Arc<Pool>> {
        if let Some(pool) = self.current_pool() {
            return Ok(pool);
        }

        let _guard = self.transition.lock().await;
        // Another caller may have connected while we waited
        if let Some(pool) = self.current_pool() {
            return Ok(pool);
        }
        tracing::debug!("not connected, connecting before checkout");
        self.connect_locked().await?;
        self.current_pool().ok_or(Error::PoolClosed)
    }

    fn is_current(&self, pool_id: u64) -> bool {
        self.current_pool().is_some_and(|pool| pool.id() == pool_id)
    }

    /// Tear down `pool` after it lost the node, unless a reconnect already replaced it
    async fn invalidate(&self, pool: &Pool, err: &Error) {
        let _guard = self.transition.lock().await;

        let stale = {
            let mut shared = self.shared.write();
            if shared.pool.as_ref().is_some_and(|current| current.id() == pool.id()) {
                shared.set_state(ConnectionState::Failed);
                shared.node = None;
                shared.pool.take()
            } else {
                None
            }
        };

        if let Some(stale) = stale {
            stale.close().await;
            counters::connect_completed(
                &self.endpoint.address(),
                labels::OUTCOME_FAILURE,
                Some(err.category()),
            );
            tracing::warn!(pool = stale.id(), error = %err, "node unreachable, pool discarded");
        }
    }

    /// Borrow a socket, connecting first if necessary
    ///
    /// A connection failure while the pool opens a socket leaves the client
    /// Failed; the next checkout runs a fresh handshake.
    ///
    /// # Errors
    ///
    /// Any connect error when the client was not connected, otherwise
    /// [`Error::PoolTimeout`] if no socket frees up in time.
    pub async fn checkout(&self, intent: Intent) -> Result<PooledSocket> {
        let socket = loop {
            let pool = self.live_pool().await?;
            match pool.checkout().await {
                // Torn down by a concurrent reconnect or close; take the replacement
                Err(Error::PoolClosed) => continue,
                Err(e) if e.is_connection_error() => {
                    self.invalidate(&pool, &e).await;
                    return Err(e);
                }
                Err(e) => return Err(e),
                Ok(socket) if !self.is_current(socket.pool_id()) => {
                    counters::socket_discarded("stale_pool");
                    continue;
                }
                Ok(socket) => break socket,
            }
        };

        counters::checkout(intent.label());
        tracing::trace!(intent = intent.label(), pool = socket.pool_id(), "socket checked out");
        Ok(socket)
    }

    /// Return a socket
    ///
    /// Sockets from a pool that has since been replaced or closed are
    /// discarded. Returns whether the socket went back into the pool.
    pub fn checkin(&self, socket: PooledSocket) -> bool {
        let pool = self.shared.read().pool.clone();
        match pool {
            Some(pool) => pool.checkin(socket),
            None => {
                counters::socket_discarded("no_pool");
                false
            }
        }
    }

    /// Close the pool and forget the node
    ///
    /// Idempotent; safe to call when never connected.
    pub async fn close(&self) {
        let _guard = self.transition.lock().await;

        let pool = {
            let mut shared = self.shared.write();
            shared.set_state(ConnectionState::Disconnected);
            shared.node = None;
            shared.pool.take()
        };

        if let Some(pool) = pool {
            pool.close().await;
            tracing::info!(address = %self.endpoint.address(), "closed");
        }
    }

    /// Liveness probe
    ///
    /// False when not connected or when a ping fails with a connection or
    /// timeout error. Other errors propagate. The ping uses an idle pooled
    /// socket when one is free and a transient socket otherwise, so a busy
    /// pool never reads as a dead node.
    pub async fn is_active(&self) -> Result<bool> {
        let Some(pool) = self.current_pool() else {
            return Ok(false);
        };

        let probe = async {
            match pool.checkout_within(Duration::ZERO).await {
                Ok(mut socket) => {
                    let reply = socket.command(ping_command()).await;
                    pool.checkin(socket);
                    reply.map(|_| ())
                }
                Err(Error::PoolTimeout { .. }) => {
                    ping_node(
                        self.socket_provider.as_ref(),
                        &self.endpoint,
                        self.config.connect_timeout(),
                        self.config.op_timeout(),
                    )
                    .await
                }
                Err(e) => {
                    if e.is_connection_error() {
                        self.invalidate(&pool, &e).await;
                    }
                    Err(e)
                }
            }
        };

        let alive = match probe.await {
            Ok(()) => true,
            Err(e) if e.is_connection_error() || e.is_timeout() || matches!(e, Error::PoolClosed) => {
                tracing::debug!(error = %e, "liveness probe failed");
                false
            }
            Err(e) => return Err(e),
        };
        counters::liveness_probe(alive);
        Ok(alive)
    }

    /// Check out a socket, run one command, and check the socket back in
    pub async fn run_command(&self, intent: Intent, command: Value) -> Result<Value> {
        let mut socket = self.checkout(intent).await?;
        let reply = socket.command(command).await;
        self.checkin(socket);
        reply
    }

    /// Configuration the client was built with
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Node host (or socket path)
    pub fn host(&self) -> &str {
        self.endpoint.host()
    }

    /// Node port
    pub fn port(&self) -> u16 {
        self.endpoint.port()
    }

    /// `host:port`, or the socket path for Unix sockets
    pub fn address(&self) -> String {
        self.endpoint.address()
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.shared.read().state
    }

    /// Descriptor from the last successful handshake
    pub fn node(&self) -> Option<Arc<NodeDescriptor>> {
        self.shared.read().node.clone()
    }

    /// Whether the connected node accepts writes
    pub fn is_writable(&self) -> bool {
        self.node().is_some_and(|n| n.writable)
    }

    /// Whether the connected node is a cluster router
    pub fn is_router(&self) -> bool {
        self.node().is_some_and(|n| n.router)
    }

    /// Largest document size, defaulted when not connected
    pub fn max_document_size(&self) -> u64 {
        self.node()
            .map_or(DEFAULT_MAX_DOCUMENT_SIZE, |n| n.max_document_size)
    }

    /// Largest message size, defaulted when not connected
    pub fn max_message_size(&self) -> u64 {
        self.node()
            .map_or(2 * DEFAULT_MAX_DOCUMENT_SIZE, |n| n.max_message_size)
    }

    /// Largest write batch, defaulted when not connected
    pub fn max_write_batch_size(&self) -> u64 {
        self.node()
            .map_or(DEFAULT_MAX_WRITE_BATCH_SIZE, |n| n.max_write_batch_size)
    }

    /// Wire range of the connected node, `[0, 0]` when not connected
    pub fn wire_versions(&self) -> WireVersionRange {
        self.node().map(|n| n.wire_versions).unwrap_or_default()
    }

    /// Whether `feature` can be used against the connected node
    pub fn feature_available(&self, feature: u32) -> bool {
        self.node().is_some_and(|n| {
            wire_version::feature_available(CLIENT_WIRE_VERSIONS, n.wire_versions, feature)
        })
    }

    /// Whether writes under `concern` should use write commands
    pub fn use_write_command(&self, concern: &WriteConcern) -> bool {
        concern.acknowledged() && self.feature_available(features::WRITE_COMMANDS)
    }

    /// Resolved read preference
    pub fn read_preference(&self) -> &ReadPreference {
        self.config.read_preference()
    }

    /// Resolved default write concern
    pub fn write_concern(&self) -> &WriteConcern {
        self.config.write_concern()
    }

    /// Whether reads go to the primary only
    pub fn read_primary(&self) -> bool {
        self.read_preference().mode() == ReadMode::Primary
    }

    /// Credentials applied to pooled sockets
    pub fn credentials(&self) -> Vec<Credential> {
        self.credentials.read().clone()
    }

    /// Add a credential, replacing any existing one for the same source
    ///
    /// Sockets already in the pool pick it up on their next checkout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the client has no credential provider.
    pub fn add_credential(&self, credential: Credential) -> Result<()> {
        if self.credential_provider.is_none() {
            return Err(Error::Config(
                "cannot add a credential without a credential provider".into(),
            ));
        }
        upsert_credential(&mut self.credentials.write(), credential);
        Ok(())
    }

    /// Remove the credential for `source`; returns whether one was removed
    pub fn remove_credential(&self, source: &str) -> bool {
        let mut credentials = self.credentials.write();
        let before = credentials.len();
        credentials.retain(|c| c.source != source);
        credentials.len() != before
    }

    /// Remove all credentials
    pub fn clear_credentials(&self) {
        self.credentials.write().clear();
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("address", &self.endpoint.address())
            .field("state", &self.state())
            .finish()
    }
}
