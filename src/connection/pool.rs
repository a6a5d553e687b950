//! Bounded socket pool bound to one node
//!
//! Capacity is a semaphore sized to the pool; each checked-out socket holds
//! one permit until it is checked in or dropped. Idle sockets are reused
//! before new ones are opened, and sockets are opened lazily on checkout.

use super::conn::Connection;
use super::provider::{open_with_timeout, CredentialProvider, Endpoint, SocketProvider};
use crate::client::Credential;
use crate::metrics::{counters, histograms};
use crate::{Error, Result};
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// Sizing and timeouts for a [`Pool`]
#[derive(Debug, Clone)]
pub struct PoolOptions {
    /// Maximum number of sockets checked out at once
    pub size: usize,
    /// How long a checkout waits for capacity
    pub wait_timeout: Duration,
    /// Bound on opening a new socket
    pub connect_timeout: Duration,
    /// Bound on each command exchange over a pooled socket
    pub op_timeout: Option<Duration>,
}

/// Credentials the pool applies to each socket it opens
#[derive(Clone)]
pub struct PoolAuth {
    provider: Arc<dyn CredentialProvider>,
    credentials: Arc<RwLock<Vec<Credential>>>,
}

impl PoolAuth {
    /// Apply the shared credential set through `provider`
    pub fn new(
        provider: Arc<dyn CredentialProvider>,
        credentials: Arc<RwLock<Vec<Credential>>>,
    ) -> Self {
        Self {
            provider,
            credentials,
        }
    }
}

/// Socket pool for one endpoint
pub struct Pool {
    id: u64,
    endpoint: Arc<Endpoint>,
    options: PoolOptions,
    provider: Arc<dyn SocketProvider>,
    auth: Option<PoolAuth>,
    idle: Mutex<VecDeque<Connection>>,
    semaphore: Arc<Semaphore>,
    closed: AtomicBool,
}

impl Pool {
    /// Open a pool; no sockets are opened until the first checkout
    pub fn open(
        endpoint: Arc<Endpoint>,
        provider: Arc<dyn SocketProvider>,
        auth: Option<PoolAuth>,
        options: PoolOptions,
    ) -> Arc<Self> {
        let id = NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            pool = id,
            address = %endpoint.address(),
            size = options.size,
            "pool opened"
        );

        Arc::new(Self {
            id,
            semaphore: Arc::new(Semaphore::new(options.size)),
            endpoint,
            options,
            provider,
            auth,
            idle: Mutex::new(VecDeque::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// Unique identity of this pool instance
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Configured capacity
    pub fn size(&self) -> usize {
        self.options.size
    }

    /// Sockets waiting in the idle queue
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    /// Capacity not currently checked out
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Whether [`Pool::close`] has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Borrow a socket, waiting up to the pool's wait timeout for capacity
    ///
    /// # Errors
    ///
    /// - [`Error::PoolTimeout`] if no capacity frees up in time
    /// - [`Error::PoolClosed`] if the pool is or becomes closed
    /// - connect errors if a new socket has to be opened and cannot be
    pub async fn checkout(&self) -> Result<PooledSocket> {
        self.checkout_within(self.options.wait_timeout).await
    }

    /// Borrow a socket, waiting at most `wait` for capacity
    ///
    /// A zero `wait` still takes a free slot if one is available.
    pub async fn checkout_within(&self, wait: Duration) -> Result<PooledSocket> {
        if self.is_closed() {
            return Err(Error::PoolClosed);
        }

        let started = Instant::now();
        let permit = match tokio::time::timeout(
            wait,
            self.semaphore.clone().acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(Error::PoolClosed),
            Err(_) => {
                let address = self.endpoint.address();
                counters::pool_timeout(&address);
                return Err(Error::PoolTimeout {
                    address,
                    timeout: wait,
                });
            }
        };
        histograms::checkout_wait(started.elapsed().as_millis() as u64);
        if self.is_closed() {
            return Err(Error::PoolClosed);
        }

        let reused = self.idle.lock().pop_front();
        let mut conn = match reused {
            Some(conn) => conn,
            None => self.open_socket().await?,
        };
        self.authenticate(&mut conn).await?;

        // Closed while the socket was being opened or authenticated
        if self.is_closed() {
            counters::socket_discarded("pool_closed");
            if let Err(e) = conn.close().await {
                tracing::debug!(pool = self.id, error = %e, "error closing socket");
            }
            return Err(Error::PoolClosed);
        }

        Ok(PooledSocket {
            conn,
            pool_id: self.id,
            _permit: permit,
        })
    }

    async fn open_socket(&self) -> Result<Connection> {
        let transport = open_with_timeout(
            self.provider.as_ref(),
            &self.endpoint,
            self.options.connect_timeout,
        )
        .await?;
        let conn = Connection::new(transport, self.endpoint.address())
            .with_op_timeout(self.options.op_timeout);

        counters::socket_opened(conn.transport_kind());
        tracing::debug!(pool = self.id, transport = conn.transport_kind(), "socket opened");
        Ok(conn)
    }

    /// Apply every credential the socket has not seen yet
    async fn authenticate(&self, conn: &mut Connection) -> Result<()> {
        let Some(auth) = &self.auth else {
            return Ok(());
        };

        let pending: Vec<Credential> = auth
            .credentials
            .read()
            .iter()
            .filter(|c| !conn.is_authenticated(&c.source))
            .cloned()
            .collect();

        for credential in &pending {
            auth.provider.authenticate(conn, credential).await?;
            conn.mark_authenticated(credential.source.clone());
            tracing::debug!(pool = self.id, source = %credential.source, "credential applied");
        }
        Ok(())
    }

    /// Return a socket
    ///
    /// Returns false if the socket was discarded instead: it came from a
    /// different pool, this pool is closed, or the socket is broken.
    pub fn checkin(&self, socket: PooledSocket) -> bool {
        let PooledSocket {
            conn,
            pool_id,
            _permit,
        } = socket;

        let reason = if pool_id != self.id {
            Some("foreign_pool")
        } else if self.is_closed() {
            Some("pool_closed")
        } else if conn.is_broken() {
            Some("broken")
        } else {
            None
        };

        if let Some(reason) = reason {
            tracing::debug!(pool = self.id, socket_pool = pool_id, reason, "socket discarded");
            counters::socket_discarded(reason);
            return false;
        }

        // Queue before the permit is released so the next waiter reuses it
        self.idle.lock().push_back(conn);
        true
    }

    /// Close the pool and every idle socket
    ///
    /// Pending checkouts fail with [`Error::PoolClosed`]; sockets still
    /// checked out are discarded when they come back.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.semaphore.close();

        let drained: Vec<Connection> = self.idle.lock().drain(..).collect();
        for conn in drained {
            if let Err(e) = conn.close().await {
                tracing::debug!(pool = self.id, error = %e, "error closing idle socket");
            }
        }
        tracing::debug!(pool = self.id, "pool closed");
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("id", &self.id)
            .field("address", &self.endpoint.address())
            .field("size", &self.options.size)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// A socket checked out of a [`Pool`]
///
/// Dropping it without checkin closes the socket and frees its slot.
pub struct PooledSocket {
    conn: Connection,
    pool_id: u64,
    _permit: OwnedSemaphorePermit,
}

impl PooledSocket {
    /// Identity of the pool this socket belongs to
    pub fn pool_id(&self) -> u64 {
        self.pool_id
    }
}

impl std::ops::Deref for PooledSocket {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.conn
    }
}

impl std::ops::DerefMut for PooledSocket {
    fn deref_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }
}

impl std::fmt::Debug for PooledSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledSocket")
            .field("pool_id", &self.pool_id)
            .field("conn", &self.conn)
            .finish()
    }
}
