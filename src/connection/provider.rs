//! Capability interfaces
//!
//! The manager and pool open sockets through a [`SocketProvider`] and apply
//! credentials through a [`CredentialProvider`], so both can be replaced
//! without touching connection management.

use super::conn::Connection;
use super::tls::TlsConfig;
use super::transport::Transport;
use crate::client::{Credential, TransportConfig};
use crate::{Error, Result};
use futures::future::BoxFuture;
use std::path::PathBuf;
use std::time::Duration;

/// How to reach the node
#[derive(Debug, Clone)]
pub enum SocketTarget {
    /// Plain TCP
    Tcp,
    /// TLS over TCP
    Tls(TlsConfig),
    /// Unix domain socket
    Unix(PathBuf),
}

/// A node address plus the transport used to reach it
#[derive(Debug, Clone)]
pub struct Endpoint {
    host: String,
    port: u16,
    target: SocketTarget,
}

impl Endpoint {
    /// Create an endpoint
    pub fn new(host: impl Into<String>, port: u16, target: SocketTarget) -> Self {
        Self {
            host: host.into(),
            port,
            target,
        }
    }

    /// Build an endpoint from a resolved transport, loading TLS material
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the TLS configuration cannot be built.
    pub fn resolve(host: &str, port: u16, transport: &TransportConfig) -> Result<Self> {
        let target = match transport {
            TransportConfig::Tcp => SocketTarget::Tcp,
            TransportConfig::Tls(settings) => SocketTarget::Tls(TlsConfig::from_settings(settings)?),
            TransportConfig::Unix(path) => SocketTarget::Unix(path.clone()),
        };
        Ok(Self::new(host, port, target))
    }

    /// Host (or socket path)
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Transport target
    pub fn target(&self) -> &SocketTarget {
        &self.target
    }

    /// `host:port`, used in errors and logs
    pub fn address(&self) -> String {
        match &self.target {
            SocketTarget::Unix(path) => path.display().to_string(),
            _ => format!("{}:{}", self.host, self.port),
        }
    }
}

/// Opens transport-level sockets
pub trait SocketProvider: Send + Sync + std::fmt::Debug {
    /// Open a new socket to `endpoint`
    fn open<'a>(&'a self, endpoint: &'a Endpoint) -> BoxFuture<'a, Result<Transport>>;
}

/// Default provider: TCP, TLS, or Unix socket according to the endpoint
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpSocketProvider;

impl SocketProvider for TcpSocketProvider {
    fn open<'a>(&'a self, endpoint: &'a Endpoint) -> BoxFuture<'a, Result<Transport>> {
        Box::pin(async move {
            match endpoint.target() {
                SocketTarget::Tcp => Transport::connect_tcp(endpoint.host(), endpoint.port()).await,
                SocketTarget::Tls(tls) => {
                    Transport::connect_tcp_tls(endpoint.host(), endpoint.port(), tls).await
                }
                SocketTarget::Unix(path) => Transport::connect_unix(path).await,
            }
        })
    }
}

/// Authenticates freshly opened sockets
///
/// Mechanisms themselves live outside this crate; the pool only decides
/// when a credential must be applied.
pub trait CredentialProvider: Send + Sync {
    /// Authenticate `conn` with `credential`
    fn authenticate<'a>(
        &'a self,
        conn: &'a mut Connection,
        credential: &'a Credential,
    ) -> BoxFuture<'a, Result<()>>;
}

/// Open a socket bounded by `connect_timeout`
///
/// I/O failures become [`Error::ConnectionFailure`] naming the address; an
/// expired bound becomes [`Error::ConnectTimeout`].
pub async fn open_with_timeout(
    provider: &dyn SocketProvider,
    endpoint: &Endpoint,
    connect_timeout: Duration,
) -> Result<Transport> {
    match tokio::time::timeout(connect_timeout, provider.open(endpoint)).await {
        Ok(Ok(transport)) => Ok(transport),
        Ok(Err(Error::Io(e))) => Err(Error::connection_failure(endpoint.address(), e)),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(Error::ConnectTimeout {
            address: endpoint.address(),
            timeout: connect_timeout,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct HangingProvider;

    impl SocketProvider for HangingProvider {
        fn open<'a>(&'a self, _endpoint: &'a Endpoint) -> BoxFuture<'a, Result<Transport>> {
            Box::pin(futures::future::pending())
        }
    }

    #[test]
    fn test_endpoint_address() {
        let tcp = Endpoint::new("db.example.com", 27017, SocketTarget::Tcp);
        assert_eq!(tcp.address(), "db.example.com:27017");

        let unix = Endpoint::new(
            "/tmp/docstore.sock",
            27017,
            SocketTarget::Unix(PathBuf::from("/tmp/docstore.sock")),
        );
        assert_eq!(unix.address(), "/tmp/docstore.sock");
    }

    #[tokio::test]
    async fn test_open_refused_is_connection_failure() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let endpoint = Endpoint::new("127.0.0.1", port, SocketTarget::Tcp);
        let err = open_with_timeout(&TcpSocketProvider, &endpoint, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(
            matches!(err, Error::ConnectionFailure { ref address, .. } if address == &endpoint.address())
        );
    }

    #[tokio::test]
    async fn test_open_times_out() {
        let endpoint = Endpoint::new("127.0.0.1", 27017, SocketTarget::Tcp);
        let err = open_with_timeout(&HangingProvider, &endpoint, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConnectTimeout { .. }));
    }
}
