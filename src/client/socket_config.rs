//! Transport resolution
//!
//! Turns raw socket options into a concrete [`TransportConfig`]. This is a
//! pure validation step; certificate files are not read until the TLS
//! configuration is built.

use crate::{Error, Result};
use std::path::PathBuf;

/// Host suffix that selects a Unix domain socket
pub const DOMAIN_SOCKET_SUFFIX: &str = ".sock";

/// Raw TLS-related options as supplied by the caller
///
/// Every field except `ssl` counts as a TLS-prefixed option.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTlsOptions {
    /// Explicit TLS switch
    pub ssl: Option<bool>,
    /// Client certificate (PEM)
    pub ssl_cert: Option<PathBuf>,
    /// Client private key (PEM); defaults to `ssl_cert` when absent
    pub ssl_key: Option<PathBuf>,
    /// Passphrase for the client private key
    pub ssl_key_pass_phrase: Option<String>,
    /// CA certificate bundle (PEM)
    pub ssl_ca_cert: Option<PathBuf>,
    /// Whether to verify the server certificate
    pub ssl_verify: Option<bool>,
}

impl RawTlsOptions {
    fn has_tls_prefixed(&self) -> bool {
        self.ssl_cert.is_some()
            || self.ssl_key.is_some()
            || self.ssl_key_pass_phrase.is_some()
            || self.ssl_ca_cert.is_some()
            || self.ssl_verify.is_some()
    }
}

/// Validated TLS material
#[derive(Clone, PartialEq, Eq)]
pub struct TlsSettings {
    /// Client certificate
    pub cert: Option<PathBuf>,
    /// Client private key
    pub key: Option<PathBuf>,
    /// Key passphrase
    pub key_pass_phrase: Option<String>,
    /// CA certificate bundle
    pub ca_cert: Option<PathBuf>,
    /// Verify the server certificate against `ca_cert`
    pub verify: bool,
}

impl std::fmt::Debug for TlsSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsSettings")
            .field("cert", &self.cert)
            .field("key", &self.key)
            .field(
                "key_pass_phrase",
                &self.key_pass_phrase.as_ref().map(|_| "<redacted>"),
            )
            .field("ca_cert", &self.ca_cert)
            .field("verify", &self.verify)
            .finish()
    }
}

/// Transport kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Plain TCP
    Tcp,
    /// TLS over TCP
    Tls,
    /// Unix domain socket
    Unix,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tcp => write!(f, "tcp"),
            Self::Tls => write!(f, "tls"),
            Self::Unix => write!(f, "unix"),
        }
    }
}

/// Resolved transport configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportConfig {
    /// Plain TCP
    Tcp,
    /// TLS over TCP
    Tls(TlsSettings),
    /// Unix domain socket at the given path
    Unix(PathBuf),
}

impl TransportConfig {
    /// Transport kind
    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Tcp => TransportKind::Tcp,
            Self::Tls(_) => TransportKind::Tls,
            Self::Unix(_) => TransportKind::Unix,
        }
    }

    /// TLS settings, if this is a TLS transport
    pub fn tls(&self) -> Option<&TlsSettings> {
        match self {
            Self::Tls(settings) => Some(settings),
            _ => None,
        }
    }
}

/// Resolve the transport for `host` from raw options
///
/// # Errors
///
/// Returns [`Error::Config`] if:
/// - a TLS-prefixed option is present without `ssl = true`
/// - verification is requested without a CA certificate
/// - a key passphrase is given without a key file
pub fn resolve_transport(host: &str, raw: &RawTlsOptions) -> Result<TransportConfig> {
    let ssl = raw.ssl.unwrap_or(false);

    if !ssl {
        if raw.has_tls_prefixed() {
            return Err(Error::Config(
                "TLS options present without TLS enabled".into(),
            ));
        }
        if host.ends_with(DOMAIN_SOCKET_SUFFIX) {
            return Ok(TransportConfig::Unix(PathBuf::from(host)));
        }
        return Ok(TransportConfig::Tcp);
    }

    let verify = raw.ssl_verify.unwrap_or(raw.ssl_ca_cert.is_some());
    if verify && raw.ssl_ca_cert.is_none() {
        return Err(Error::Config(
            "ssl_verify requires ssl_ca_cert to be set".into(),
        ));
    }

    if raw.ssl_key_pass_phrase.is_some() && raw.ssl_key.is_none() {
        return Err(Error::Config(
            "ssl_key_pass_phrase requires ssl_key to be set".into(),
        ));
    }
    // A combined PEM may carry the key alongside the certificate
    let key = raw.ssl_key.clone().or_else(|| raw.ssl_cert.clone());

    Ok(TransportConfig::Tls(TlsSettings {
        cert: raw.ssl_cert.clone(),
        key,
        key_pass_phrase: raw.ssl_key_pass_phrase.clone(),
        ca_cert: raw.ssl_ca_cert.clone(),
        verify,
    }))
}
