//! TLS configuration for secure node connections.
//!
//! Builds a rustls [`ClientConfig`] from resolved [`TlsSettings`]: trust roots
//! come from the configured CA bundle, or from the system store with the
//! bundled webpki roots as a fallback. A client certificate is presented when
//! one is configured.

use crate::client::TlsSettings;
use crate::{Error, Result};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use rustls_pemfile::Item;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// TLS configuration for node connections.
///
/// # Examples
///
/// ```ignore
/// use docstore_wire::connection::TlsConfig;
///
/// // Verify against a private CA
/// let tls = TlsConfig::builder()
///     .ca_cert_path("/etc/ssl/docstore-ca.pem")
///     .verify(true)
///     .build()?;
///
/// // Present a client certificate
/// let tls = TlsConfig::builder()
///     .ca_cert_path("/etc/ssl/docstore-ca.pem")
///     .client_cert_path("/etc/ssl/client.pem")
///     .client_key_path("/etc/ssl/client.key")
///     .build()?;
/// ```
#[derive(Clone)]
pub struct TlsConfig {
    ca_cert_path: Option<PathBuf>,
    client_cert_path: Option<PathBuf>,
    verify: bool,
    client_config: Arc<ClientConfig>,
}

impl TlsConfig {
    /// Create a new TLS configuration builder.
    pub fn builder() -> TlsConfigBuilder {
        TlsConfigBuilder::default()
    }

    /// Build from resolved settings.
    pub fn from_settings(settings: &TlsSettings) -> Result<Self> {
        let mut builder = Self::builder().verify(settings.verify);
        if let Some(ca) = &settings.ca_cert {
            builder = builder.ca_cert_path(ca);
        }
        if let Some(cert) = &settings.cert {
            builder = builder.client_cert_path(cert);
        }
        if let Some(key) = &settings.key {
            builder = builder.client_key_path(key);
        }
        if let Some(pass_phrase) = &settings.key_pass_phrase {
            builder = builder.key_pass_phrase(pass_phrase);
        }
        builder.build()
    }

    /// Get the rustls ClientConfig for this TLS configuration.
    pub fn client_config(&self) -> Arc<ClientConfig> {
        self.client_config.clone()
    }

    /// Whether the server certificate is verified.
    pub fn verify(&self) -> bool {
        self.verify
    }

    /// Whether a client certificate is presented.
    pub fn has_client_cert(&self) -> bool {
        self.client_cert_path.is_some()
    }
}

impl std::fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConfig")
            .field("ca_cert_path", &self.ca_cert_path)
            .field("client_cert_path", &self.client_cert_path)
            .field("verify", &self.verify)
            .field("client_config", &"<ClientConfig>")
            .finish()
    }
}

/// Builder for TLS configuration.
pub struct TlsConfigBuilder {
    ca_cert_path: Option<PathBuf>,
    client_cert_path: Option<PathBuf>,
    client_key_path: Option<PathBuf>,
    key_pass_phrase: Option<String>,
    verify: bool,
}

impl Default for TlsConfigBuilder {
    fn default() -> Self {
        Self {
            ca_cert_path: None,
            client_cert_path: None,
            client_key_path: None,
            key_pass_phrase: None,
            verify: true,
        }
    }
}

impl TlsConfigBuilder {
    /// Set the path to a CA certificate bundle (PEM format).
    ///
    /// If not set, system root certificates are used.
    pub fn ca_cert_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_cert_path = Some(path.into());
        self
    }

    /// Set the client certificate chain (PEM format).
    pub fn client_cert_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.client_cert_path = Some(path.into());
        self
    }

    /// Set the client private key (PEM format).
    ///
    /// Defaults to the certificate file when unset.
    pub fn client_key_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.client_key_path = Some(path.into());
        self
    }

    /// Set the client key passphrase.
    pub fn key_pass_phrase(mut self, pass_phrase: impl Into<String>) -> Self {
        self.key_pass_phrase = Some(pass_phrase.into());
        self
    }

    /// Enable or disable server certificate verification (default: enabled).
    ///
    /// **Disabling verification makes the connection vulnerable to
    /// man-in-the-middle attacks.** Only use it against test nodes with
    /// self-signed certificates.
    pub fn verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Build the TLS configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if:
    /// - a certificate or key file cannot be read or parsed
    /// - the private key is encrypted
    /// - no trust roots could be loaded
    pub fn build(self) -> Result<TlsConfig> {
        let builder = if self.verify {
            let root_store = match &self.ca_cert_path {
                Some(ca_path) => load_custom_ca(ca_path)?,
                None => load_system_roots(),
            };
            ClientConfig::builder().with_root_certificates(root_store)
        } else {
            tracing::warn!("TLS certificate verification disabled");
            ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoCertificateVerification::new()))
        };

        let client_config = match self.client_cert_path.as_deref() {
            Some(cert_path) => {
                let key_path = self.client_key_path.as_deref().unwrap_or(cert_path);
                let certs = load_certs(cert_path)?;
                let key = load_private_key(key_path, self.key_pass_phrase.is_some())?;
                builder.with_client_auth_cert(certs, key).map_err(|e| {
                    Error::Config(format!("invalid client certificate or key: {}", e))
                })?
            }
            None => builder.with_no_client_auth(),
        };

        Ok(TlsConfig {
            ca_cert_path: self.ca_cert_path,
            client_cert_path: self.client_cert_path,
            verify: self.verify,
            client_config: Arc::new(client_config),
        })
    }
}

fn read_pem(path: &Path, what: &str) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| {
        Error::Config(format!(
            "Failed to read {} file '{}': {}",
            what,
            path.display(),
            e
        ))
    })
}

/// Load trust roots from a PEM bundle.
fn load_custom_ca(ca_path: &Path) -> Result<RootCertStore> {
    let ca_cert_data = read_pem(ca_path, "CA certificate")?;
    let mut reader = std::io::Cursor::new(&ca_cert_data);
    let mut root_store = RootCertStore::empty();
    let mut found_certs = 0;

    loop {
        match rustls_pemfile::read_one(&mut reader) {
            Ok(Some(Item::X509Certificate(cert))) => {
                let _ = root_store.add_parsable_certificates(std::iter::once(cert));
                found_certs += 1;
            }
            Ok(Some(_)) => {}
            Ok(None) => break,
            Err(_) => {
                return Err(Error::Config(format!(
                    "Failed to parse CA certificate from '{}'",
                    ca_path.display()
                )));
            }
        }
    }

    if found_certs == 0 {
        return Err(Error::Config(format!(
            "No valid certificates found in '{}'",
            ca_path.display()
        )));
    }

    Ok(root_store)
}

/// System roots, falling back to the bundled webpki roots.
fn load_system_roots() -> RootCertStore {
    let result = rustls_native_certs::load_native_certs();
    let mut store = RootCertStore::empty();
    for cert in result.certs {
        let _ = store.add_parsable_certificates(std::iter::once(cert));
    }

    if store.is_empty() {
        if !result.errors.is_empty() {
            tracing::debug!(
                errors = result.errors.len(),
                "no system roots loaded, using bundled webpki roots"
            );
        }
        store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    }

    store
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let data = read_pem(path, "client certificate")?;
    let certs = rustls_pemfile::certs(&mut std::io::Cursor::new(&data))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|_| {
            Error::Config(format!(
                "Failed to parse client certificate from '{}'",
                path.display()
            ))
        })?;

    if certs.is_empty() {
        return Err(Error::Config(format!(
            "No certificates found in '{}'",
            path.display()
        )));
    }
    Ok(certs)
}

fn load_private_key(path: &Path, has_pass_phrase: bool) -> Result<PrivateKeyDer<'static>> {
    let data = read_pem(path, "client key")?;

    // rustls-pemfile skips encrypted PKCS#8 sections entirely
    if data
        .windows(b"ENCRYPTED".len())
        .any(|window| window == b"ENCRYPTED")
    {
        return Err(Error::Config(format!(
            "encrypted private key in '{}' is not supported; provide a decrypted key{}",
            path.display(),
            if has_pass_phrase {
                " (ssl_key_pass_phrase cannot be applied)"
            } else {
                ""
            }
        )));
    }

    rustls_pemfile::private_key(&mut std::io::Cursor::new(&data))
        .map_err(|_| {
            Error::Config(format!(
                "Failed to parse private key from '{}'",
                path.display()
            ))
        })?
        .ok_or_else(|| Error::Config(format!("No private key found in '{}'", path.display())))
}

/// Accepts any server certificate while still checking handshake signatures.
#[derive(Debug)]
struct NoCertificateVerification(Arc<CryptoProvider>);

impl NoCertificateVerification {
    fn new() -> Self {
        let provider = CryptoProvider::get_default()
            .cloned()
            .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()));
        Self(provider)
    }
}

impl ServerCertVerifier for NoCertificateVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

/// Parse server name from hostname for TLS SNI (Server Name Indication).
///
/// # Errors
///
/// Returns an error if the hostname is empty, too long, or contains
/// characters that cannot appear in a DNS name or IP address.
pub fn parse_server_name(hostname: &str) -> Result<String> {
    let hostname = hostname.trim_end_matches('.');

    if hostname.is_empty() || hostname.len() > 253 {
        return Err(Error::Config(format!(
            "Invalid hostname for TLS: '{}'",
            hostname
        )));
    }

    if !hostname
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == ':')
    {
        return Err(Error::Config(format!(
            "Invalid hostname for TLS: '{}'",
            hostname
        )));
    }

    Ok(hostname.to_string())
}
