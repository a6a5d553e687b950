//! Client configuration
//!
//! [`ClientConfig`] is immutable once built. It can be assembled with the
//! fluent [`ClientConfigBuilder`] or from raw string key/value pairs with
//! [`ClientConfig::from_options`], which validates against the enumerated
//! [`OptionKey`] set and reports unknown keys as warnings.

use super::preferences::{
    parse_tag_sets, resolve_read_preference, resolve_write_concern, Acknowledgement, ReadMode,
    ReadPreference, TagSet, WriteConcern, WriteConcernOptions,
};
use super::socket_config::{resolve_transport, RawTlsOptions, TransportConfig};
use crate::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Default node port
pub const DEFAULT_PORT: u16 = 27017;

/// Default number of pooled sockets
pub const DEFAULT_POOL_SIZE: usize = 1;

/// Default time a checkout waits for a socket
pub const DEFAULT_POOL_TIMEOUT: Duration = Duration::from_secs(5);

/// Default socket establishment timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Credential applied to every pooled socket
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    /// Database the user is defined in
    pub source: String,
    /// Username
    pub username: String,
    /// Password (optional for external mechanisms)
    pub password: Option<String>,
    /// Mechanism name understood by the credential provider
    pub mechanism: Option<String>,
}

impl Credential {
    /// Create a password credential
    pub fn new(
        source: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            username: username.into(),
            password: Some(password.into()),
            mechanism: None,
        }
    }

    /// Set the mechanism
    pub fn mechanism(mut self, mechanism: impl Into<String>) -> Self {
        self.mechanism = Some(mechanism.into());
        self
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("source", &self.source)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("mechanism", &self.mechanism)
            .finish()
    }
}

/// Recognized configuration keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionKey {
    /// Enable TLS
    Ssl,
    /// Client certificate path
    SslCert,
    /// Client key path
    SslKey,
    /// Client key passphrase
    SslKeyPassPhrase,
    /// CA certificate path
    SslCaCert,
    /// Verify the server certificate
    SslVerify,
    /// Number of pooled sockets
    PoolSize,
    /// Checkout wait timeout (seconds)
    PoolTimeout,
    /// Per-operation read timeout (seconds)
    OpTimeout,
    /// Socket establishment timeout (seconds)
    ConnectTimeout,
    /// Read mode
    Read,
    /// Tag sets
    TagSets,
    /// Acceptable latency (milliseconds)
    AcceptableLatency,
    /// Legacy secondary-acceptable flag
    SlaveOk,
    /// Write acknowledgement width
    W,
    /// Journal flag
    J,
    /// Fsync flag
    Fsync,
    /// Write acknowledgement timeout (milliseconds)
    WTimeout,
    /// Connect during construction
    Connect,
    /// Application name sent in the handshake
    AppName,
}

impl OptionKey {
    /// Every recognized key
    pub const ALL: [OptionKey; 20] = [
        Self::Ssl,
        Self::SslCert,
        Self::SslKey,
        Self::SslKeyPassPhrase,
        Self::SslCaCert,
        Self::SslVerify,
        Self::PoolSize,
        Self::PoolTimeout,
        Self::OpTimeout,
        Self::ConnectTimeout,
        Self::Read,
        Self::TagSets,
        Self::AcceptableLatency,
        Self::SlaveOk,
        Self::W,
        Self::J,
        Self::Fsync,
        Self::WTimeout,
        Self::Connect,
        Self::AppName,
    ];

    /// Key spelling
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ssl => "ssl",
            Self::SslCert => "ssl_cert",
            Self::SslKey => "ssl_key",
            Self::SslKeyPassPhrase => "ssl_key_pass_phrase",
            Self::SslCaCert => "ssl_ca_cert",
            Self::SslVerify => "ssl_verify",
            Self::PoolSize => "pool_size",
            Self::PoolTimeout => "pool_timeout",
            Self::OpTimeout => "op_timeout",
            Self::ConnectTimeout => "connect_timeout",
            Self::Read => "read",
            Self::TagSets => "tag_sets",
            Self::AcceptableLatency => "acceptable_latency",
            Self::SlaveOk => "slave_ok",
            Self::W => "w",
            Self::J => "j",
            Self::Fsync => "fsync",
            Self::WTimeout => "wtimeout",
            Self::Connect => "connect",
            Self::AppName => "app_name",
        }
    }
}

impl std::str::FromStr for OptionKey {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|key| key.as_str() == s)
            .ok_or(())
    }
}

impl std::fmt::Display for OptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    host: String,
    port: u16,
    transport: TransportConfig,
    pool_size: usize,
    pool_timeout: Duration,
    op_timeout: Option<Duration>,
    connect_timeout: Duration,
    read_preference: ReadPreference,
    write_concern: WriteConcern,
    credentials: Vec<Credential>,
    auto_connect: bool,
    app_name: Option<String>,
}

impl ClientConfig {
    /// Create a builder for `host:port`
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let config = ClientConfig::builder("db.example.com", 27017)
    ///     .pool_size(10)
    ///     .op_timeout(Duration::from_secs(5))
    ///     .build()?;
    /// ```
    pub fn builder(host: impl Into<String>, port: u16) -> ClientConfigBuilder {
        ClientConfigBuilder {
            host: host.into(),
            port,
            tls: RawTlsOptions::default(),
            pool_size: DEFAULT_POOL_SIZE,
            pool_timeout: DEFAULT_POOL_TIMEOUT,
            op_timeout: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_mode: None,
            tag_sets: None,
            acceptable_latency_ms: None,
            slave_ok: false,
            write_concern: WriteConcernOptions::default(),
            credentials: Vec::new(),
            auto_connect: true,
            app_name: None,
        }
    }

    /// Build a configuration from raw string options
    ///
    /// Returns the configuration and one warning per unrecognized key.
    /// Recognized keys with invalid values are configuration errors.
    pub fn from_options<I, K, V>(
        host: impl Into<String>,
        port: u16,
        options: I,
    ) -> Result<(Self, Vec<String>)>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut builder = Self::builder(host, port);
        let mut warnings = Vec::new();

        for (key, value) in options {
            let (key, value) = (key.as_ref(), value.as_ref());
            match key.parse::<OptionKey>() {
                Ok(known) => builder = builder.apply(known, value)?,
                Err(()) => {
                    tracing::warn!(option = %key, "ignoring unrecognized option");
                    warnings.push(format!("unrecognized option '{}' ignored", key));
                }
            }
        }

        Ok((builder.build()?, warnings))
    }

    /// Node host (or socket path)
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Node port
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Resolved transport
    pub fn transport(&self) -> &TransportConfig {
        &self.transport
    }

    /// Maximum number of pooled sockets
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Checkout wait timeout
    pub fn pool_timeout(&self) -> Duration {
        self.pool_timeout
    }

    /// Per-operation read timeout
    pub fn op_timeout(&self) -> Option<Duration> {
        self.op_timeout
    }

    /// Socket establishment timeout
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Default read preference
    pub fn read_preference(&self) -> &ReadPreference {
        &self.read_preference
    }

    /// Default write concern
    pub fn write_concern(&self) -> &WriteConcern {
        &self.write_concern
    }

    /// Credentials supplied at construction
    pub fn credentials(&self) -> &[Credential] {
        &self.credentials
    }

    /// Whether to connect during construction
    pub fn auto_connect(&self) -> bool {
        self.auto_connect
    }

    /// Application name sent in the handshake
    pub fn app_name(&self) -> Option<&str> {
        self.app_name.as_deref()
    }
}

/// Builder for [`ClientConfig`]
#[derive(Debug, Clone)]
pub struct ClientConfigBuilder {
    host: String,
    port: u16,
    tls: RawTlsOptions,
    pool_size: usize,
    pool_timeout: Duration,
    op_timeout: Option<Duration>,
    connect_timeout: Duration,
    read_mode: Option<ReadMode>,
    tag_sets: Option<Vec<TagSet>>,
    acceptable_latency_ms: Option<u64>,
    slave_ok: bool,
    write_concern: WriteConcernOptions,
    credentials: Vec<Credential>,
    auto_connect: bool,
    app_name: Option<String>,
}

impl ClientConfigBuilder {
    /// Enable or disable TLS
    pub fn ssl(mut self, enabled: bool) -> Self {
        self.tls.ssl = Some(enabled);
        self
    }

    /// Client certificate (PEM)
    pub fn ssl_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.tls.ssl_cert = Some(path.into());
        self
    }

    /// Client private key (PEM)
    pub fn ssl_key(mut self, path: impl Into<PathBuf>) -> Self {
        self.tls.ssl_key = Some(path.into());
        self
    }

    /// Client private key passphrase
    pub fn ssl_key_pass_phrase(mut self, pass_phrase: impl Into<String>) -> Self {
        self.tls.ssl_key_pass_phrase = Some(pass_phrase.into());
        self
    }

    /// CA certificate bundle (PEM)
    pub fn ssl_ca_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.tls.ssl_ca_cert = Some(path.into());
        self
    }

    /// Verify the server certificate
    pub fn ssl_verify(mut self, verify: bool) -> Self {
        self.tls.ssl_verify = Some(verify);
        self
    }

    /// Maximum number of pooled sockets
    ///
    /// Default: 1
    pub fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    /// Checkout wait timeout
    ///
    /// Default: 5 seconds
    pub fn pool_timeout(mut self, timeout: Duration) -> Self {
        self.pool_timeout = timeout;
        self
    }

    /// Per-operation read timeout
    ///
    /// Default: None (unbounded)
    pub fn op_timeout(mut self, timeout: Duration) -> Self {
        self.op_timeout = Some(timeout);
        self
    }

    /// Socket establishment timeout
    ///
    /// Default: 30 seconds
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Read mode
    pub fn read_mode(mut self, mode: ReadMode) -> Self {
        self.read_mode = Some(mode);
        self
    }

    /// Tag set filters
    pub fn tag_sets(mut self, tag_sets: Vec<TagSet>) -> Self {
        self.tag_sets = Some(tag_sets);
        self
    }

    /// Acceptable latency window in milliseconds
    pub fn acceptable_latency_ms(mut self, latency: u64) -> Self {
        self.acceptable_latency_ms = Some(latency);
        self
    }

    /// Legacy secondary-acceptable flag
    pub fn slave_ok(mut self, slave_ok: bool) -> Self {
        self.slave_ok = slave_ok;
        self
    }

    /// Write acknowledgement width
    pub fn w(mut self, w: Acknowledgement) -> Self {
        self.write_concern.w = Some(w);
        self
    }

    /// Journal flag
    pub fn journal(mut self, j: bool) -> Self {
        self.write_concern.j = Some(j);
        self
    }

    /// Fsync flag
    pub fn fsync(mut self, fsync: bool) -> Self {
        self.write_concern.fsync = Some(fsync);
        self
    }

    /// Write acknowledgement timeout
    pub fn wtimeout(mut self, timeout: Duration) -> Self {
        self.write_concern.wtimeout = Some(timeout);
        self
    }

    /// Add a credential applied to every pooled socket
    pub fn credential(mut self, credential: Credential) -> Self {
        self.credentials.push(credential);
        self
    }

    /// Connect during construction (default: true)
    pub fn auto_connect(mut self, connect: bool) -> Self {
        self.auto_connect = connect;
        self
    }

    /// Application name sent in the handshake
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = Some(name.into());
        self
    }

    fn apply(self, key: OptionKey, value: &str) -> Result<Self> {
        Ok(match key {
            OptionKey::Ssl => self.ssl(parse_bool(key, value)?),
            OptionKey::SslCert => self.ssl_cert(value),
            OptionKey::SslKey => self.ssl_key(value),
            OptionKey::SslKeyPassPhrase => self.ssl_key_pass_phrase(value),
            OptionKey::SslCaCert => self.ssl_ca_cert(value),
            OptionKey::SslVerify => self.ssl_verify(parse_bool(key, value)?),
            OptionKey::PoolSize => self.pool_size(parse_number(key, value)?),
            OptionKey::PoolTimeout => self.pool_timeout(parse_seconds(key, value)?),
            OptionKey::OpTimeout => self.op_timeout(parse_seconds(key, value)?),
            OptionKey::ConnectTimeout => self.connect_timeout(parse_seconds(key, value)?),
            OptionKey::Read => self.read_mode(value.parse()?),
            OptionKey::TagSets => self.tag_sets(parse_tag_sets(value)?),
            OptionKey::AcceptableLatency => self.acceptable_latency_ms(parse_number(key, value)?),
            OptionKey::SlaveOk => self.slave_ok(parse_bool(key, value)?),
            OptionKey::W => self.w(value.parse()?),
            OptionKey::J => self.journal(parse_bool(key, value)?),
            OptionKey::Fsync => self.fsync(parse_bool(key, value)?),
            OptionKey::WTimeout => {
                self.wtimeout(Duration::from_millis(parse_number(key, value)?))
            }
            OptionKey::Connect => self.auto_connect(parse_bool(key, value)?),
            OptionKey::AppName => self.app_name(value),
        })
    }

    /// Validate and build the configuration
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for contradictory TLS options, an empty host,
    /// or a zero pool size.
    pub fn build(self) -> Result<ClientConfig> {
        if self.host.is_empty() {
            return Err(Error::Config("host must not be empty".into()));
        }
        if self.pool_size == 0 {
            return Err(Error::Config("pool_size must be at least 1".into()));
        }
        if self.pool_size > tokio::sync::Semaphore::MAX_PERMITS {
            return Err(Error::Config(format!(
                "pool_size must be at most {}",
                tokio::sync::Semaphore::MAX_PERMITS
            )));
        }

        let transport = resolve_transport(&self.host, &self.tls)?;
        let read_preference = resolve_read_preference(
            self.read_mode,
            self.tag_sets,
            self.acceptable_latency_ms,
            self.slave_ok,
        );
        let write_concern = resolve_write_concern(&self.write_concern, &WriteConcern::default());

        Ok(ClientConfig {
            host: self.host,
            port: self.port,
            transport,
            pool_size: self.pool_size,
            pool_timeout: self.pool_timeout,
            op_timeout: self.op_timeout,
            connect_timeout: self.connect_timeout,
            read_preference,
            write_concern,
            credentials: self.credentials,
            auto_connect: self.auto_connect,
            app_name: self.app_name,
        })
    }
}

fn parse_bool(key: OptionKey, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(Error::Config(format!(
            "invalid boolean '{}' for option '{}'",
            value, key
        ))),
    }
}

fn parse_number<T: std::str::FromStr>(key: OptionKey, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        Error::Config(format!("invalid number '{}' for option '{}'", value, key))
    })
}

fn parse_seconds(key: OptionKey, value: &str) -> Result<Duration> {
    let secs: f64 = parse_number(key, value)?;
    Duration::try_from_secs_f64(secs).map_err(|_| {
        Error::Config(format!("invalid duration '{}' for option '{}'", value, key))
    })
}
