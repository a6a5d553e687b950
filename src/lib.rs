//! docstore-wire: connection management core for a document database driver
//!
//! This crate owns a client's relationship with a single database node:
//!
//! * Transport resolution (plain TCP, TLS, Unix domain socket)
//! * Capability discovery handshake and wire version negotiation
//! * Read preference and write concern resolution
//! * A bounded socket pool with checkout/checkin
//! * A connection manager that serializes connect/reconnect/close
//!
//! Replica-set discovery, authentication mechanisms, and document-level
//! command execution live above this crate.
//!
//! ```no_run
//! # async fn example() -> docstore_wire::Result<()> {
//! use docstore_wire::client::{Client, ClientConfig, Intent};
//! use std::time::Duration;
//!
//! let config = ClientConfig::builder("localhost", 27017)
//!     .pool_size(8)
//!     .pool_timeout(Duration::from_secs(2))
//!     .build()?;
//!
//! let client = Client::new(config)?;
//! client.connect().await?;
//!
//! let socket = client.checkout(Intent::Write).await?;
//! client.checkin(socket);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod client;
pub mod connection;
pub mod error;
pub mod metrics;
pub mod protocol;

pub use client::{Client, ClientConfig, Intent};
pub use error::{Error, Result};
