//! pushwire: a self-healing TLS connection to push notification gateways
//!
//! A [`Connection`] owns at most one certificate-authenticated TLS session with a
//! gateway. Sessions are opened on first use; socket and TLS failures are hidden
//! behind a bounded number of immediate reconnect-and-retry attempts, while an
//! expired client certificate surfaces at once as [`Error::CertificateExpired`].
//!
//! ```no_run
//! # async fn example() -> pushwire::Result<()> {
//! use pushwire::{Connection, ConnectionConfig, Endpoint};
//!
//! let config = ConnectionConfig::builder(Endpoint::sandbox("/etc/push/cert.pem"))
//!     .retries(3)
//!     .build()?;
//! let conn = Connection::new(config);
//!
//! match conn.write(b"notification frame").await {
//!     Ok(_) => {}
//!     Err(e) if e.is_certificate_expired() => {
//!         // provision a new certificate
//!     }
//!     Err(e) => return Err(e),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Message encoding is left to the caller; bytes are written as given.

#![warn(missing_docs)]

pub mod connection;
pub mod error;
pub mod metrics;

pub use connection::{Connection, ConnectionConfig, Endpoint, ReadMode};
pub use error::{Error, Result};
