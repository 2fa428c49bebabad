//! Connection management
//!
//! This module handles:
//! * Transport abstraction and the TLS gateway transport
//! * Connection lifecycle (lazy connect, close-and-clear)
//! * Failure classification and bounded reconnect-and-retry
//! * State machine enforcement

mod classify;
mod conn;
mod endpoint;
mod state;
mod tls;
mod transport;

pub use classify::{classify, Classification};
pub use conn::{
    Connection, ConnectionConfig, ConnectionConfigBuilder, DEFAULT_READ_TIMEOUT, DEFAULT_RETRIES,
};
pub use endpoint::{Endpoint, DEFAULT_PORT, PRODUCTION_GATEWAY, SANDBOX_GATEWAY};
pub use state::ConnectionState;
pub use tls::{parse_server_name, TlsConfig, TlsConfigBuilder};
pub use transport::{Connector, GatewayConnector, ReadMode, TlsTransport, Transport};
