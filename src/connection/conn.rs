//! Core connection type

use super::classify::{classify, Classification};
use super::endpoint::Endpoint;
use super::state::ConnectionState;
use super::transport::{Connector, GatewayConnector, ReadMode, Transport};
use crate::metrics::labels;
use crate::{Error, Result};
use bytes::Bytes;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::Instrument;

/// Default attempt budget per operation
pub const DEFAULT_RETRIES: usize = 3;

/// Default bound for [`Connection::read_with_timeout`]
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Connection configuration
///
/// Use `ConnectionConfig::builder()` to override the retry budget or timeouts.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Gateway address and client certificate
    pub endpoint: Endpoint,
    /// Total attempts per operation, first attempt included (default: 3)
    pub retries: usize,
    /// TCP connection timeout (default: none)
    pub connect_timeout: Option<Duration>,
    /// Wait bound for `read_with_timeout` (default: 1 second)
    pub read_timeout: Duration,
    /// Custom CA certificate for verifying the gateway (default: system roots)
    pub ca_cert_path: Option<PathBuf>,
}

impl ConnectionConfig {
    /// Create new configuration with defaults
    ///
    /// # Defaults
    ///
    /// - `retries`: 3
    /// - `connect_timeout`: None
    /// - `read_timeout`: 1 second
    /// - `ca_cert_path`: None
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            retries: DEFAULT_RETRIES,
            connect_timeout: None,
            read_timeout: DEFAULT_READ_TIMEOUT,
            ca_cert_path: None,
        }
    }

    /// Create a builder for advanced configuration
    ///
    /// # Examples
    ///
    /// ```
    /// use pushwire::connection::{ConnectionConfig, Endpoint};
    /// use std::time::Duration;
    ///
    /// let config = ConnectionConfig::builder(Endpoint::sandbox("/etc/push/cert.pem"))
    ///     .retries(5)
    ///     .connect_timeout(Duration::from_secs(10))
    ///     .build()?;
    /// assert_eq!(config.retries, 5);
    /// # Ok::<(), pushwire::Error>(())
    /// ```
    pub fn builder(endpoint: Endpoint) -> ConnectionConfigBuilder {
        ConnectionConfigBuilder {
            endpoint,
            retries: DEFAULT_RETRIES,
            connect_timeout: None,
            read_timeout: DEFAULT_READ_TIMEOUT,
            ca_cert_path: None,
        }
    }
}

/// Builder for creating `ConnectionConfig` with advanced options
#[derive(Debug, Clone)]
pub struct ConnectionConfigBuilder {
    endpoint: Endpoint,
    retries: usize,
    connect_timeout: Option<Duration>,
    read_timeout: Duration,
    ca_cert_path: Option<PathBuf>,
}

impl ConnectionConfigBuilder {
    /// Set the attempt budget per operation
    ///
    /// Counts attempts, not extra retries: `1` means a single try.
    pub fn retries(mut self, retries: usize) -> Self {
        self.retries = retries;
        self
    }

    /// Set TCP connection timeout
    ///
    /// Default: None (OS default)
    pub fn connect_timeout(mut self, duration: Duration) -> Self {
        self.connect_timeout = Some(duration);
        self
    }

    /// Set the wait bound for `read_with_timeout`
    ///
    /// Default: 1 second
    pub fn read_timeout(mut self, duration: Duration) -> Self {
        self.read_timeout = duration;
        self
    }

    /// Verify the gateway against a custom CA certificate (PEM)
    pub fn ca_cert_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_cert_path = Some(path.into());
        self
    }

    /// Build the configuration
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `retries` is zero.
    pub fn build(self) -> Result<ConnectionConfig> {
        if self.retries == 0 {
            return Err(Error::Config("retries must be at least 1".into()));
        }
        Ok(ConnectionConfig {
            endpoint: self.endpoint,
            retries: self.retries,
            connect_timeout: self.connect_timeout,
            read_timeout: self.read_timeout,
            ca_cert_path: self.ca_cert_path,
        })
    }
}

/// A single request run under the retry loop
enum Request<'a> {
    Connect,
    Write(&'a [u8]),
    Read { max_bytes: usize, mode: ReadMode },
    ReadWithTimeout { max_bytes: usize },
}

impl Request<'_> {
    fn name(&self) -> &'static str {
        match self {
            Request::Connect => labels::OP_CONNECT,
            Request::Write(_) => labels::OP_WRITE,
            Request::Read { .. } => labels::OP_READ,
            Request::ReadWithTimeout { .. } => labels::OP_READ_WITH_TIMEOUT,
        }
    }

    /// Whether the request establishes a session when none is live.
    /// Also decides whether it is retried: retrying without reconnecting is pointless.
    fn connects(&self) -> bool {
        !matches!(self, Request::ReadWithTimeout { .. })
    }
}

enum Reply {
    Connected,
    Written(usize),
    Data(Bytes),
}

/// Transport slot guarded by the connection mutex
struct Session<T> {
    transport: Option<T>,
    state: ConnectionState,
    /// Set while an operation holds the session; still set on entry means the
    /// previous operation's future was dropped mid-attempt.
    in_flight: bool,
}

impl<T: Transport> Session<T> {
    fn is_connected(&self) -> bool {
        self.transport.as_ref().is_some_and(|t| t.is_connected())
    }

    /// Drop whatever a cancelled operation left behind.
    ///
    /// A transport abandoned half-way through a handshake or a write is never reused.
    fn recover(&mut self) {
        if !self.in_flight {
            return;
        }
        self.in_flight = false;
        if self.transport.take().is_some() {
            crate::metrics::counters::transport_discarded();
        }
        tracing::debug!(state = %self.state, "discarding session left by a cancelled operation");
        self.state.reset();
    }

    /// Close and clear the transport after a transient failure.
    ///
    /// The triggering error is what the caller sees, so close errors are only logged.
    async fn discard(&mut self) -> Result<()> {
        self.state.transition(ConnectionState::Closing)?;
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.close().await {
                tracing::debug!(error = %e, "error closing failed transport");
            }
            crate::metrics::counters::transport_discarded();
        }
        Ok(())
    }

    /// Drop the transport after a fatal failure, without a close round-trip.
    fn abandon(&mut self) -> Result<()> {
        self.transport = None;
        self.state.transition(ConnectionState::Failed)
    }

    /// Settle the state after an unclassified failure.
    fn settle(&mut self) -> Result<()> {
        if self.state == ConnectionState::Connecting {
            self.state.transition(ConnectionState::Idle)?;
        }
        Ok(())
    }
}

/// Self-healing connection to a push gateway
///
/// Wraps one [`Transport`] at a time. Sessions are established lazily, transient
/// failures are hidden behind a bounded number of reconnect-and-retry attempts, and
/// an expired client certificate fails immediately with
/// [`Error::CertificateExpired`].
///
/// All operations take `&self`; a mutex serializes them, so a `Connection` can be
/// shared between tasks. Operations are cancel-safe in the sense that dropping one
/// mid-flight (for example under `tokio::time::timeout`) never wedges the
/// connection: the next operation discards the interrupted session and starts over.
///
/// # Examples
///
/// ```no_run
/// # async fn example() -> pushwire::Result<()> {
/// use pushwire::connection::{Connection, ConnectionConfig, Endpoint};
///
/// let config = ConnectionConfig::new(Endpoint::production("/etc/push/cert.pem"));
/// let conn = Connection::new(config);
///
/// conn.write(b"notification frame").await?;
/// conn.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct Connection<C: Connector = GatewayConnector> {
    config: ConnectionConfig,
    connector: C,
    session: Mutex<Session<C::Transport>>,
}

impl Connection<GatewayConnector> {
    /// Create a connection to a TLS push gateway
    ///
    /// Nothing is opened until the first operation.
    pub fn new(config: ConnectionConfig) -> Self {
        Self::with_connector(config, GatewayConnector)
    }
}

impl<C: Connector> Connection<C> {
    /// Create a connection whose transports are built by `connector`
    pub fn with_connector(config: ConnectionConfig, connector: C) -> Self {
        Self {
            config,
            connector,
            session: Mutex::new(Session {
                transport: None,
                state: ConnectionState::Idle,
                in_flight: false,
            }),
        }
    }

    /// Connection configuration
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Attempt budget per operation
    pub fn retries(&self) -> usize {
        self.config.retries
    }

    /// Get current connection state
    pub async fn state(&self) -> ConnectionState {
        self.session.lock().await.state
    }

    /// Whether a transport exists and reports a live session
    pub async fn is_connected(&self) -> bool {
        let session = self.session.lock().await;
        // A session left by a cancelled operation is discarded on next use
        !session.in_flight && session.is_connected()
    }

    /// Establish a session unless one is already live
    pub async fn connect(&self) -> Result<()> {
        self.execute(Request::Connect)
            .instrument(tracing::debug_span!("connect", endpoint = %self.config.endpoint))
            .await
            .map(|_| ())
    }

    /// Write `data`, connecting first if needed
    ///
    /// Returns the number of bytes written.
    pub async fn write(&self, data: &[u8]) -> Result<usize> {
        let reply = self
            .execute(Request::Write(data))
            .instrument(tracing::debug_span!(
                "write",
                endpoint = %self.config.endpoint,
                bytes = data.len()
            ))
            .await?;
        match reply {
            Reply::Written(n) => Ok(n),
            _ => Err(unexpected_reply("bytes written")),
        }
    }

    /// Read up to `max_bytes`, connecting first if needed
    pub async fn read(&self, max_bytes: usize, mode: ReadMode) -> Result<Bytes> {
        let reply = self
            .execute(Request::Read { max_bytes, mode })
            .instrument(tracing::debug_span!(
                "read",
                endpoint = %self.config.endpoint,
                max_bytes = max_bytes
            ))
            .await?;
        into_data(reply)
    }

    /// Read up to `max_bytes`, waiting at most the configured read timeout
    ///
    /// Never connects: without a live session this fails with
    /// [`Error::NotConnected`] (or whatever the transport reports). A transient
    /// failure closes the session and is returned without retrying.
    pub async fn read_with_timeout(&self, max_bytes: usize) -> Result<Bytes> {
        let reply = self
            .execute(Request::ReadWithTimeout { max_bytes })
            .instrument(tracing::debug_span!(
                "read_with_timeout",
                endpoint = %self.config.endpoint,
                max_bytes = max_bytes
            ))
            .await?;
        into_data(reply)
    }

    /// Close the session, if any
    ///
    /// Safe to call at any time; closing an already closed connection does nothing.
    /// A session left behind by a cancelled operation is dropped without a close
    /// round-trip.
    pub async fn close(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        session.recover();
        let Some(mut transport) = session.transport.take() else {
            if session.state == ConnectionState::Failed {
                session.state.transition(ConnectionState::Idle)?;
            }
            return Ok(());
        };

        session.state.transition(ConnectionState::Closing)?;
        session.in_flight = true;
        let result = transport.close().await;
        session.in_flight = false;
        session.state.transition(ConnectionState::Idle)?;
        tracing::debug!(endpoint = %self.config.endpoint, "connection closed");
        result
    }

    /// Make sure a live session exists, building and connecting a transport if not
    async fn ensure_connected(&self, session: &mut Session<C::Transport>) -> Result<()> {
        if session.is_connected() {
            return Ok(());
        }

        session.state.transition(ConnectionState::Connecting)?;
        if session.transport.is_none() {
            session.transport = Some(self.connector.transport(&self.config)?);
        }
        let transport = session.transport.as_mut().ok_or(Error::NotConnected)?;

        if !transport.is_connected() {
            crate::metrics::counters::connect_attempted();
            tracing::debug!(endpoint = %self.config.endpoint, "connecting");
            if let Err(e) = transport.connect().await {
                crate::metrics::counters::connect_failed(classify(&e).as_str());
                return Err(e);
            }
            tracing::info!(endpoint = %self.config.endpoint, "connected to gateway");
        }

        session.state.transition(ConnectionState::Active)
    }

    /// One attempt: guard step, then the data operation
    async fn attempt(
        &self,
        session: &mut Session<C::Transport>,
        request: &Request<'_>,
    ) -> Result<Reply> {
        if request.connects() {
            self.ensure_connected(session).await?;
        }
        let transport = session.transport.as_mut().ok_or(Error::NotConnected)?;

        match *request {
            Request::Connect => Ok(Reply::Connected),
            Request::Write(data) => transport.write(data).await.map(Reply::Written),
            Request::Read { max_bytes, mode } => {
                transport.read(max_bytes, mode).await.map(Reply::Data)
            }
            Request::ReadWithTimeout { max_bytes } => {
                transport.read_with_timeout(max_bytes).await.map(Reply::Data)
            }
        }
    }

    /// Run `request` under the retry policy
    async fn execute(&self, request: Request<'_>) -> Result<Reply> {
        let operation = request.name();
        let started = Instant::now();
        let mut session = self.session.lock().await;
        session.recover();
        session.in_flight = true;
        let mut attempt = 1;

        let result = loop {
            let err = match self.attempt(&mut session, &request).await {
                Ok(reply) => break Ok(reply),
                Err(e) => e,
            };

            match classify(&err) {
                Classification::Fatal => {
                    session.abandon()?;
                    crate::metrics::counters::certificate_expired();
                    crate::metrics::counters::operation_failed(
                        operation,
                        Classification::Fatal.as_str(),
                    );
                    tracing::error!(
                        endpoint = %self.config.endpoint,
                        error = %err,
                        "client certificate rejected, not retrying"
                    );
                    break Err(into_certificate_expired(err));
                }
                Classification::Unclassified => {
                    session.settle()?;
                    crate::metrics::counters::operation_failed(
                        operation,
                        Classification::Unclassified.as_str(),
                    );
                    break Err(err);
                }
                Classification::Transient => {
                    session.discard().await?;

                    if attempt >= self.config.retries || !request.connects() {
                        session.state.transition(ConnectionState::Failed)?;
                        crate::metrics::counters::operation_failed(
                            operation,
                            Classification::Transient.as_str(),
                        );
                        tracing::warn!(
                            endpoint = %self.config.endpoint,
                            attempts = attempt,
                            error = %err,
                            "giving up"
                        );
                        break Err(err);
                    }

                    crate::metrics::counters::operation_retried(operation, err.category());
                    tracing::warn!(
                        endpoint = %self.config.endpoint,
                        attempt = attempt,
                        retries = self.config.retries,
                        error = %err,
                        "transient failure, reconnecting"
                    );
                    attempt += 1;
                }
            }
        };
        session.in_flight = false;

        let status = if result.is_ok() {
            labels::STATUS_OK
        } else {
            labels::STATUS_ERROR
        };
        crate::metrics::counters::operation_completed(operation, status);
        crate::metrics::histograms::operation_duration(
            operation,
            started.elapsed().as_millis() as u64,
        );
        crate::metrics::histograms::operation_attempts(operation, attempt);

        result
    }
}

impl<C: Connector + std::fmt::Debug> std::fmt::Debug for Connection<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("config", &self.config)
            .field("connector", &self.connector)
            .finish_non_exhaustive()
    }
}

/// Tag a fatal TLS failure as the dedicated certificate error
fn into_certificate_expired(err: Error) -> Error {
    match err {
        Error::Tls(msg) => Error::CertificateExpired(msg),
        Error::Io(io_err) => Error::CertificateExpired(io_err.to_string()),
        other => other,
    }
}

fn into_data(reply: Reply) -> Result<Bytes> {
    match reply {
        Reply::Data(data) => Ok(data),
        _ => Err(unexpected_reply("data")),
    }
}

fn unexpected_reply(expected: &str) -> Error {
    Error::InvalidState {
        expected: expected.to_string(),
        actual: "mismatched transport reply".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> Endpoint {
        Endpoint::new("push.example.com", 443, "/path/to/cert.pem")
    }

    #[test]
    fn test_connection_config_defaults() {
        let config = ConnectionConfig::new(endpoint());

        assert_eq!(config.retries, 3);
        assert!(config.connect_timeout.is_none());
        assert_eq!(config.read_timeout, Duration::from_secs(1));
        assert!(config.ca_cert_path.is_none());
    }

    #[test]
    fn test_connection_config_builder_basic() {
        let config = ConnectionConfig::builder(endpoint()).build().unwrap();

        assert_eq!(config.endpoint, endpoint());
        assert_eq!(config.retries, DEFAULT_RETRIES);
        assert_eq!(config.read_timeout, DEFAULT_READ_TIMEOUT);
    }

    #[test]
    fn test_connection_config_builder_fluent() {
        let config = ConnectionConfig::builder(endpoint())
            .retries(2)
            .connect_timeout(Duration::from_secs(5))
            .read_timeout(Duration::from_millis(250))
            .ca_cert_path("/path/to/ca.pem")
            .build()
            .unwrap();

        assert_eq!(config.retries, 2);
        assert_eq!(config.connect_timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.read_timeout, Duration::from_millis(250));
        assert_eq!(config.ca_cert_path, Some(PathBuf::from("/path/to/ca.pem")));
    }

    #[test]
    fn test_connection_config_builder_rejects_zero_retries() {
        let result = ConnectionConfig::builder(endpoint()).retries(0).build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_request_connects() {
        assert!(Request::Connect.connects());
        assert!(Request::Write(b"abc").connects());
        assert!(Request::Read {
            max_bytes: 6,
            mode: ReadMode::Exact
        }
        .connects());
        assert!(!Request::ReadWithTimeout { max_bytes: 6 }.connects());
    }

    #[test]
    fn test_into_certificate_expired() {
        let err = into_certificate_expired(Error::Tls("certificate expired".into()));
        assert!(err.is_certificate_expired());

        let err = into_certificate_expired(Error::CertificateExpired("x".into()));
        assert!(err.is_certificate_expired());
    }

    #[tokio::test]
    async fn test_new_connection_is_idle() {
        let conn = Connection::new(ConnectionConfig::new(endpoint()));
        assert_eq!(conn.state().await, ConnectionState::Idle);
        assert!(!conn.is_connected().await);
        assert_eq!(conn.retries(), 3);
    }

    #[tokio::test]
    async fn test_missing_certificate_is_not_retried() {
        let conn = Connection::new(ConnectionConfig::new(Endpoint::new(
            "localhost",
            9,
            "/nonexistent/pushwire/cert.pem",
        )));

        let err = conn.write(b"abc").await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(conn.state().await, ConnectionState::Idle);
    }

    #[tokio::test]
    async fn test_read_with_timeout_before_connect() {
        let conn = Connection::new(ConnectionConfig::new(endpoint()));
        let err = conn.read_with_timeout(6).await.unwrap_err();
        assert!(matches!(err, Error::NotConnected));
        assert_eq!(conn.state().await, ConnectionState::Idle);
    }

    #[tokio::test]
    async fn test_close_never_connected() {
        let conn = Connection::new(ConnectionConfig::new(endpoint()));
        assert!(conn.close().await.is_ok());
        assert!(conn.close().await.is_ok());
        assert_eq!(conn.state().await, ConnectionState::Idle);
    }

    // Verify that operation futures are Send (compile-time check)
    #[allow(dead_code)]
    fn _assert_send() {
        fn require_send<T: Send>(_: T) {}
        let conn = Connection::new(ConnectionConfig::new(endpoint()));
        require_send(conn.write(b"abc"));
        require_send(conn.read(6, ReadMode::Exact));
        require_send(conn.close());
    }
}
