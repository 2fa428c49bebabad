//! Transport abstraction and the TLS gateway transport

use super::conn::ConnectionConfig;
use super::tls::{parse_server_name, TlsConfig};
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;

/// How a read waits for data
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReadMode {
    /// Wait until exactly `max_bytes` have arrived
    #[default]
    Exact,
    /// Return as soon as any data (at most `max_bytes`) is available
    Partial,
}

/// A single authenticated session with the gateway.
///
/// Implementations own at most one socket. Errors are reported as-is; deciding
/// what is worth retrying is left to [`Connection`](super::Connection).
#[async_trait]
pub trait Transport: Send {
    /// Establish the session
    async fn connect(&mut self) -> Result<()>;

    /// Write all of `data`, returning the number of bytes written
    async fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Read up to `max_bytes`
    async fn read(&mut self, max_bytes: usize, mode: ReadMode) -> Result<Bytes>;

    /// Read up to `max_bytes`, giving up once the transport's read timeout elapses
    async fn read_with_timeout(&mut self, max_bytes: usize) -> Result<Bytes>;

    /// Tear down the session
    async fn close(&mut self) -> Result<()>;

    /// Whether a session is established
    fn is_connected(&self) -> bool;
}

/// Builds a fresh, unconnected transport for each session
pub trait Connector: Send + Sync {
    /// Transport produced by this connector
    type Transport: Transport;

    /// Build a transport for `config`
    fn transport(&self, config: &ConnectionConfig) -> Result<Self::Transport>;
}

/// Connector for TLS gateway sessions.
///
/// Certificates are loaded every time a transport is built, so a certificate
/// replaced on disk is picked up by the next reconnect.
#[derive(Debug, Clone, Copy, Default)]
pub struct GatewayConnector;

impl Connector for GatewayConnector {
    type Transport = TlsTransport;

    fn transport(&self, config: &ConnectionConfig) -> Result<TlsTransport> {
        let endpoint = &config.endpoint;
        let mut builder = TlsConfig::builder()
            .client_cert_path(endpoint.certificate())
            .client_key_path(endpoint.key_path());
        if let Some(ca_path) = &config.ca_cert_path {
            builder = builder.ca_cert_path(ca_path);
        }
        Ok(TlsTransport::new(config, builder.build()?))
    }
}

/// TLS-over-TCP transport to a push gateway
pub struct TlsTransport {
    host: String,
    port: u16,
    tls_config: TlsConfig,
    connect_timeout: Option<Duration>,
    read_timeout: Duration,
    stream: Option<TlsStream<TcpStream>>,
}

impl std::fmt::Debug for TlsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsTransport")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("connected", &self.stream.is_some())
            .finish()
    }
}

impl TlsTransport {
    /// Create an unconnected transport
    pub fn new(config: &ConnectionConfig, tls_config: TlsConfig) -> Self {
        Self {
            host: config.endpoint.gateway().to_string(),
            port: config.endpoint.port(),
            tls_config,
            connect_timeout: config.connect_timeout,
            read_timeout: config.read_timeout,
            stream: None,
        }
    }

    async fn connect_tcp(&self) -> Result<TcpStream> {
        let connect = TcpStream::connect((self.host.as_str(), self.port));
        let stream = match self.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, connect).await.map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect to {}:{} timed out", self.host, self.port),
                )
            })??,
            None => connect.await?,
        };
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    fn stream_mut(&mut self) -> Result<&mut TlsStream<TcpStream>> {
        self.stream.as_mut().ok_or(Error::NotConnected)
    }
}

#[async_trait]
impl Transport for TlsTransport {
    async fn connect(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let tcp_stream = self.connect_tcp().await?;

        // Parse server name for TLS handshake (SNI)
        let server_name = parse_server_name(&self.host)?;
        let server_name = rustls_pki_types::ServerName::try_from(server_name)
            .map_err(|_| Error::Config(format!("Invalid hostname for TLS: {}", self.host)))?;

        let tls_connector = tokio_rustls::TlsConnector::from(self.tls_config.client_config());
        let tls_stream = tls_connector
            .connect(server_name, tcp_stream)
            .await
            .map_err(Error::from_stream)?;

        tracing::debug!(host = %self.host, port = self.port, "TLS session established");
        self.stream = Some(tls_stream);
        Ok(())
    }

    async fn write(&mut self, data: &[u8]) -> Result<usize> {
        let stream = self.stream_mut()?;
        stream.write_all(data).await.map_err(Error::from_stream)?;
        stream.flush().await.map_err(Error::from_stream)?;
        Ok(data.len())
    }

    async fn read(&mut self, max_bytes: usize, mode: ReadMode) -> Result<Bytes> {
        let stream = self.stream_mut()?;
        let mut buf = vec![0u8; max_bytes];
        match mode {
            ReadMode::Exact => {
                stream.read_exact(&mut buf).await.map_err(Error::from_stream)?;
            }
            ReadMode::Partial => {
                let n = stream.read(&mut buf).await.map_err(Error::from_stream)?;
                if n == 0 && max_bytes > 0 {
                    return Err(Error::ConnectionClosed);
                }
                buf.truncate(n);
            }
        }
        Ok(Bytes::from(buf))
    }

    async fn read_with_timeout(&mut self, max_bytes: usize) -> Result<Bytes> {
        if self.stream.is_none() {
            return Err(Error::NotConnected);
        }
        let limit = self.read_timeout;
        match tokio::time::timeout(limit, self.read(max_bytes, ReadMode::Partial)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(limit)),
        }
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            stream.shutdown().await.map_err(Error::from_stream)?;
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}
