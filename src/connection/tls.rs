//! TLS configuration for certificate-authenticated gateway sessions.
//!
//! The gateway identifies the sender by its client certificate, so every session is
//! mutually authenticated: the client certificate chain and private key are loaded from
//! PEM files, and the gateway's certificate is verified against system roots (or a
//! custom CA file).

use crate::{Error, Result};
use rustls::ClientConfig;
use rustls::RootCertStore;
use rustls_pemfile::Item;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// TLS configuration for gateway connections.
///
/// # Examples
///
/// ```ignore
/// use pushwire::connection::TlsConfig;
///
/// // Certificate and key bundled in one PEM file
/// let tls = TlsConfig::builder()
///     .client_cert_path("/etc/push/cert.pem")
///     .build()?;
///
/// // Separate key file and a custom CA
/// let tls = TlsConfig::builder()
///     .client_cert_path("/etc/push/cert.pem")
///     .client_key_path("/etc/push/key.pem")
///     .ca_cert_path("/etc/push/ca.pem")
///     .build()?;
/// ```
#[derive(Clone)]
pub struct TlsConfig {
    /// Path to the client certificate chain
    client_cert_path: PathBuf,
    /// Path to CA certificate file (None = use system roots)
    ca_cert_path: Option<PathBuf>,
    /// Compiled rustls ClientConfig
    client_config: Arc<ClientConfig>,
}

impl TlsConfig {
    /// Create a new TLS configuration builder.
    pub fn builder() -> TlsConfigBuilder {
        TlsConfigBuilder::default()
    }

    /// Get the rustls ClientConfig for this TLS configuration.
    pub fn client_config(&self) -> Arc<ClientConfig> {
        self.client_config.clone()
    }

    /// Path of the client certificate presented to the gateway
    pub fn client_cert_path(&self) -> &Path {
        &self.client_cert_path
    }
}

impl std::fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConfig")
            .field("client_cert_path", &self.client_cert_path)
            .field("ca_cert_path", &self.ca_cert_path)
            .field("client_config", &"<ClientConfig>")
            .finish()
    }
}

/// Builder for TLS configuration.
#[derive(Debug, Default)]
pub struct TlsConfigBuilder {
    client_cert_path: Option<PathBuf>,
    client_key_path: Option<PathBuf>,
    ca_cert_path: Option<PathBuf>,
}

impl TlsConfigBuilder {
    /// Set the PEM file holding the client certificate chain.
    ///
    /// The private key is read from the same file unless
    /// [`client_key_path`](Self::client_key_path) is set.
    pub fn client_cert_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.client_cert_path = Some(path.into());
        self
    }

    /// Set the PEM file holding the client private key.
    pub fn client_key_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.client_key_path = Some(path.into());
        self
    }

    /// Set the path to a custom CA certificate file (PEM format).
    ///
    /// If not set, system root certificates will be used.
    pub fn ca_cert_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_cert_path = Some(path.into());
        self
    }

    /// Build the TLS configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if:
    /// - no client certificate was configured
    /// - a certificate or key file cannot be read or holds no usable PEM item
    /// - rustls rejects the certificate/key pair
    pub fn build(self) -> Result<TlsConfig> {
        let cert_path = self
            .client_cert_path
            .ok_or_else(|| Error::Config("TLS requires a client certificate".into()))?;
        let key_path = self.client_key_path.as_deref().unwrap_or(cert_path.as_path());

        let root_store = match &self.ca_cert_path {
            Some(ca_path) => load_custom_ca(ca_path)?,
            None => load_system_roots()?,
        };

        let cert_chain = load_cert_chain(&cert_path)?;
        let key = load_private_key(key_path)?;

        let client_config = ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_client_auth_cert(cert_chain, key)
            .map_err(|e| {
                Error::Config(format!(
                    "invalid client certificate '{}': {}",
                    cert_path.display(),
                    e
                ))
            })?;

        Ok(TlsConfig {
            client_cert_path: cert_path,
            ca_cert_path: self.ca_cert_path,
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

/// Load system root certificates, falling back to the bundled Mozilla roots.
fn load_system_roots() -> Result<RootCertStore> {
    let result = rustls_native_certs::load_native_certs();

    let mut store = RootCertStore::empty();
    for cert in result.certs {
        let _ = store.add_parsable_certificates(std::iter::once(cert));
    }

    if store.is_empty() {
        if !result.errors.is_empty() {
            tracing::warn!(
                errors = result.errors.len(),
                "failed to load system root certificates, using bundled roots"
            );
        }
        store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    }

    Ok(store)
}

/// Load a custom CA certificate from a PEM file.
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
            Ok(Some(_)) => {
                // Skip non-certificate items
            }
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

/// Load the client certificate chain from a PEM file.
fn load_cert_chain(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let data = read_pem(path, "client certificate")?;
    let mut reader = std::io::Cursor::new(&data);

    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|_| {
            Error::Config(format!(
                "Failed to parse client certificate from '{}'",
                path.display()
            ))
        })?;

    if certs.is_empty() {
        return Err(Error::Config(format!(
            "No client certificate found in '{}'",
            path.display()
        )));
    }

    Ok(certs)
}

/// Load the client private key (PKCS#1, PKCS#8 or SEC1) from a PEM file.
fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let data = read_pem(path, "private key")?;
    let mut reader = std::io::Cursor::new(&data);

    rustls_pemfile::private_key(&mut reader)
        .map_err(|_| {
            Error::Config(format!(
                "Failed to parse private key from '{}'",
                path.display()
            ))
        })?
        .ok_or_else(|| Error::Config(format!("No private key found in '{}'", path.display())))
}

/// Parse server name from hostname for TLS SNI (Server Name Indication).
///
/// IP literals are returned in canonical form and verified against the
/// certificate's IP address entries instead.
///
/// # Errors
///
/// Returns an error if the hostname is invalid.
pub fn parse_server_name(hostname: &str) -> Result<String> {
    if let Ok(ip) = hostname.parse::<std::net::IpAddr>() {
        return Ok(ip.to_string());
    }

    let hostname = hostname.trim_end_matches('.');

    if hostname.is_empty() || hostname.len() > 253 {
        return Err(Error::Config(format!(
            "Invalid hostname for TLS: '{}'",
            hostname
        )));
    }

    if !hostname
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '.')
    {
        return Err(Error::Config(format!(
            "Invalid hostname for TLS: '{}'",
            hostname
        )));
    }

    Ok(hostname.to_string())
}
