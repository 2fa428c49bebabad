//! Gateway endpoint
//!
//! Supports the URL form:
//! * apns://host[:port]?certificate=/path/to/cert.pem[&key=/path/to/key.pem]
//!
//! IPv6 literals are bracketed: `apns://[::1]:2195?certificate=...`

use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// Production push gateway host
pub const PRODUCTION_GATEWAY: &str = "gateway.push.apple.com";

/// Sandbox (development) push gateway host
pub const SANDBOX_GATEWAY: &str = "gateway.sandbox.push.apple.com";

/// Default gateway port
pub const DEFAULT_PORT: u16 = 2195;

/// Where to connect and which client certificate to present
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    gateway: String,
    port: u16,
    certificate: PathBuf,
    private_key: Option<PathBuf>,
}

/// Extract a query parameter value from a query string
fn parse_query_param(query_string: &str, param: &str) -> Option<String> {
    if query_string.is_empty() {
        return None;
    }

    let query = query_string.trim_start_matches('?');

    for pair in query.split('&') {
        if let Some((key, value)) = pair.split_once('=') {
            if key == param {
                return Some(value.to_string());
            }
        }
    }
    None
}

/// Split `host[:port]` or `[ipv6][:port]`
fn split_host_port(host_port: &str) -> Result<(String, u16)> {
    let (host, port) = match host_port.strip_prefix('[') {
        Some(bracketed) => {
            let (host, rest) = bracketed
                .split_once(']')
                .ok_or_else(|| Error::Config(format!("unterminated '[' in '{}'", host_port)))?;
            let port = match rest {
                "" => None,
                _ => Some(rest.strip_prefix(':').ok_or_else(|| {
                    Error::Config(format!("unexpected '{}' after IPv6 address", rest))
                })?),
            };
            (host, port)
        }
        None => match host_port.rsplit_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (host_port, None),
        },
    };

    let port = match port {
        Some(port) => port
            .parse()
            .map_err(|_| Error::Config(format!("invalid port '{}'", port)))?,
        None => DEFAULT_PORT,
    };
    Ok((host.to_string(), port))
}

impl Endpoint {
    /// Create an endpoint for an arbitrary gateway
    ///
    /// The certificate file is a PEM bundle holding the client certificate chain and,
    /// unless [`Endpoint::private_key`] is set, the private key as well.
    pub fn new(gateway: impl Into<String>, port: u16, certificate: impl Into<PathBuf>) -> Self {
        Self {
            gateway: gateway.into(),
            port,
            certificate: certificate.into(),
            private_key: None,
        }
    }

    /// Endpoint for the production gateway
    pub fn production(certificate: impl Into<PathBuf>) -> Self {
        Self::new(PRODUCTION_GATEWAY, DEFAULT_PORT, certificate)
    }

    /// Endpoint for the sandbox gateway
    pub fn sandbox(certificate: impl Into<PathBuf>) -> Self {
        Self::new(SANDBOX_GATEWAY, DEFAULT_PORT, certificate)
    }

    /// Read the private key from a separate PEM file
    pub fn private_key(mut self, path: impl Into<PathBuf>) -> Self {
        self.private_key = Some(path.into());
        self
    }

    /// Parse an endpoint URL
    ///
    /// # Examples
    ///
    /// ```
    /// use pushwire::connection::Endpoint;
    ///
    /// let endpoint =
    ///     Endpoint::parse("apns://gateway.push.apple.com:2195?certificate=/etc/push/cert.pem")?;
    /// assert_eq!(endpoint.port(), 2195);
    /// # Ok::<(), pushwire::Error>(())
    /// ```
    pub fn parse(s: &str) -> Result<Self> {
        let rest = s
            .strip_prefix("apns://")
            .ok_or_else(|| Error::Config("endpoint must start with apns://".into()))?;

        let (host_port, query_string) = match rest.find('?') {
            Some(q_pos) => rest.split_at(q_pos),
            None => (rest, ""),
        };
        let host_port = host_port.trim_end_matches('/');

        let (gateway, port) = split_host_port(host_port)?;

        if gateway.is_empty() {
            return Err(Error::Config("endpoint has no gateway host".into()));
        }

        let certificate = parse_query_param(query_string, "certificate")
            .ok_or_else(|| Error::Config("endpoint requires a certificate parameter".into()))?;

        let mut endpoint = Self::new(gateway, port, certificate);
        if let Some(key) = parse_query_param(query_string, "key") {
            endpoint = endpoint.private_key(key);
        }
        Ok(endpoint)
    }

    /// Gateway host name
    pub fn gateway(&self) -> &str {
        &self.gateway
    }

    /// Gateway TCP port
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Path to the client certificate PEM file
    pub fn certificate(&self) -> &Path {
        &self.certificate
    }

    /// Path holding the private key (the certificate file unless set separately)
    pub fn key_path(&self) -> &Path {
        self.private_key.as_deref().unwrap_or(&self.certificate)
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.gateway.contains(':') {
            write!(f, "[{}]:{}", self.gateway, self.port)
        } else {
            write!(f, "{}:{}", self.gateway, self.port)
        }
    }
}
