//! Error types for pushwire

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type
#[derive(Debug, Error)]
pub enum Error {
    /// Socket-level I/O error
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// TLS handshake or record error
    #[error("tls error: {0}")]
    Tls(String),

    /// The gateway rejected the client certificate because it has expired.
    ///
    /// Never retried. Callers typically react by provisioning a new certificate.
    #[error("client certificate expired: {0}")]
    CertificateExpired(String),

    /// Peer closed the session mid-operation
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// Operation requires an established session
    #[error("not connected")]
    NotConnected,

    /// Bounded read did not complete in time
    #[error("read timed out after {0:?}")]
    Timeout(Duration),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Invalid connection state
    #[error("invalid state: expected {expected}, got {actual}")]
    InvalidState {
        /// Expected state
        expected: String,
        /// Actual state
        actual: String,
    },
}

impl Error {
    /// Convert an I/O error raised by a TLS stream.
    ///
    /// tokio-rustls reports TLS failures as `io::Error`s carrying a `rustls::Error`;
    /// those are surfaced as [`Error::Tls`] so they can be told apart from plain socket
    /// errors.
    pub fn from_stream(err: io::Error) -> Self {
        match err.get_ref().and_then(|inner| inner.downcast_ref::<rustls::Error>()) {
            Some(tls) => Error::Tls(describe_tls_error(tls)),
            None => Error::Io(err),
        }
    }

    /// Whether this is the fatal expired-certificate error
    pub fn is_certificate_expired(&self) -> bool {
        matches!(self, Error::CertificateExpired(_))
    }

    /// Whether the connection retries an operation that failed with this error
    pub fn is_retriable(&self) -> bool {
        crate::connection::classify(self) == crate::connection::Classification::Transient
    }

    /// Short error category, used as a metrics label
    pub fn category(&self) -> &'static str {
        match self {
            Error::Io(_) => "io",
            Error::Tls(_) => "tls",
            Error::CertificateExpired(_) => "certificate_expired",
            Error::ConnectionClosed => "connection_closed",
            Error::NotConnected => "not_connected",
            Error::Timeout(_) => "timeout",
            Error::Config(_) => "config",
            Error::InvalidState { .. } => "invalid_state",
        }
    }
}

/// Render a rustls error as a message.
///
/// rustls names the expired-certificate alert `CertificateExpired`; it is spelled out so
/// that the gateway rejecting our client certificate reads "certificate expired". An
/// expired *gateway* certificate is worded differently: replacing the client
/// certificate would not fix it, so it must stay retriable.
pub(crate) fn describe_tls_error(err: &rustls::Error) -> String {
    match err {
        rustls::Error::AlertReceived(rustls::AlertDescription::CertificateExpired) => {
            "received fatal alert: certificate expired".to_string()
        }
        rustls::Error::InvalidCertificate(cert_err)
            if rustls::AlertDescription::from(cert_err.clone())
                == rustls::AlertDescription::CertificateExpired =>
        {
            format!("gateway certificate is outside its validity period ({:?})", cert_err)
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_stream_plain_io() {
        let err = Error::from_stream(io::Error::from(io::ErrorKind::BrokenPipe));
        assert!(matches!(err, Error::Io(ref e) if e.kind() == io::ErrorKind::BrokenPipe));
    }

    #[test]
    fn test_from_stream_unwraps_rustls_error() {
        let inner = rustls::Error::AlertReceived(rustls::AlertDescription::CertificateExpired);
        let err = Error::from_stream(io::Error::new(io::ErrorKind::InvalidData, inner));
        match err {
            Error::Tls(msg) => assert!(msg.contains("certificate expired")),
            other => panic!("expected Tls, got {:?}", other),
        }
    }

    #[test]
    fn test_from_stream_other_tls_alert() {
        let inner = rustls::Error::AlertReceived(rustls::AlertDescription::HandshakeFailure);
        let err = Error::from_stream(io::Error::new(io::ErrorKind::InvalidData, inner));
        match err {
            Error::Tls(msg) => assert!(!msg.to_lowercase().contains("certificate expired")),
            other => panic!("expected Tls, got {:?}", other),
        }
    }

    #[test]
    fn test_from_stream_expired_gateway_certificate() {
        let inner = rustls::Error::InvalidCertificate(rustls::CertificateError::Expired);
        let err = Error::from_stream(io::Error::new(io::ErrorKind::InvalidData, inner));
        match err {
            Error::Tls(ref msg) => {
                assert!(msg.contains("gateway certificate"));
                assert!(!msg.to_lowercase().contains("certificate expired"));
            }
            ref other => panic!("expected Tls, got {:?}", other),
        }
        assert!(err.is_retriable());
    }

    #[test]
    fn test_is_certificate_expired() {
        assert!(Error::CertificateExpired("x".into()).is_certificate_expired());
        assert!(!Error::Tls("certificate expired".into()).is_certificate_expired());
        assert!(!Error::ConnectionClosed.is_certificate_expired());
    }

    #[test]
    fn test_is_retriable() {
        assert!(Error::ConnectionClosed.is_retriable());
        assert!(Error::Tls("bad record mac".into()).is_retriable());
        assert!(!Error::Tls("Certificate Expired".into()).is_retriable());
        assert!(!Error::Config("nope".into()).is_retriable());
    }

    #[test]
    fn test_display() {
        let err = Error::Timeout(Duration::from_secs(1));
        assert_eq!(err.to_string(), "read timed out after 1s");

        let err = Error::CertificateExpired("received fatal alert: certificate expired".into());
        assert!(err.to_string().starts_with("client certificate expired"));
    }

    #[test]
    fn test_category() {
        assert_eq!(Error::NotConnected.category(), "not_connected");
        assert_eq!(
            Error::Io(io::Error::from(io::ErrorKind::ConnectionReset)).category(),
            "io"
        );
    }
}
