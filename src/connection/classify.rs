//! Failure classification
//!
//! Every failure caught by the retry loop is classified exactly once. The outcome
//! decides whether the connection gives up, reconnects and retries, or steps aside.

use crate::Error;
use std::io;

/// Message fragment identifying an expired client certificate (matched case-insensitively)
const CERTIFICATE_EXPIRED: &str = "certificate expired";

/// How the connection reacts to a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Permanent failure: surface immediately, never retry
    Fatal,
    /// Retryable failure: close the session, reconnect, try again
    Transient,
    /// Not a transport failure: propagate as-is, no retry
    Unclassified,
}

impl Classification {
    /// Label used in metrics and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fatal => "fatal",
            Self::Transient => "transient",
            Self::Unclassified => "unclassified",
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify an error raised while connecting, reading or writing.
pub fn classify(err: &Error) -> Classification {
    match err {
        Error::CertificateExpired(_) => Classification::Fatal,
        Error::Tls(msg) => classify_tls(msg),
        Error::Io(io_err) => classify_io(io_err),
        Error::ConnectionClosed => Classification::Transient,
        Error::NotConnected
        | Error::Timeout(_)
        | Error::Config(_)
        | Error::InvalidState { .. } => Classification::Unclassified,
    }
}

fn classify_tls(msg: &str) -> Classification {
    if msg.to_ascii_lowercase().contains(CERTIFICATE_EXPIRED) {
        Classification::Fatal
    } else {
        Classification::Transient
    }
}

fn classify_io(err: &io::Error) -> Classification {
    // TLS errors that reached us without going through Error::from_stream
    if let Some(tls) = err
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<rustls::Error>())
    {
        return classify_tls(&crate::error::describe_tls_error(tls));
    }

    match err.kind() {
        // Local mistakes, not network trouble
        io::ErrorKind::NotFound
        | io::ErrorKind::PermissionDenied
        | io::ErrorKind::InvalidInput
        | io::ErrorKind::Unsupported => Classification::Unclassified,
        _ => Classification::Transient,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_certificate_expired_is_fatal() {
        assert_eq!(
            classify(&Error::Tls("certificate expired".into())),
            Classification::Fatal
        );
        assert_eq!(
            classify(&Error::Tls("SSL_write: Certificate Expired".into())),
            Classification::Fatal
        );
        assert_eq!(
            classify(&Error::CertificateExpired("gone".into())),
            Classification::Fatal
        );
    }

    #[test]
    fn test_other_tls_errors_are_transient() {
        assert_eq!(
            classify(&Error::Tls("received fatal alert: BadRecordMac".into())),
            Classification::Transient
        );
        assert_eq!(
            classify(&Error::Tls("certificate revoked".into())),
            Classification::Transient
        );
    }

    #[test]
    fn test_socket_errors_are_transient() {
        for kind in [
            io::ErrorKind::BrokenPipe,
            io::ErrorKind::ConnectionReset,
            io::ErrorKind::ConnectionAborted,
            io::ErrorKind::ConnectionRefused,
            io::ErrorKind::UnexpectedEof,
            io::ErrorKind::TimedOut,
        ] {
            assert_eq!(
                classify(&Error::Io(io::Error::from(kind))),
                Classification::Transient,
                "{:?}",
                kind
            );
        }

        // DNS failures surface as uncategorized I/O errors
        let lookup = io::Error::new(
            io::ErrorKind::Other,
            "failed to lookup address information",
        );
        assert_eq!(classify(&Error::Io(lookup)), Classification::Transient);
        assert_eq!(classify(&Error::ConnectionClosed), Classification::Transient);
    }

    #[test]
    fn test_rustls_error_inside_io_error() {
        let expired = io::Error::new(
            io::ErrorKind::InvalidData,
            rustls::Error::AlertReceived(rustls::AlertDescription::CertificateExpired),
        );
        assert_eq!(classify(&Error::Io(expired)), Classification::Fatal);

        let other = io::Error::new(
            io::ErrorKind::InvalidData,
            rustls::Error::DecryptError,
        );
        assert_eq!(classify(&Error::Io(other)), Classification::Transient);
    }

    #[test]
    fn test_unclassified() {
        assert_eq!(classify(&Error::NotConnected), Classification::Unclassified);
        assert_eq!(
            classify(&Error::Timeout(std::time::Duration::from_secs(1))),
            Classification::Unclassified
        );
        assert_eq!(
            classify(&Error::Config("missing certificate".into())),
            Classification::Unclassified
        );
        assert_eq!(
            classify(&Error::Io(io::Error::from(io::ErrorKind::NotFound))),
            Classification::Unclassified
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(Classification::Fatal.to_string(), "fatal");
        assert_eq!(Classification::Transient.to_string(), "transient");
        assert_eq!(Classification::Unclassified.to_string(), "unclassified");
    }
}
