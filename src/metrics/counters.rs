//! Counters

use super::labels;

/// A connect call was issued on a transport
pub fn connect_attempted() {
    metrics::counter!(labels::CONNECT_ATTEMPTS).increment(1);
}

/// Connecting a transport failed
pub fn connect_failed(class: &'static str) {
    metrics::counter!(labels::CONNECT_FAILURES, "class" => class).increment(1);
}

/// An operation finished
pub fn operation_completed(operation: &'static str, status: &'static str) {
    metrics::counter!(labels::OPERATIONS, "operation" => operation, "status" => status)
        .increment(1);
}

/// An operation is being retried after a transient failure
pub fn operation_retried(operation: &'static str, category: &'static str) {
    metrics::counter!(labels::RETRIES, "operation" => operation, "error" => category)
        .increment(1);
}

/// An operation failed terminally
pub fn operation_failed(operation: &'static str, class: &'static str) {
    metrics::counter!(labels::FAILURES, "operation" => operation, "class" => class).increment(1);
}

/// The gateway refused an expired client certificate
pub fn certificate_expired() {
    metrics::counter!(labels::CERTIFICATE_EXPIRED).increment(1);
}

/// A transport was closed and dropped after a transient failure
pub fn transport_discarded() {
    metrics::counter!(labels::TRANSPORT_DISCARDED).increment(1);
}
