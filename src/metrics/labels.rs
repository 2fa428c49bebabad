//! Metric names and label values

/// Operation label: explicit connect
pub const OP_CONNECT: &str = "connect";
/// Operation label: write
pub const OP_WRITE: &str = "write";
/// Operation label: read
pub const OP_READ: &str = "read";
/// Operation label: bounded read
pub const OP_READ_WITH_TIMEOUT: &str = "read_with_timeout";

/// Outcome label: operation succeeded
pub const STATUS_OK: &str = "ok";
/// Outcome label: operation failed
pub const STATUS_ERROR: &str = "error";

pub(crate) const CONNECT_ATTEMPTS: &str = "pushwire_connect_attempts_total";
pub(crate) const CONNECT_FAILURES: &str = "pushwire_connect_failures_total";
pub(crate) const OPERATIONS: &str = "pushwire_operations_total";
pub(crate) const RETRIES: &str = "pushwire_retries_total";
pub(crate) const FAILURES: &str = "pushwire_failures_total";
pub(crate) const CERTIFICATE_EXPIRED: &str = "pushwire_certificate_expired_total";
pub(crate) const TRANSPORT_DISCARDED: &str = "pushwire_transport_discarded_total";
pub(crate) const OPERATION_DURATION: &str = "pushwire_operation_duration_ms";
pub(crate) const OPERATION_ATTEMPTS: &str = "pushwire_operation_attempts";
