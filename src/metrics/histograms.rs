//! Histograms

use super::labels;

/// Wall-clock time of an operation including retries, in milliseconds
pub fn operation_duration(operation: &'static str, duration_ms: u64) {
    metrics::histogram!(labels::OPERATION_DURATION, "operation" => operation)
        .record(duration_ms as f64);
}

/// Attempts an operation took before it finished
pub fn operation_attempts(operation: &'static str, attempts: usize) {
    metrics::histogram!(labels::OPERATION_ATTEMPTS, "operation" => operation)
        .record(attempts as f64);
}
