//! Storage operation metrics.
//!
//! Metric names and a recording helper used by the [`crate::storage::Backend`]
//! dispatch, so every backend variant is instrumented identically.  The
//! library only emits through the `metrics` facade; [`init_metrics`]
//! installs a Prometheus recorder for processes that want to render them.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;

// -- Metric name constants ----------------------------------------------------

/// Total backend operations (counter). Labels: backend, operation, outcome.
pub const STORAGE_OPERATIONS_TOTAL: &str = "blobvault_storage_operations_total";

/// Backend operation duration in seconds (histogram). Labels: backend, operation.
pub const STORAGE_OPERATION_DURATION_SECONDS: &str =
    "blobvault_storage_operation_duration_seconds";

/// Total payload bytes written (counter). Labels: backend.
pub const STORAGE_BYTES_WRITTEN_TOTAL: &str = "blobvault_storage_bytes_written_total";

/// Total payload bytes read (counter). Labels: backend.
pub const STORAGE_BYTES_READ_TOTAL: &str = "blobvault_storage_bytes_read_total";

// -- Global recorder installation ---------------------------------------------

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus recorder. Idempotent.
///
/// Returns `None` if another recorder was installed first.
pub fn init_metrics() -> Option<&'static PrometheusHandle> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Some(handle);
    }
    let handle = PrometheusBuilder::new().install_recorder().ok()?;
    let handle = PROMETHEUS_HANDLE.get_or_init(|| handle);
    describe_metrics();
    Some(handle)
}

/// Register metric descriptions with the global recorder.
pub fn describe_metrics() {
    describe_counter!(
        STORAGE_OPERATIONS_TOTAL,
        "Total storage backend operations by outcome"
    );
    describe_histogram!(
        STORAGE_OPERATION_DURATION_SECONDS,
        "Storage backend operation duration in seconds"
    );
    describe_counter!(STORAGE_BYTES_WRITTEN_TOTAL, "Total payload bytes written");
    describe_counter!(STORAGE_BYTES_READ_TOTAL, "Total payload bytes read");
}

// -- Recording ----------------------------------------------------------------

/// How a backend operation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    NotFound,
    Error,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Ok => "ok",
            Outcome::NotFound => "not_found",
            Outcome::Error => "error",
        }
    }
}

/// Record one finished backend operation.
pub fn record_operation(
    backend: &'static str,
    operation: &'static str,
    outcome: Outcome,
    elapsed: Duration,
) {
    counter!(
        STORAGE_OPERATIONS_TOTAL,
        "backend" => backend,
        "operation" => operation,
        "outcome" => outcome.as_str()
    )
    .increment(1);
    histogram!(
        STORAGE_OPERATION_DURATION_SECONDS,
        "backend" => backend,
        "operation" => operation
    )
    .record(elapsed.as_secs_f64());
}

pub fn record_bytes_written(backend: &'static str, bytes: usize) {
    counter!(STORAGE_BYTES_WRITTEN_TOTAL, "backend" => backend).increment(bytes as u64);
}

pub fn record_bytes_read(backend: &'static str, bytes: usize) {
    counter!(STORAGE_BYTES_READ_TOTAL, "backend" => backend).increment(bytes as u64);
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_labels() {
        assert_eq!(Outcome::Ok.as_str(), "ok");
        assert_eq!(Outcome::NotFound.as_str(), "not_found");
        assert_eq!(Outcome::Error.as_str(), "error");
    }

    #[test]
    fn test_recorded_operations_render() {
        let handle = init_metrics().expect("recorder installed");
        record_operation("metrics-test", "fetch", Outcome::NotFound, Duration::from_millis(3));
        record_bytes_written("metrics-test", 42);

        let text = handle.render();
        assert!(text.contains(STORAGE_OPERATIONS_TOTAL));
        assert!(text.contains(r#"backend="metrics-test""#));
        assert!(text.contains(r#"outcome="not_found""#));
        assert!(text.contains(STORAGE_BYTES_WRITTEN_TOTAL));
    }
}
