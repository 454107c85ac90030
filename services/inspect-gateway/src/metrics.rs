//! Prometheus metrics exposition
//!
//! - `inspect_requests_total` (counter): label `outcome`
//! - `inspect_request_duration_seconds` (histogram): label `outcome`
//! - `inspect_errors_total` (counter): label `kind`
//! - `pool_sessions_ready` / `pool_sessions_total` (gauges)

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return a handle for rendering.
///
/// The duration histogram gets explicit buckets so `/metrics` renders
/// `_bucket` lines usable with `histogram_quantile()` instead of the
/// default summary. Boundaries span 5ms to 60s, covering the
/// configurable request timeout range.
pub fn install_recorder() -> PrometheusHandle {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Full(
                "inspect_request_duration_seconds".to_string(),
            ),
            &[
                0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
            ],
        )
        .expect("failed to set histogram buckets")
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// Record a completed resolution request. `outcome` is either "ok" or
/// the error taxonomy code.
pub fn record_request(outcome: &str, duration_secs: f64) {
    metrics::counter!("inspect_requests_total", "outcome" => outcome.to_string()).increment(1);
    metrics::histogram!("inspect_request_duration_seconds", "outcome" => outcome.to_string())
        .record(duration_secs);
}

/// Record a failed resolution with its taxonomy code.
pub fn record_error(kind: &str) {
    metrics::counter!("inspect_errors_total", "kind" => kind.to_string()).increment(1);
}

/// Publish the pool's current capacity.
pub fn set_pool_gauges(ready: usize, total: usize) {
    metrics::gauge!("pool_sessions_ready").set(ready as f64);
    metrics::gauge!("pool_sessions_total").set(total as f64);
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusRecorder;

    #[test]
    fn record_functions_do_not_panic_without_recorder() {
        // Without an installed recorder, metrics calls are no-ops.
        record_request("ok", 0.05);
        record_error("transient_failure");
        set_pool_gauges(3, 5);
    }

    /// Isolated recorder/handle pair: only one global recorder can
    /// exist per process, so tests use a local one.
    fn isolated_recorder() -> (PrometheusRecorder, PrometheusHandle) {
        let recorder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                metrics_exporter_prometheus::Matcher::Full(
                    "inspect_request_duration_seconds".to_string(),
                ),
                &[
                    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
                ],
            )
            .expect("failed to set histogram buckets")
            .build_recorder();
        let handle = recorder.handle();
        (recorder, handle)
    }

    #[test]
    fn request_counter_and_histogram_render_with_labels() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_request("ok", 0.042);
        record_request("busy", 0.001);

        let output = handle.render();
        assert!(output.contains("inspect_requests_total"));
        assert!(output.contains("outcome=\"ok\""));
        assert!(output.contains("outcome=\"busy\""));
        assert!(
            output.contains("inspect_request_duration_seconds_bucket"),
            "histogram must render _bucket lines"
        );
    }

    #[test]
    fn error_counter_carries_taxonomy_kind() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_error("transient_failure");
        record_error("malformed_response");

        let output = handle.render();
        assert!(output.contains("inspect_errors_total"));
        assert!(output.contains("kind=\"transient_failure\""));
        assert!(output.contains("kind=\"malformed_response\""));
    }

    #[test]
    fn pool_gauges_render_current_values() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        set_pool_gauges(2, 5);

        let output = handle.render();
        assert!(output.contains("pool_sessions_ready 2"));
        assert!(output.contains("pool_sessions_total 5"));
    }
}
