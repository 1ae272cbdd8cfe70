//! Prometheus metrics recording and endpoint.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::relay::RelayState;

/// Install the Prometheus metrics recorder and return the handle for rendering.
pub fn install_prometheus_recorder() -> anyhow::Result<PrometheusHandle> {
    Ok(PrometheusBuilder::new().install_recorder()?)
}

/// Record a relay session opening.
pub fn record_session_open() {
    metrics::gauge!("relay_sessions_active").increment(1.0);
}

/// Record a relay session ending in `state`.
pub fn record_session_close(state: RelayState) {
    metrics::gauge!("relay_sessions_active").decrement(1.0);
    if state == RelayState::Failed {
        metrics::counter!("relay_sessions_failed_total").increment(1);
    }
}

/// Record an HTTP request with its status and duration.
pub fn record_request(route: &str, status: u16, duration_secs: f64) {
    let labels = [("route", route.to_string()), ("status", status.to_string())];
    metrics::counter!("http_requests_total", &labels).increment(1);
    metrics::histogram!("http_request_duration_seconds", &labels).record(duration_secs);
}

/// Record a failed chained-pipeline stage.
pub fn record_stage_failure(stage: &str) {
    let labels = [("stage", stage.to_string())];
    metrics::counter!("pipeline_stage_failures_total", &labels).increment(1);
}

/// Record an error of a given kind.
pub fn record_error(kind: &str) {
    let labels = [("kind", kind.to_string())];
    metrics::counter!("errors_total", &labels).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorders_without_exporter() {
        // The metrics crate falls back to a no-op recorder.
        record_session_open();
        record_session_close(RelayState::Failed);
        record_request("/api/translate", 200, 0.05);
        record_stage_failure("synthesize");
        record_error("upstream_unavailable");
    }

    #[test]
    fn test_install_prometheus_recorder() {
        let handle = install_prometheus_recorder().unwrap();
        record_error("payload_too_large");
        assert!(handle.render().contains("errors_total"));
    }
}
