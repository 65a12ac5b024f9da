use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the global Prometheus recorder
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    init_metric_descriptions();

    Ok(handle)
}

/// Initialize metric descriptions (can be called multiple times safely)
fn init_metric_descriptions() {
    describe_counter!(
        "gemini_proxy_requests_total",
        "Total number of generation requests accepted"
    );
    describe_counter!(
        "gemini_proxy_upstream_attempts_total",
        "Upstream model attempts by outcome"
    );
    describe_counter!(
        "gemini_proxy_tokens_total",
        "Total number of tokens processed"
    );
    describe_histogram!(
        "gemini_proxy_request_duration_seconds",
        "Successful upstream call duration in seconds"
    );
    describe_counter!(
        "gemini_proxy_errors_total",
        "Total number of errors"
    );
    describe_gauge!(
        "gemini_proxy_info",
        "Proxy version information"
    );

    gauge!("gemini_proxy_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);
}

/// Record an accepted request
pub fn record_request(endpoint: &str) {
    counter!(
        "gemini_proxy_requests_total",
        "endpoint" => endpoint.to_string(),
    )
    .increment(1);
}

/// Record one upstream attempt; `outcome` is "success" or a failure kind
pub fn record_attempt(provider: &str, model: &str, outcome: &str) {
    counter!(
        "gemini_proxy_upstream_attempts_total",
        "provider" => provider.to_string(),
        "model" => model.to_string(),
        "outcome" => outcome.to_string(),
    )
    .increment(1);
}

/// Record tokens
pub fn record_tokens(model: &str, token_type: &str, count: u64) {
    counter!(
        "gemini_proxy_tokens_total",
        "model" => model.to_string(),
        "type" => token_type.to_string(),
    )
    .increment(count);
}

/// Record successful call duration
pub fn record_duration(model: &str, duration: Duration) {
    histogram!(
        "gemini_proxy_request_duration_seconds",
        "model" => model.to_string(),
    )
    .record(duration.as_secs_f64());
}

/// Record an error (validation, all_models_failed, persistence, ...)
pub fn record_error(error_type: &str) {
    counter!(
        "gemini_proxy_errors_total",
        "error_type" => error_type.to_string(),
    )
    .increment(1);
}
