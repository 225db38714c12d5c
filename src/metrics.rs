// =============================================================================
// METRICS MODULE
// =============================================================================
// Prometheus metrics for the marketplace service.
//
// - Counter: Only goes up (requests, submissions, conflicts)
// - Gauge: Can go up or down (remaining crop quantity)
// - Histogram: Distribution of values in buckets (latency)
//
// Without an installed recorder (unit tests) every call here is a no-op.
// =============================================================================

use anyhow::Result;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use uuid::Uuid;

// =============================================================================
// METRIC NAMES
// =============================================================================

/// HTTP request counter
/// Labels: method, endpoint, status
pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";

/// HTTP request duration histogram
/// Labels: method, endpoint
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";

/// Interest submissions
/// Labels: outcome (created/duplicate/not_found/unavailable)
pub const INTEREST_SUBMISSIONS_TOTAL: &str = "interest_submissions_total";

/// Interest decisions
/// Labels: decision (accepted/rejected), outcome
pub const INTEREST_DECISIONS_TOTAL: &str = "interest_decisions_total";

/// Conditional writes that lost a race and were retried
/// Labels: operation
pub const CATALOG_STORE_CONFLICTS_TOTAL: &str = "catalog_store_conflicts_total";

/// Remaining quantity per crop, updated after each decision
/// Labels: crop_id
pub const CROP_QUANTITY: &str = "crop_quantity";

/// Database query duration histogram
/// Labels: operation
pub const DB_QUERY_DURATION_SECONDS: &str = "db_query_duration_seconds";

/// Redis operation duration histogram
/// Labels: operation (get/set/delete)
pub const REDIS_OPERATION_DURATION_SECONDS: &str = "redis_operation_duration_seconds";

// =============================================================================
// SETUP FUNCTION
// =============================================================================

const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

fn builder() -> Result<PrometheusBuilder> {
    let builder = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(HTTP_REQUEST_DURATION_SECONDS.to_string()),
            LATENCY_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Full(DB_QUERY_DURATION_SECONDS.to_string()),
            LATENCY_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Full(REDIS_OPERATION_DURATION_SECONDS.to_string()),
            LATENCY_BUCKETS,
        )?;
    Ok(builder)
}

/// Install the Prometheus recorder globally and return a handle for
/// rendering `/metrics`.
pub fn setup_metrics() -> Result<PrometheusHandle> {
    let handle = builder()?.install_recorder()?;

    describe_counter!(HTTP_REQUESTS_TOTAL, "Total number of HTTP requests received");
    describe_histogram!(HTTP_REQUEST_DURATION_SECONDS, "HTTP request latency in seconds");
    describe_counter!(
        INTEREST_SUBMISSIONS_TOTAL,
        "Interest submissions by outcome"
    );
    describe_counter!(
        INTEREST_DECISIONS_TOTAL,
        "Owner decisions on interests by decision and outcome"
    );
    describe_counter!(
        CATALOG_STORE_CONFLICTS_TOTAL,
        "Conditional catalog writes rejected because the crop changed underneath"
    );
    describe_gauge!(CROP_QUANTITY, "Remaining quantity of each crop");
    describe_histogram!(DB_QUERY_DURATION_SECONDS, "Database query latency in seconds");
    describe_histogram!(
        REDIS_OPERATION_DURATION_SECONDS,
        "Redis operation latency in seconds"
    );

    Ok(handle)
}

/// Build a recorder that is not installed globally. Its handle renders an
/// empty exposition; used when the router runs inside tests.
pub fn detached_handle() -> Result<PrometheusHandle> {
    Ok(builder()?.build_recorder().handle())
}

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

pub fn record_http_request(method: &str, endpoint: &str, status: u16, duration_secs: f64) {
    counter!(
        HTTP_REQUESTS_TOTAL,
        "method" => method.to_string(),
        "endpoint" => endpoint.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "method" => method.to_string(),
        "endpoint" => endpoint.to_string()
    )
    .record(duration_secs);
}

pub fn record_interest_submission(outcome: &'static str) {
    counter!(INTEREST_SUBMISSIONS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_interest_decision(decision: &'static str, outcome: &'static str) {
    counter!(
        INTEREST_DECISIONS_TOTAL,
        "decision" => decision,
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_store_conflict(operation: &'static str) {
    counter!(CATALOG_STORE_CONFLICTS_TOTAL, "operation" => operation).increment(1);
}

/// Update the remaining-quantity gauge for a crop
pub fn set_crop_quantity(crop_id: Uuid, quantity: i64) {
    gauge!(CROP_QUANTITY, "crop_id" => crop_id.to_string()).set(quantity as f64);
}

/// A deleted crop reports zero stock from then on.
///
/// NOTE: the `metrics` facade has no way to drop a series, so the `crop_id`
/// label set only grows with the number of crops ever decided on. The
/// series is zeroed here rather than left at its last stock level.
pub fn retire_crop_quantity(crop_id: Uuid) {
    gauge!(CROP_QUANTITY, "crop_id" => crop_id.to_string()).set(0.0);
}

/// Record database query duration
pub fn record_db_query(operation: &'static str, duration_secs: f64) {
    histogram!(DB_QUERY_DURATION_SECONDS, "operation" => operation).record(duration_secs);
}

/// Record Redis operation duration
pub fn record_redis_operation(operation: &'static str, duration_secs: f64) {
    histogram!(REDIS_OPERATION_DURATION_SECONDS, "operation" => operation).record(duration_secs);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn helpers_record_into_the_prometheus_exposition() {
        let recorder = builder().unwrap().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            record_interest_decision("accepted", "applied");
            record_store_conflict("append_interest");
            record_store_conflict("append_interest");
        });

        let rendered = handle.render();
        let decision_line = rendered
            .lines()
            .find(|l| l.starts_with(INTEREST_DECISIONS_TOTAL))
            .unwrap();
        assert!(decision_line.contains("decision=\"accepted\""));
        assert!(decision_line.contains("outcome=\"applied\""));
        assert!(decision_line.ends_with(" 1"));
        assert!(rendered.contains("catalog_store_conflicts_total{operation=\"append_interest\"} 2"));
    }

    #[test]
    fn deleted_crop_gauge_drops_to_zero() {
        let recorder = builder().unwrap().build_recorder();
        let handle = recorder.handle();
        let crop_id = Uuid::new_v4();

        metrics::with_local_recorder(&recorder, || {
            set_crop_quantity(crop_id, 70);
            retire_crop_quantity(crop_id);
        });

        let prefix = format!("crop_quantity{{crop_id=\"{}\"}} ", crop_id);
        let rendered = handle.render();
        let value: f64 = rendered
            .lines()
            .find_map(|l| l.strip_prefix(prefix.as_str()))
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(value, 0.0);
    }
}
