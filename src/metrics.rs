// =============================================================================
// METRICS MODULE
// =============================================================================
// Prometheus metrics, scraped from /metrics.
//
// NOTES:
// - Upstream latency is tracked per source name (`checklist:stage`,
//   `inventory:audio`, `shows`, ...) since the sheet scripts are the slow part
// - The availability gauge is refreshed from every snapshot we accept, so it
//   always mirrors the last authoritative answer
// =============================================================================

use anyhow::Result;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

use crate::models::CategorySummary;

// =============================================================================
// METRIC NAMES
// =============================================================================

/// Labels: method, endpoint, status
pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";

/// Labels: method, endpoint
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";

/// Labels: source
pub const UPSTREAM_REQUEST_DURATION_SECONDS: &str = "upstream_request_duration_seconds";

/// Labels: department, category
pub const INVENTORY_UNITS_AVAILABLE: &str = "inventory_units_available";

/// Labels: department, kind (checkout/checkin), status (success/failed)
pub const INVENTORY_MUTATIONS_TOTAL: &str = "inventory_mutations_total";

/// Labels: board
pub const CHECKLIST_RECORDS: &str = "checklist_records";

// =============================================================================
// SETUP FUNCTION
// =============================================================================
/// Install the Prometheus recorder and return the handle `/metrics` renders.
pub fn setup_metrics() -> Result<PrometheusHandle> {
    // Sheet scripts routinely take seconds, so the upper buckets go further
    // than a plain HTTP service would need.
    let latency_buckets = &[
        0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
    ];

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(HTTP_REQUEST_DURATION_SECONDS.to_string()),
            latency_buckets,
        )?
        .set_buckets_for_metric(
            Matcher::Full(UPSTREAM_REQUEST_DURATION_SECONDS.to_string()),
            latency_buckets,
        )?
        .install_recorder()?;

    describe_counter!(HTTP_REQUESTS_TOTAL, "Total number of HTTP requests received");
    describe_histogram!(HTTP_REQUEST_DURATION_SECONDS, "HTTP request latency in seconds");
    describe_histogram!(
        UPSTREAM_REQUEST_DURATION_SECONDS,
        "Latency of calls to the spreadsheet endpoints in seconds"
    );
    describe_gauge!(
        INVENTORY_UNITS_AVAILABLE,
        "Units available per department and category in the last snapshot"
    );
    describe_counter!(
        INVENTORY_MUTATIONS_TOTAL,
        "Checkout and check-in submissions by outcome"
    );
    describe_gauge!(CHECKLIST_RECORDS, "Records produced by the last checklist fetch");

    Ok(handle)
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

pub fn record_upstream_request(source: &str, duration_secs: f64) {
    histogram!(
        UPSTREAM_REQUEST_DURATION_SECONDS,
        "source" => source.to_string()
    )
    .record(duration_secs);
}

/// Publish per-category availability for a department.
pub fn set_units_available(department: &str, categories: &[CategorySummary]) {
    for category in categories {
        gauge!(
            INVENTORY_UNITS_AVAILABLE,
            "department" => department.to_string(),
            "category" => category.name.clone()
        )
        .set(category.total_available as f64);
    }
}

/// `kind` is `checkout` or `checkin`.
pub fn record_mutation(department: &str, kind: &str, success: bool) {
    let status = if success { "success" } else { "failed" };
    counter!(
        INVENTORY_MUTATIONS_TOTAL,
        "department" => department.to_string(),
        "kind" => kind.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

pub fn set_checklist_records(board: &str, count: usize) {
    gauge!(CHECKLIST_RECORDS, "board" => board.to_string()).set(count as f64);
}
