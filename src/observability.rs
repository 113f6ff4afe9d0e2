use std::net::SocketAddr;

use crate::wire::Request;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total requests executed. Labels: op, status.
pub const REQUESTS_TOTAL: &str = "stayd_requests_total";

/// Histogram: request latency in seconds. Labels: op.
pub const REQUEST_DURATION_SECONDS: &str = "stayd_request_duration_seconds";

/// Counter: booking create/update attempts rejected for overlapping dates.
pub const BOOKING_CONFLICTS_TOTAL: &str = "stayd_booking_conflicts_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "stayd_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "stayd_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "stayd_connections_rejected_total";

/// Counter: requests with missing or unknown tokens.
pub const AUTH_FAILURES_TOTAL: &str = "stayd_auth_failures_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "stayd_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "stayd_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}

/// Map a Request variant to a short label for metrics.
pub fn op_label(req: &Request) -> &'static str {
    match req {
        Request::CreateProperty { .. } => "create_property",
        Request::UpdateProperty { .. } => "update_property",
        Request::DeleteProperty { .. } => "delete_property",
        Request::GetProperty { .. } => "get_property",
        Request::ListProperties { .. } => "list_properties",
        Request::ListAvailableProperties { .. } => "list_available_properties",
        Request::GetAvailability { .. } => "get_availability",
        Request::CreateBooking { .. } => "create_booking",
        Request::CancelBooking { .. } => "cancel_booking",
        Request::UpdateBooking { .. } => "update_booking",
        Request::DeleteBooking { .. } => "delete_booking",
        Request::GetBooking { .. } => "get_booking",
        Request::MyBookings { .. } => "my_bookings",
        Request::ListBookings { .. } => "list_bookings",
    }
}
