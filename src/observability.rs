use std::net::SocketAddr;

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total statements executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "hallres_queries_total";

/// Histogram: statement latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "hallres_query_duration_seconds";

// ── Reservation lifecycle ───────────────────────────────────────

/// Counter: pending requests accepted by the store.
pub const REQUESTS_SUBMITTED_TOTAL: &str = "hallres_requests_submitted_total";

/// Counter: requests moved into bookings.
pub const APPROVALS_TOTAL: &str = "hallres_approvals_total";

/// Counter: requests rejected and deleted.
pub const REJECTIONS_TOTAL: &str = "hallres_rejections_total";

/// Counter: approvals refused because the slot was taken in the meantime.
pub const STALE_CONFLICTS_TOTAL: &str = "hallres_stale_conflicts_total";

/// Counter: stored documents skipped as malformed during import.
pub const MALFORMED_RECORDS_TOTAL: &str = "hallres_malformed_records_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "hallres_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "hallres_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "hallres_connections_rejected_total";

/// Gauge: number of active tenants (loaded engines).
pub const TENANTS_ACTIVE: &str = "hallres_tenants_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "hallres_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "hallres_wal_flush_batch_size";

/// Install the Prometheus exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Short metric label for a command.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::SubmitRequest(_) => "submit_request",
        Command::ApproveRequest { .. } => "approve_request",
        Command::RejectRequest { .. } => "reject_request",
        Command::SelectAvailability { .. } => "select_availability",
        Command::SelectHalls { .. } => "select_halls",
        Command::SelectRequests { .. } => "select_requests",
        Command::SelectBookings { .. } => "select_bookings",
        Command::SelectDashboard { .. } => "select_dashboard",
    }
}
