use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: slot queries served. Labels: outcome (open / holiday /
/// day_locked / fully_booked / no_capacity).
pub const SLOT_QUERIES_TOTAL: &str = "vendimia_slot_queries_total";

/// Histogram: slot query latency in seconds.
pub const SLOT_QUERY_DURATION_SECONDS: &str = "vendimia_slot_query_duration_seconds";

/// Counter: booking requests. Labels: outcome (confirmed / refused).
pub const BOOKINGS_TOTAL: &str = "vendimia_bookings_total";

/// Histogram: booking admission latency in seconds, WAL fsync included.
pub const BOOKING_DURATION_SECONDS: &str = "vendimia_booking_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: tours currently bookable (created minus retired).
pub const TOURS_ACTIVE: &str = "vendimia_tours_active";

/// Counter: seats sold across all instances.
pub const SEATS_BOOKED_TOTAL: &str = "vendimia_seats_booked_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "vendimia_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "vendimia_wal_flush_batch_size";

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

/// Label for the outcome axis of [`SLOT_QUERIES_TOTAL`].
pub fn availability_label(out: &crate::model::DayAvailability) -> &'static str {
    use crate::model::{DayAvailability, UnavailableReason};
    match out {
        DayAvailability::Open { .. } => "open",
        DayAvailability::Unavailable { reason } => match reason {
            UnavailableReason::Holiday => "holiday",
            UnavailableReason::DayLocked => "day_locked",
            UnavailableReason::FullyBooked => "fully_booked",
            UnavailableReason::NoCapacity => "no_capacity",
        },
    }
}
