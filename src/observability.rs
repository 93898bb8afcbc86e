use std::net::SocketAddr;

use crate::wire::Request;

// ── Reservation metrics ─────────────────────────────────────────

/// Counter: holds placed.
pub const HOLDS_PLACED_TOTAL: &str = "holdfast_holds_placed_total";

/// Counter: holds reverted to available. Labels: reason.
pub const HOLDS_RELEASED_TOTAL: &str = "holdfast_holds_released_total";

/// Gauge: hold timers waiting to fire.
pub const HOLD_TIMERS_PENDING: &str = "holdfast_hold_timers_pending";

/// Counter: bookings confirmed. Labels: kind.
pub const BOOKINGS_CONFIRMED_TOTAL: &str = "holdfast_bookings_confirmed_total";

/// Counter: bookings cancelled. Labels: kind.
pub const BOOKINGS_CANCELLED_TOTAL: &str = "holdfast_bookings_cancelled_total";

/// Counter: rejected state transitions. Labels: reason.
pub const CONFLICTS_TOTAL: &str = "holdfast_conflicts_total";

/// Counter: payments the authorizer declined.
pub const PAYMENTS_DECLINED_TOTAL: &str = "holdfast_payments_declined_total";

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total commands executed. Labels: command, status.
pub const COMMANDS_TOTAL: &str = "holdfast_commands_total";

/// Histogram: command latency in seconds. Labels: command.
pub const COMMAND_DURATION_SECONDS: &str = "holdfast_command_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "holdfast_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "holdfast_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "holdfast_connections_rejected_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map a Request variant to a short label for metrics.
pub fn command_label(req: &Request) -> &'static str {
    match req {
        Request::Register { .. } => "register",
        Request::Resources => "resources",
        Request::Hold { .. } => "hold",
        Request::HoldMany { .. } => "hold_many",
        Request::Confirm { .. } => "confirm",
        Request::Release { .. } => "release",
        Request::CancelSeat { .. } => "cancel_seat",
        Request::Book { .. } => "book",
        Request::CancelRange { .. } => "cancel_range",
        Request::Complete { .. } => "complete",
        Request::GetBooking { .. } => "get_booking",
        Request::HolderBookings { .. } => "holder_bookings",
        Request::ResourceBookings { .. } => "resource_bookings",
        Request::SeatStatus { .. } => "seat_status",
        Request::AvailableSeats => "available_seats",
        Request::Availability { .. } => "availability",
        Request::AverageRating { .. } => "average_rating",
        Request::Listen { .. } => "listen",
        Request::Unlisten { .. } => "unlisten",
    }
}
