//! Metric instrument factories for scripter-rs.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`,
//! so they are no-ops until telemetry export is initialized.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("scripter-rs")
}

/// Counter: sessions created on the backend.
pub fn sessions_created() -> Counter<u64> {
    meter()
        .u64_counter("scripter.sessions.created")
        .with_description("Number of generation sessions created")
        .build()
}

/// Counter: sessions that reached an end.
/// Labels: `outcome` ("card" | "not_found" | "protocol_error" | "transport_error" | "timeout").
pub fn sessions_finished() -> Counter<u64> {
    meter()
        .u64_counter("scripter.sessions.finished")
        .with_description("Number of generation sessions that ended")
        .build()
}

/// Counter: decoded stream events.
/// Labels: `kind`.
pub fn stream_frames() -> Counter<u64> {
    meter()
        .u64_counter("scripter.stream.frames")
        .with_description("Number of events received on generation streams")
        .build()
}

/// Counter: upload attempts.
/// Labels: `result` ("ok" | "error").
pub fn uploads() -> Counter<u64> {
    meter()
        .u64_counter("scripter.uploads")
        .with_description("Number of upload attempts")
        .build()
}

/// Histogram: time from session creation to its end.
pub fn session_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("scripter.session.duration_ms")
        .with_description("Generation session duration in milliseconds")
        .with_unit("ms")
        .build()
}
