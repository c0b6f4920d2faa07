//! Generation session span helpers.

use tracing::Span;

use crate::model::SessionId;

/// Start a span covering one generation session.
///
/// `session.state` is declared empty and updated by
/// [`record_state_transition`]; `session.outcome` is filled when the
/// session ends.
pub fn start_session_span(session_id: &SessionId) -> Span {
    tracing::info_span!(
        "generate.session",
        "session.id" = %session_id,
        "session.state" = tracing::field::Empty,
        "session.outcome" = tracing::field::Empty,
    )
}

/// Record a state change of the session's stream.
pub fn record_state_transition(span: &Span, from: &str, to: &str) {
    span.record("session.state", to);
    span.in_scope(|| {
        tracing::info!(from = from, to = to, "state_transition");
    });
}

/// Record how the session ended.
pub fn record_outcome(span: &Span, outcome: &str) {
    span.record("session.outcome", outcome);
}
