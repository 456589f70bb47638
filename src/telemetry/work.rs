//! Work item span helpers.
//!
//! Provides span creation and state-transition recording for work items
//! flowing through the dispatch queue.

use tracing::Span;

use crate::model::{JobId, State};

/// Start a span for one dispatch attempt of a work item.
///
/// The `work.state` field is declared empty and can be updated via
/// [`record_state_transition`].
pub fn start_work_span(job: JobId, asset_id: &str, attempt: u32) -> Span {
    tracing::info_span!(
        "work.dispatch",
        "work.job" = %job,
        "work.asset_id" = asset_id,
        "work.attempt" = attempt,
        "work.state" = tracing::field::Empty,
    )
}

/// Record a state transition on the given span.
pub fn record_state_transition(span: &Span, from: State, to: State) {
    span.record("work.state", tracing::field::display(to));
    span.in_scope(|| {
        tracing::debug!(from = %from, to = %to, "state_transition");
    });
}
