//! Video conversion span helpers.
//!
//! Provides span creation and status-transition recording for videos
//! flowing through the converter.

use tracing::Span;
use uuid::Uuid;

/// Start a span for one video conversion.
///
/// The `video.output_files` field is declared empty and can be filled via
/// [`record_output_files`].
pub fn start_conversion_span(video_id: &Uuid) -> Span {
    tracing::info_span!(
        "video.convert",
        "video.id" = %video_id,
        "video.output_files" = tracing::field::Empty,
    )
}

/// Record a status transition event on the given span.
pub fn record_status_transition(span: &Span, from: &str, to: &str) {
    span.in_scope(|| {
        tracing::info!(from = from, to = to, "status_transition");
    });
}

/// Record how many files the conversion produced.
pub fn record_output_files(span: &Span, count: usize) {
    span.record("video.output_files", count as u64);
}
