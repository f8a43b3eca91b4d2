//! General utilities shared across the crate.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::protocol_constants::MAX_FRAME_PREVIEW_CHARS;

// ─────────────────────────────────────────────────────────────────────────────
// Time Utilities
// ─────────────────────────────────────────────────────────────────────────────

/// Returns the current Unix timestamp in milliseconds.
///
/// Returns 0 if the system clock is before the Unix epoch (shouldn't happen in practice).
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ─────────────────────────────────────────────────────────────────────────────
// Log Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Shortens an inbound frame for log output.
///
/// Cuts on a character boundary and appends an ellipsis when the frame is
/// longer than [`MAX_FRAME_PREVIEW_CHARS`].
#[must_use]
pub fn frame_preview(frame: &str) -> String {
    let mut chars = frame.chars();
    let preview: String = chars.by_ref().take(MAX_FRAME_PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{}…", preview)
    } else {
        preview
    }
}
