//! Server-Sent Events (SSE) utilities
//!
//! Shared SSE helpers for Musicasua HTTP handlers.

use axum::response::sse::{Event, KeepAlive};
use serde::Serialize;
use std::time::Duration;
use tracing::warn;

/// Heartbeat interval for long-lived event streams
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Keep-alive comments so proxies do not close idle streams
pub fn heartbeat_keep_alive() -> KeepAlive {
    KeepAlive::new().interval(HEARTBEAT_INTERVAL).text("heartbeat")
}

/// Serialize `value` into a `data: {json}` event
///
/// Returns `None` (after logging) if the value cannot be serialized; a bad
/// payload must not tear down the whole stream.
pub fn json_event<T: Serialize>(value: &T) -> Option<Event> {
    match Event::default().json_data(value) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!("SSE: Failed to serialize event payload: {}", e);
            None
        }
    }
}
