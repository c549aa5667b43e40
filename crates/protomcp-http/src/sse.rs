//! Pure SSE wire framing: no I/O, just `StoredEvent` <-> `text/event-stream`
//! bytes (§6 "Streamable HTTP wire format").
//!
//! A standalone encoder/decoder so the id/event/data/retry fields are
//! under our control; callers still hand the result to
//! `axum::response::sse::Event` at the call site, this module only owns
//! the *shape* of what goes into one.

use crate::event_store::StoredEvent;

/// The SSE `event:` field MCP streams carry. Everything on this transport
/// is a JSON-RPC envelope, so one literal event type covers every frame.
pub const EVENT_TYPE_MESSAGE: &str = "message";

/// Render one stored event as an `axum::response::sse::Event`.
///
/// The event id is the stringified `event_id`, matching the `Last-Event-ID`
/// header clients replay from (§4.5 Resumability).
pub fn to_sse_event(stored: &StoredEvent) -> axum::response::sse::Event {
    axum::response::sse::Event::default()
        .id(stored.event_id.to_string())
        .event(EVENT_TYPE_MESSAGE)
        .data(stored.data.to_string())
}

/// Parse a `Last-Event-ID` header value into the cursor `replay` expects.
///
/// Returns `0` (replay everything) for a missing or unparsable header.
pub fn parse_last_event_id(header_value: Option<&str>) -> u64 {
    header_value
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_valid_last_event_id() {
        assert_eq!(parse_last_event_id(Some("42")), 42);
    }

    #[test]
    fn missing_header_replays_from_zero() {
        assert_eq!(parse_last_event_id(None), 0);
    }

    #[test]
    fn garbage_header_replays_from_zero() {
        assert_eq!(parse_last_event_id(Some("not-a-number")), 0);
    }

    #[test]
    fn whitespace_is_trimmed() {
        assert_eq!(parse_last_event_id(Some(" 7 ")), 7);
    }
}
