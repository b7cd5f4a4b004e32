//! SSE line framing shared by the stream converters. Upstream chunks arrive
//! as raw lines (one per SSE frame line); converters emit fully formed
//! frames for the caller's dialect.

use serde_json::Value;

/// Synthetic terminal chunk the executor feeds after upstream EOF.
pub const DONE_CHUNK: &str = "[DONE]";

/// `data: {...}\n\n`
pub fn data_frame(value: &Value) -> String {
    format!("data: {value}\n\n")
}

/// `event: <name>\ndata: {...}\n\n`
pub fn event_frame(event: &str, value: &Value) -> String {
    format!("event: {event}\ndata: {value}\n\n")
}

pub fn done_frame() -> String {
    "data: [DONE]\n\n".to_string()
}

/// Extracts the payload of a `data:` line. Comment lines, `event:` lines
/// and blank lines return `None`.
pub fn data_payload(line: &str) -> Option<&str> {
    let line = line.trim_end_matches(['\r', '\n']);
    let payload = line.strip_prefix("data:")?;
    Some(payload.trim_start())
}

/// True for the terminal sentinel, bare or framed.
pub fn is_done(line: &str) -> bool {
    let line = line.trim();
    line == DONE_CHUNK || data_payload(line) == Some(DONE_CHUNK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn data_payload_strips_prefix_only_on_data_lines() {
        assert_eq!(data_payload("data: {\"a\":1}"), Some("{\"a\":1}"));
        assert_eq!(data_payload("data:{\"a\":1}"), Some("{\"a\":1}"));
        assert_eq!(data_payload("event: ping"), None);
        assert_eq!(data_payload(": keep-alive"), None);
        assert_eq!(data_payload(""), None);
    }

    #[test]
    fn done_detection_accepts_bare_and_framed() {
        assert!(is_done("[DONE]"));
        assert!(is_done("data: [DONE]"));
        assert!(!is_done("data: {\"done\":true}"));
    }

    #[test]
    fn frames_end_with_blank_line() {
        assert_eq!(data_frame(&json!({"a": 1})), "data: {\"a\":1}\n\n");
        assert_eq!(
            event_frame("message_stop", &json!({"type": "message_stop"})),
            "event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n"
        );
    }
}
