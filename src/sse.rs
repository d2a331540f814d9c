//! Server-sent-event framing for generation events.
//!
//! Each event becomes `event: <name>\ndata: <json>\n\n`. The JSON payload is
//! always a single line.

use std::convert::Infallible;

use futures::{Stream, StreamExt};
use tracing::error;

use crate::orchestration::{EventStream, GenerationEvent};

pub const CONTENT_TYPE: &str = "text/event-stream";

/// Encode one event as an SSE frame.
pub fn encode_frame(event: &GenerationEvent) -> String {
    match event.data() {
        Ok(data) => format!("event: {}\ndata: {}\n\n", event.name(), data),
        Err(e) => {
            error!(event = event.name(), error = %e, "Failed to encode event payload");
            let fallback = serde_json::json!({ "message": format!("failed to encode {} event", event.name()) });
            format!("event: error\ndata: {}\n\n", fallback)
        }
    }
}

/// Turn a batch's events into SSE frames, pulled one at a time.
pub fn frame_stream(events: EventStream) -> impl Stream<Item = Result<String, Infallible>> + Send + 'static {
    events.map(|event| Ok(encode_frame(&event)))
}

/// Parse frames back into `(event, data)` pairs. Used by clients and tests.
pub fn parse_frames(body: &str) -> Vec<(String, serde_json::Value)> {
    body.split("\n\n")
        .filter_map(|frame| {
            let mut name = None;
            let mut data = None;
            for line in frame.lines() {
                if let Some(value) = line.strip_prefix("event: ") {
                    name = Some(value.to_string());
                } else if let Some(value) = line.strip_prefix("data: ") {
                    data = serde_json::from_str(value).ok();
                }
            }
            Some((name?, data?))
        })
        .collect()
}
