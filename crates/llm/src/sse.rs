//! Shared SSE streaming infrastructure for provider adapters.
//!
//! Every provider follows the same pattern: receive a `reqwest::Response`,
//! buffer chunks, split on `\n\n`, extract `data:` payloads, and feed each
//! payload to a provider-specific parser that returns zero or more frames.

use crate::util::from_reqwest;
use chainreview_domain::error::Result;
use chainreview_domain::stream::{BoxStream, LlmFrame};

/// Extract complete `data:` payloads from an SSE buffer, draining consumed
/// bytes in place; any trailing partial event is left for the next call.
pub(crate) fn drain_data_lines(buffer: &mut String) -> Vec<String> {
    let mut data_lines = Vec::new();

    while let Some(pos) = buffer.find("\n\n") {
        let block: String = buffer.drain(..pos).collect();
        buffer.drain(..2);

        for line in block.lines() {
            let line = line.trim();
            if let Some(data) = line.strip_prefix("data:") {
                let data = data.trim();
                if !data.is_empty() {
                    data_lines.push(data.to_string());
                }
            }
        }
    }

    data_lines
}

/// Build a [`BoxStream`] of frames from an SSE `reqwest::Response` and a
/// provider-specific parser closure. `FnMut` rather than `Fn` since parsers
/// carry mutable state across calls (assembling a streamed tool call).
pub(crate) fn sse_response_stream<F>(response: reqwest::Response, mut parse_data: F) -> BoxStream<'static, Result<LlmFrame>>
where
    F: FnMut(&str) -> Vec<Result<LlmFrame>> + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut response = response;
        let mut buffer = String::new();
        let mut stop_emitted = false;

        loop {
            match response.chunk().await {
                Ok(Some(bytes)) => {
                    buffer.push_str(&String::from_utf8_lossy(&bytes));
                    let data_lines = drain_data_lines(&mut buffer);
                    for data in data_lines {
                        for frame in parse_data(&data) {
                            if matches!(&frame, Ok(LlmFrame::Stop { .. })) {
                                stop_emitted = true;
                            }
                            yield frame;
                        }
                    }
                }
                Ok(None) => {
                    if !buffer.trim().is_empty() {
                        buffer.push_str("\n\n");
                        let data_lines = drain_data_lines(&mut buffer);
                        for data in data_lines {
                            for frame in parse_data(&data) {
                                if matches!(&frame, Ok(LlmFrame::Stop { .. })) {
                                    stop_emitted = true;
                                }
                                yield frame;
                            }
                        }
                    }
                    break;
                }
                Err(e) => {
                    yield Err(from_reqwest(e));
                    break;
                }
            }
        }

        if !stop_emitted {
            yield Ok(LlmFrame::Stop { reason: chainreview_domain::stream::StopReason::EndTurn });
        }
    };

    Box::pin(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_single_complete_event() {
        let mut buf = String::from("event: message\ndata: {\"hello\":\"world\"}\n\n");
        let lines = drain_data_lines(&mut buf);
        assert_eq!(lines, vec!["{\"hello\":\"world\"}"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn drain_multiple_events() {
        let mut buf = String::from("data: first\n\ndata: second\n\n");
        let lines = drain_data_lines(&mut buf);
        assert_eq!(lines, vec!["first", "second"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn drain_partial_event_stays_in_buffer() {
        let mut buf = String::from("data: complete\n\ndata: partial");
        let lines = drain_data_lines(&mut buf);
        assert_eq!(lines, vec!["complete"]);
        assert_eq!(buf, "data: partial");
    }

    #[test]
    fn drain_skips_empty_data_lines() {
        let mut buf = String::from("data: \n\n");
        let lines = drain_data_lines(&mut buf);
        assert!(lines.is_empty());
    }

    #[test]
    fn drain_ignores_non_data_lines() {
        let mut buf = String::from("event: ping\nid: 42\nretry: 5000\ndata: payload\n\n");
        let lines = drain_data_lines(&mut buf);
        assert_eq!(lines, vec!["payload"]);
    }
}
