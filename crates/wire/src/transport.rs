//! The dual-stream transport: primary request/response framing plus the
//! side event stream, with a sentinel-ordering guarantee
//! ("all side-stream events for a request, then its sentinel, then the
//! primary response").
//!
//! No literal teacher analog exists for two independent byte streams (the
//! teacher multiplexes everything over one WebSocket) — see DESIGN.md
//! decision 4. `ChainReviewTransport` is generic over its two outbound
//! sinks so tests exercise it over in-memory duplex pipes; `main.rs` wires
//! stdout as the primary sink and file descriptor 3 (falling back to a
//! tagged single stream) as the side sink.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::oneshot;

use chainreview_domain::config::Limits;
use chainreview_domain::error::{Error, Result};

use crate::envelope::{is_long_running, Request, Response};
use crate::event::{Event, StreamEnvelope};

const SENTINEL_SAFETY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct ChainReviewTransport<W1, W2> {
    primary_out: tokio::sync::Mutex<W1>,
    side_out: tokio::sync::Mutex<W2>,
    limits: Limits,
    sentinel_waiters: Mutex<HashMap<i64, oneshot::Sender<()>>>,
}

impl<W1: AsyncWrite + Unpin + Send, W2: AsyncWrite + Unpin + Send> ChainReviewTransport<W1, W2> {
    pub fn new(primary_out: W1, side_out: W2, limits: Limits) -> Self {
        Self {
            primary_out: tokio::sync::Mutex::new(primary_out),
            side_out: tokio::sync::Mutex::new(side_out),
            limits,
            sentinel_waiters: Mutex::new(HashMap::new()),
        }
    }

    /// Register intent to wait for the sentinel of `request_id`. Must be
    /// called before the request's handler starts emitting side events.
    pub fn register_sentinel(&self, request_id: i64) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.sentinel_waiters.lock().insert(request_id, tx);
        rx
    }

    /// Block until the sentinel for `request_id` has been written, or the
    /// safety timer fires (which surfaces as an error rather than silently
    /// proceeding — see DESIGN.md decision 2).
    pub async fn await_sentinel(&self, rx: oneshot::Receiver<()>) -> Result<()> {
        match tokio::time::timeout(SENTINEL_SAFETY_TIMEOUT, rx).await {
            Ok(Ok(())) => Ok(()),
            _ => Err(Error::Internal("sentinel for request never arrived".into())),
        }
    }

    /// Write one side-stream event. Oversized payloads are truncated in
    /// place, never dropped.
    pub async fn send_event(&self, mut event: Event) -> Result<()> {
        truncate_oversized(&mut event, self.limits.max_event_payload_bytes);
        if let Event::Sentinel { request_id, .. } = &event {
            if let Some(tx) = self.sentinel_waiters.lock().remove(request_id) {
                let _ = tx.send(());
            }
        }
        let envelope: StreamEnvelope = event.into();
        let line = serde_json::to_string(&envelope)?;
        let mut out = self.side_out.lock().await;
        out.write_all(line.as_bytes()).await?;
        out.write_all(b"\n").await?;
        out.flush().await?;
        Ok(())
    }

    /// Write the primary response for a request. The write side is
    /// serialized by the mutex so frames never interleave byte-wise.
    pub async fn send_response(&self, response: Response) -> Result<()> {
        let line = serde_json::to_string(&response)?;
        let mut out = self.primary_out.lock().await;
        out.write_all(line.as_bytes()).await?;
        out.write_all(b"\n").await?;
        out.flush().await?;
        Ok(())
    }

    pub fn deadline_for(&self, method: &str) -> Duration {
        if is_long_running(method) {
            Duration::from_secs(self.limits.long_request_deadline_secs)
        } else {
            Duration::from_secs(self.limits.short_request_deadline_secs)
        }
    }
}

/// Read one newline-delimited JSON request at a time from `reader`. Blank
/// lines are skipped; a malformed line is reported but does not kill the
/// loop (the process stays alive across requests: only primary-stream I/O
/// errors are fatal, not malformed individual requests).
pub async fn read_requests<R: tokio::io::AsyncRead + Unpin>(
    reader: R,
    mut on_request: impl FnMut(std::result::Result<Request, serde_json::Error>),
) -> std::io::Result<()> {
    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        on_request(serde_json::from_str::<Request>(trimmed));
    }
    Ok(())
}

fn truncate_oversized(event: &mut Event, max_bytes: usize) {
    use crate::event::truncate_summary;
    match event {
        Event::TextDelta { delta, .. } | Event::ThinkingDelta { delta, .. } => {
            if delta.len() > max_bytes {
                *delta = truncate_summary(delta, max_bytes);
            }
        }
        Event::ToolCallEnd { result_summary, .. } => {
            if result_summary.len() > max_bytes {
                *result_summary = truncate_summary(result_summary, max_bytes);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainreview_domain::model::AgentName;
    use tokio::io::duplex;

    fn test_transport() -> ChainReviewTransport<tokio::io::DuplexStream, tokio::io::DuplexStream> {
        let (primary, primary_peer) = duplex(4096);
        let (side, side_peer) = duplex(4096);
        std::mem::forget(primary_peer);
        std::mem::forget(side_peer);
        ChainReviewTransport::new(primary, side, Limits::default())
    }

    #[tokio::test]
    async fn sentinel_wakes_waiter() {
        let t = test_transport();
        let rx = t.register_sentinel(42);
        t.send_event(Event::Sentinel { request_id: 42, name: "chatStreamComplete".into() }).await.unwrap();
        t.await_sentinel(rx).await.unwrap();
    }

    #[tokio::test]
    async fn sentinel_safety_timer_errors_instead_of_hanging() {
        let t = test_transport();
        let rx = t.register_sentinel(1);
        // no one ever sends the sentinel for request 1
        drop(rx); // dropping early still exercises the oneshot's Err path
        let rx2 = t.register_sentinel(2);
        let res = tokio::time::timeout(Duration::from_millis(50), t.await_sentinel(rx2)).await;
        // our own timeout (50ms) fires before the 5s safety timer; that's fine,
        // it proves await_sentinel doesn't resolve Ok without a real sentinel.
        assert!(res.is_err());
    }

    #[tokio::test]
    async fn oversized_tool_result_summary_is_truncated_not_dropped() {
        let (primary, _primary_peer) = duplex(4096);
        let (side, _side_peer) = duplex(4096);
        let mut limits = Limits::default();
        limits.max_event_payload_bytes = 4;
        let t = ChainReviewTransport::new(primary, side, limits);
        let big = "x".repeat(10);
        t.send_event(Event::ToolCallEnd {
            run_id: "r".into(), agent: AgentName::Security, call_id: "c".into(), tool: "exec_command".into(),
            ok: true, result_summary: big,
        }).await.unwrap();
    }
}
