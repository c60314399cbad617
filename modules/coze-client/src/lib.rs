pub mod error;
pub mod types;

pub use error::{CozeError, Result};
pub use types::{WorkflowEvent, WorkflowRunRequest};

use std::pin::Pin;

use futures::{Stream, StreamExt};
use tracing::debug;

const BASE_URL: &str = "https://api.coze.cn";

/// Stream of typed workflow events, live for the duration of one run.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<WorkflowEvent>> + Send>>;

pub struct CozeClient {
    client: reqwest::Client,
    token: String,
    base_url: String,
}

impl CozeClient {
    pub fn new(token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.to_string();
        self
    }

    /// Start a streaming workflow run. Returns a stream of typed events that
    /// ends when the server closes the connection.
    pub async fn run_workflow(&self, request: &WorkflowRunRequest) -> Result<EventStream> {
        let url = format!("{}/v1/workflow/stream_run", self.base_url);

        debug!(workflow_id = %request.workflow_id, "Coze workflow run");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(request)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CozeError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let mut bytes = resp.bytes_stream();

        let stream = async_stream::stream! {
            let mut buffer = String::new();
            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        yield Err(CozeError::Stream(e.to_string()));
                        return;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(boundary) = frame_boundary(&buffer) {
                    let frame: String = buffer.drain(..boundary.end).take(boundary.start).collect();
                    if let Some(event) = parse_frame(&frame) {
                        yield Ok(event);
                    }
                }
            }
            // Server closed without a trailing blank line; flush the remainder.
            if let Some(event) = parse_frame(&buffer) {
                yield Ok(event);
            }
        };

        Ok(Box::pin(stream))
    }
}

/// Byte range of the next complete SSE frame in `buffer`: `start` is the
/// frame length, `end` includes the blank-line separator.
struct FrameBoundary {
    start: usize,
    end: usize,
}

fn frame_boundary(buffer: &str) -> Option<FrameBoundary> {
    let lf = buffer.find("\n\n").map(|i| (i, i + 2));
    let crlf = buffer.find("\r\n\r\n").map(|i| (i, i + 4));
    match (lf, crlf) {
        (Some((a, ae)), Some((b, _))) if a < b => Some(FrameBoundary { start: a, end: ae }),
        (Some(_), Some((b, be))) => Some(FrameBoundary { start: b, end: be }),
        (Some((a, ae)), None) => Some(FrameBoundary { start: a, end: ae }),
        (None, Some((b, be))) => Some(FrameBoundary { start: b, end: be }),
        (None, None) => None,
    }
}

/// Decode one SSE frame into a typed event. Returns None for frames with no
/// `event:` or `data:` fields (comments, keep-alives).
pub fn parse_frame(frame: &str) -> Option<WorkflowEvent> {
    let mut event_name: Option<&str> = None;
    let mut data_lines: Vec<&str> = Vec::new();

    for line in frame.lines() {
        if let Some(rest) = line.strip_prefix("event:") {
            event_name = Some(rest.trim());
        } else if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }

    let data = data_lines.join("\n");
    match event_name {
        Some(name) => Some(WorkflowEvent::from_frame(name, &data)),
        // Frames with data but no event name are messages per the SSE default.
        None if !data.is_empty() => Some(WorkflowEvent::from_frame("Message", &data)),
        None => None,
    }
}
