use serde::Serialize;
use serde_json::Value;

/// Input for a streaming workflow run.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowRunRequest {
    pub workflow_id: String,
    pub parameters: Value,
}

impl WorkflowRunRequest {
    /// Build a run request with a single `city` parameter, the shape the
    /// collection workflows expect.
    pub fn for_city(workflow_id: &str, city: &str) -> Self {
        Self {
            workflow_id: workflow_id.to_string(),
            parameters: serde_json::json!({ "city": city }),
        }
    }
}

/// A typed event from the workflow's SSE stream.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowEvent {
    /// Incremental or full message output from a workflow node.
    Message { content: Value },
    /// The workflow finished. `data` carries the final payload when present.
    Done { data: Option<Value> },
    /// The workflow reported a failure.
    Error { message: String },
    /// The workflow paused waiting for external input. Carries the resume
    /// event id when the API provides one.
    Interrupt { event_id: Option<String> },
    /// An event name this client does not recognize. Callers skip these.
    Unknown { event: String },
}

impl WorkflowEvent {
    /// Decode one SSE frame (its `event:` name and joined `data:` payload)
    /// into a typed event.
    pub fn from_frame(event: &str, data: &str) -> WorkflowEvent {
        let parsed: Option<Value> = serde_json::from_str(data).ok();

        match event {
            "Message" => {
                let content = match parsed {
                    Some(Value::Object(obj)) => match obj.get("content") {
                        Some(c) => c.clone(),
                        None => Value::Object(obj),
                    },
                    Some(v) => v,
                    None => Value::String(data.to_string()),
                };
                WorkflowEvent::Message { content }
            }
            "Done" => {
                let data = match parsed {
                    Some(Value::Object(obj)) if obj.is_empty() => None,
                    Some(Value::Object(obj)) => Some(
                        obj.get("data")
                            .cloned()
                            .unwrap_or(Value::Object(obj)),
                    ),
                    Some(v) => Some(v),
                    None if data.trim().is_empty() || data.trim() == "[DONE]" => None,
                    None => Some(Value::String(data.to_string())),
                };
                WorkflowEvent::Done { data }
            }
            "Error" => {
                let message = parsed
                    .as_ref()
                    .and_then(|v| {
                        v.get("error_message")
                            .or_else(|| v.get("message"))
                            .and_then(Value::as_str)
                            .map(str::to_string)
                    })
                    .unwrap_or_else(|| data.to_string());
                WorkflowEvent::Error { message }
            }
            "Interrupt" => {
                let event_id = parsed
                    .as_ref()
                    .and_then(|v| {
                        v.pointer("/interrupt_data/event_id")
                            .or_else(|| v.get("event_id"))
                    })
                    .and_then(Value::as_str)
                    .map(str::to_string);
                WorkflowEvent::Interrupt { event_id }
            }
            other => WorkflowEvent::Unknown {
                event: other.to_string(),
            },
        }
    }
}
