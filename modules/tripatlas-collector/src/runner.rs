//! Bounded-retry driver around the streaming workflow call.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use serde_json::Value;
use tracing::{debug, info, warn};

use coze_client::{CozeClient, EventStream, WorkflowEvent, WorkflowRunRequest};
use tripatlas_common::ApiCallRecord;

pub const MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(2000);

/// Source of workflow event streams. Implemented by the real client;
/// scripted in tests.
#[async_trait]
pub trait WorkflowSource: Send + Sync {
    async fn open(&self, request: &WorkflowRunRequest) -> coze_client::Result<EventStream>;
}

#[async_trait]
impl WorkflowSource for CozeClient {
    async fn open(&self, request: &WorkflowRunRequest) -> coze_client::Result<EventStream> {
        self.run_workflow(request).await
    }
}

/// Outcome of a full run, after retries.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub success: bool,
    pub data: Option<Value>,
    pub error: Option<String>,
}

/// Run outcome plus the per-attempt timing log and the request that was sent.
#[derive(Debug)]
pub struct RunReport {
    pub result: RunResult,
    pub api_calls: Vec<ApiCallRecord>,
    pub request: Value,
}

enum AttemptOutcome {
    Data(Value),
    NoData,
}

pub struct WorkflowRunner<S> {
    source: S,
    workflow_id: String,
    base_delay: Duration,
}

impl<S: WorkflowSource> WorkflowRunner<S> {
    pub fn new(source: S, workflow_id: impl Into<String>) -> Self {
        Self {
            source,
            workflow_id: workflow_id.into(),
            base_delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// Override the backoff base. The wait before attempt n+1 is n * base.
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// The request a run for this city would send. Exposed so the pipeline
    /// can persist it before the call resolves.
    pub fn request_for(&self, city_name: &str) -> WorkflowRunRequest {
        WorkflowRunRequest::for_city(&self.workflow_id, city_name)
    }

    /// Run the workflow for a city with up to three attempts. Transport and
    /// upstream Error events are retried; a clean completion that carries no
    /// payload is a semantic failure and is returned immediately.
    pub async fn run(&self, city_name: &str) -> RunReport {
        self.run_request(self.request_for(city_name)).await
    }

    async fn run_request(&self, request: WorkflowRunRequest) -> RunReport {
        let city_name = request.parameters["city"].as_str().unwrap_or("").to_string();
        let request_json = serde_json::to_value(&request).unwrap_or(Value::Null);

        let mut api_calls = Vec::new();
        let mut last_error = String::new();

        for attempt in 1..=MAX_ATTEMPTS {
            let started_at = Utc::now();
            let outcome = self.attempt(&request).await;
            let ended_at = Utc::now();
            let duration_ms = (ended_at - started_at).num_milliseconds();

            match outcome {
                Ok(AttemptOutcome::Data(data)) => {
                    api_calls.push(ApiCallRecord {
                        started_at,
                        ended_at,
                        duration_ms,
                        success: true,
                        error: None,
                    });
                    info!(attempt, city = %city_name, "Workflow run succeeded");
                    return RunReport {
                        result: RunResult {
                            success: true,
                            data: Some(data),
                            error: None,
                        },
                        api_calls,
                        request: request_json,
                    };
                }
                Ok(AttemptOutcome::NoData) => {
                    let message = "workflow completed with no data".to_string();
                    api_calls.push(ApiCallRecord {
                        started_at,
                        ended_at,
                        duration_ms,
                        success: false,
                        error: Some(message.clone()),
                    });
                    warn!(attempt, city = %city_name, "Workflow completed without a payload");
                    return RunReport {
                        result: RunResult {
                            success: false,
                            data: None,
                            error: Some(message),
                        },
                        api_calls,
                        request: request_json,
                    };
                }
                Err(message) => {
                    warn!(attempt, city = %city_name, error = %message, "Workflow attempt failed");
                    api_calls.push(ApiCallRecord {
                        started_at,
                        ended_at,
                        duration_ms,
                        success: false,
                        error: Some(message.clone()),
                    });
                    last_error = message;
                }
            }

            if attempt < MAX_ATTEMPTS {
                tokio::time::sleep(self.base_delay * attempt).await;
            }
        }

        RunReport {
            result: RunResult {
                success: false,
                data: None,
                error: Some(last_error),
            },
            api_calls,
            request: request_json,
        }
    }

    /// One streaming attempt. Message content is held last-write-wins; Done
    /// data, when present, overrides it.
    async fn attempt(&self, request: &WorkflowRunRequest) -> Result<AttemptOutcome, String> {
        let mut stream = self
            .source
            .open(request)
            .await
            .map_err(|e| e.to_string())?;

        let mut held: Option<Value> = None;

        while let Some(event) = stream.next().await {
            match event {
                Ok(WorkflowEvent::Message { content }) => {
                    held = Some(content);
                }
                Ok(WorkflowEvent::Done { data }) => {
                    if let Some(data) = data {
                        held = Some(data);
                    }
                    return Ok(finish(held));
                }
                Ok(WorkflowEvent::Error { message }) => {
                    return Err(message);
                }
                Ok(WorkflowEvent::Interrupt { event_id }) => {
                    // Interrupts are not resumed; the run keeps consuming.
                    warn!(?event_id, "Workflow interrupt event received, not resumed");
                }
                Ok(WorkflowEvent::Unknown { event }) => {
                    debug!(event = %event, "Skipping unknown workflow event");
                }
                Err(e) => {
                    return Err(e.to_string());
                }
            }
        }

        // Server closed the stream without a Done frame.
        Ok(finish(held))
    }
}

fn finish(held: Option<Value>) -> AttemptOutcome {
    match held {
        Some(data) => AttemptOutcome::Data(data),
        None => AttemptOutcome::NoData,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coze_client::CozeError;
    use serde_json::json;
    use std::sync::Mutex;

    /// Replays one scripted event list per attempt.
    struct ScriptedSource {
        attempts: Mutex<Vec<Vec<coze_client::Result<WorkflowEvent>>>>,
    }

    impl ScriptedSource {
        fn new(attempts: Vec<Vec<coze_client::Result<WorkflowEvent>>>) -> Self {
            Self {
                attempts: Mutex::new(attempts),
            }
        }
    }

    #[async_trait]
    impl WorkflowSource for ScriptedSource {
        async fn open(
            &self,
            _request: &WorkflowRunRequest,
        ) -> coze_client::Result<EventStream> {
            let mut attempts = self.attempts.lock().unwrap();
            let events = if attempts.is_empty() {
                Vec::new()
            } else {
                attempts.remove(0)
            };
            Ok(Box::pin(futures::stream::iter(events)))
        }
    }

    fn error_event(message: &str) -> coze_client::Result<WorkflowEvent> {
        Ok(WorkflowEvent::Error {
            message: message.to_string(),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_third_attempt_after_two_backoff_delays() {
        let source = ScriptedSource::new(vec![
            vec![error_event("boom 1")],
            vec![error_event("boom 2")],
            vec![
                Ok(WorkflowEvent::Message {
                    content: json!({"city": "Paris"}),
                }),
                Ok(WorkflowEvent::Done { data: None }),
            ],
        ]);
        let runner = WorkflowRunner::new(source, "wf-1");

        let start = tokio::time::Instant::now();
        let report = runner.run("Paris").await;

        // 1 * 2s after the first failure, 2 * 2s after the second.
        assert_eq!(start.elapsed(), Duration::from_millis(6000));
        assert!(report.result.success);
        assert_eq!(report.result.data, Some(json!({"city": "Paris"})));
        assert_eq!(report.api_calls.len(), 3);
        assert!(!report.api_calls[0].success);
        assert!(!report.api_calls[1].success);
        assert!(report.api_calls[2].success);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_three_attempts_without_trailing_delay() {
        let source = ScriptedSource::new(vec![
            vec![error_event("boom 1")],
            vec![error_event("boom 2")],
            vec![error_event("boom 3")],
        ]);
        let runner = WorkflowRunner::new(source, "wf-1");

        let start = tokio::time::Instant::now();
        let report = runner.run("Paris").await;

        assert_eq!(start.elapsed(), Duration::from_millis(6000));
        assert!(!report.result.success);
        assert_eq!(report.result.error.as_deref(), Some("boom 3"));
        assert_eq!(report.api_calls.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn no_data_completion_is_not_retried() {
        let source = ScriptedSource::new(vec![vec![Ok(WorkflowEvent::Done { data: None })]]);
        let runner = WorkflowRunner::new(source, "wf-1");

        let start = tokio::time::Instant::now();
        let report = runner.run("Paris").await;

        assert_eq!(start.elapsed(), Duration::ZERO);
        assert!(!report.result.success);
        assert_eq!(
            report.result.error.as_deref(),
            Some("workflow completed with no data")
        );
        assert_eq!(report.api_calls.len(), 1);
    }

    #[tokio::test]
    async fn done_data_overrides_held_message_content() {
        let source = ScriptedSource::new(vec![vec![
            Ok(WorkflowEvent::Message {
                content: json!({"partial": true}),
            }),
            Ok(WorkflowEvent::Done {
                data: Some(json!({"final": true})),
            }),
        ]]);
        let runner = WorkflowRunner::new(source, "wf-1");

        let report = runner.run("Paris").await;
        assert_eq!(report.result.data, Some(json!({"final": true})));
    }

    #[tokio::test]
    async fn latest_message_wins() {
        let source = ScriptedSource::new(vec![vec![
            Ok(WorkflowEvent::Message { content: json!(1) }),
            Ok(WorkflowEvent::Message { content: json!(2) }),
            Ok(WorkflowEvent::Done { data: None }),
        ]]);
        let runner = WorkflowRunner::new(source, "wf-1");

        let report = runner.run("Paris").await;
        assert_eq!(report.result.data, Some(json!(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn transport_errors_are_retried() {
        let source = ScriptedSource::new(vec![
            vec![Err(CozeError::Stream("connection reset".to_string()))],
            vec![
                Ok(WorkflowEvent::Message {
                    content: json!({"ok": true}),
                }),
                Ok(WorkflowEvent::Done { data: None }),
            ],
        ]);
        let runner = WorkflowRunner::new(source, "wf-1");

        let report = runner.run("Paris").await;
        assert!(report.result.success);
        assert_eq!(report.api_calls.len(), 2);
        assert_eq!(
            report.api_calls[0].error.as_deref(),
            Some("Stream error: connection reset")
        );
    }

    #[tokio::test]
    async fn stream_exhaustion_resolves_with_held_content() {
        let source = ScriptedSource::new(vec![vec![Ok(WorkflowEvent::Message {
            content: json!({"city": "Paris"}),
        })]]);
        let runner = WorkflowRunner::new(source, "wf-1");

        let report = runner.run("Paris").await;
        assert!(report.result.success);
        assert_eq!(report.result.data, Some(json!({"city": "Paris"})));
    }
}
