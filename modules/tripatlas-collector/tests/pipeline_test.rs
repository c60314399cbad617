//! End-to-end pipeline tests against a real Postgres.
//! Requires a Postgres instance. Set DATABASE_TEST_URL or the gated tests
//! are skipped. The workflow side is always scripted.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use sqlx::PgPool;
use tokio::sync::Notify;

use coze_client::{EventStream, WorkflowEvent, WorkflowRunRequest};
use tripatlas_collector::{parser, Collector, WorkflowRunner, WorkflowSource};
use tripatlas_common::{AtlasError, DataType};
use tripatlas_store::{AtlasStore, ReviewFilter};

async fn test_pool() -> Option<PgPool> {
    let url = std::env::var("DATABASE_TEST_URL").ok()?;
    let pool = PgPool::connect(&url).await.ok()?;

    AtlasStore::new(pool.clone()).migrate().await.ok()?;

    // Clean slate for each test
    sqlx::query(
        "TRUNCATE collection_tasks, reviews, attractions, restaurants, hotels, city_overviews, cities CASCADE",
    )
    .execute(&pool)
    .await
    .ok()?;

    Some(pool)
}

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

    /// One attempt that emits a Message payload and a bare Done.
    fn message(content: serde_json::Value) -> Self {
        Self::new(vec![vec![
            Ok(WorkflowEvent::Message { content }),
            Ok(WorkflowEvent::Done { data: None }),
        ]])
    }
}

#[async_trait]
impl WorkflowSource for ScriptedSource {
    async fn open(&self, _request: &WorkflowRunRequest) -> coze_client::Result<EventStream> {
        let mut attempts = self.attempts.lock().unwrap();
        let events = if attempts.is_empty() {
            Vec::new()
        } else {
            attempts.remove(0)
        };
        Ok(Box::pin(futures::stream::iter(events)))
    }
}

/// Blocks every attempt until released, then completes without data.
struct GatedSource {
    release: Arc<Notify>,
}

#[async_trait]
impl WorkflowSource for GatedSource {
    async fn open(&self, _request: &WorkflowRunRequest) -> coze_client::Result<EventStream> {
        self.release.notified().await;
        Ok(Box::pin(futures::stream::iter(vec![Ok(
            WorkflowEvent::Done { data: None },
        )])))
    }
}

fn pending_filter() -> ReviewFilter {
    ReviewFilter {
        page: 1,
        limit: 20,
        ..Default::default()
    }
}

#[tokio::test]
async fn overview_run_files_one_review_with_flattened_payload() {
    let Some(pool) = test_pool().await else { return };
    let store = AtlasStore::new(pool);

    let source = ScriptedSource::message(json!(
        r#"{"city":"Testville","content":{"history":{"content":"H"}}}"#
    ));
    let collector = Collector::new(store.clone(), WorkflowRunner::new(source, "wf-1"));

    let stats = collector
        .run_once("Testville", DataType::CityOverview)
        .await
        .unwrap();

    assert_eq!(stats.records_parsed, 1);
    assert_eq!(stats.reviews_filed, 1);
    assert_eq!(stats.overviews, 1);
    assert_eq!(stats.workflow_attempts, 1);

    let (tasks, total) = store.list_tasks(1, 10).await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(tasks[0].status, "completed");
    assert_eq!(tasks[0].progress, 100);

    let task = store.get_task(tasks[0].id).await.unwrap().unwrap();
    assert!(task.request.is_some());
    assert!(task.response.is_some());
    assert!(task.parse_error.is_none());
    assert_eq!(task.stats.unwrap()["record_count"], json!(1));
    let steps = task.steps.as_array().unwrap();
    assert_eq!(steps[0]["step"], json!("dispatch"));

    let (reviews, _) = store.list_reviews(&pending_filter()).await.unwrap();
    assert_eq!(reviews.len(), 1);
    let review = &reviews[0];
    assert_eq!(review.status, "pending");
    assert_eq!(review.data_type, "city_overview");
    assert_eq!(review.city_name, "Testville");
    assert_eq!(review.task_id, Some(task.id));
    assert_eq!(review.payload["city"], json!("Testville"));
    assert_eq!(review.payload["history"]["content"], json!("H"));
    assert_eq!(review.payload["pictures"], json!([]));
}

#[tokio::test]
async fn attraction_run_routes_each_record_by_its_markers() {
    let Some(pool) = test_pool().await else { return };
    let store = AtlasStore::new(pool);

    let source = ScriptedSource::message(json!([
        {"name": "断桥", "category": "景点", "ticketPrice": "¥40"},
        {"name": "楼外楼", "cuisine": "杭帮菜"}
    ]));
    let collector = Collector::new(store.clone(), WorkflowRunner::new(source, "wf-1"));

    let stats = collector.run_once("杭州", DataType::Attraction).await.unwrap();

    assert_eq!(stats.records_parsed, 2);
    assert_eq!(stats.reviews_filed, 2);
    assert_eq!(stats.attractions, 1);
    assert_eq!(stats.restaurants, 1);

    let (reviews, _) = store.list_reviews(&pending_filter()).await.unwrap();
    assert_eq!(reviews.len(), 2);
    let mut types: Vec<_> = reviews.iter().map(|r| r.data_type.as_str()).collect();
    types.sort();
    assert_eq!(types, vec!["attraction", "restaurant"]);
    // No city key in the records, so the run's city carries over.
    assert!(reviews.iter().all(|r| r.city_name == "杭州"));
}

#[tokio::test]
async fn failed_workflow_marks_the_task_failed_with_attempt_log() {
    let Some(pool) = test_pool().await else { return };
    let store = AtlasStore::new(pool);

    let boom = || {
        vec![Ok(WorkflowEvent::Error {
            message: "boom".to_string(),
        })]
    };
    let source = ScriptedSource::new(vec![boom(), boom(), boom()]);
    let runner = WorkflowRunner::new(source, "wf-1").with_base_delay(Duration::ZERO);
    let collector = Collector::new(store.clone(), runner);

    let err = collector
        .run_once("杭州", DataType::Attraction)
        .await
        .unwrap_err();
    assert!(matches!(err, AtlasError::Workflow(_)));

    let (tasks, _) = store.list_tasks(1, 10).await.unwrap();
    assert_eq!(tasks[0].status, "failed");
    assert!(tasks[0].error.as_deref().unwrap().contains("boom"));

    let task = store.get_task(tasks[0].id).await.unwrap().unwrap();
    assert_eq!(task.api_calls.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn unparseable_payload_completes_with_a_diagnostic() {
    let Some(pool) = test_pool().await else { return };
    let store = AtlasStore::new(pool);

    let source = ScriptedSource::message(json!("definitely {{{ not json"));
    let collector = Collector::new(store.clone(), WorkflowRunner::new(source, "wf-1"));

    let stats = collector.run_once("杭州", DataType::Attraction).await.unwrap();
    assert_eq!(stats.records_parsed, 0);
    assert_eq!(stats.reviews_filed, 0);

    let (tasks, _) = store.list_tasks(1, 10).await.unwrap();
    assert_eq!(tasks[0].status, "completed");

    let task = store.get_task(tasks[0].id).await.unwrap().unwrap();
    assert!(task.parse_error.is_some());

    let (reviews, _) = store.list_reviews(&pending_filter()).await.unwrap();
    assert!(reviews.is_empty());
}

#[tokio::test]
async fn second_collection_for_the_same_city_conflicts() {
    let Some(pool) = test_pool().await else { return };
    let store = AtlasStore::new(pool);

    let release = Arc::new(Notify::new());
    let source = GatedSource {
        release: release.clone(),
    };
    let collector = Collector::new(store.clone(), WorkflowRunner::new(source, "wf-1"));

    let task_id = collector.start("杭州", DataType::Attraction).await.unwrap();

    let err = collector
        .start("杭州", DataType::Attraction)
        .await
        .unwrap_err();
    assert!(matches!(err, AtlasError::CollectLockConflict(_)));

    // A different city is not blocked by the lock, only queued behind the
    // gated source.
    let other = collector.start("苏州", DataType::Attraction).await.unwrap();
    assert_ne!(other, task_id);

    // Keep notifying: the background runs may not be parked on the gate yet.
    for _ in 0..100 {
        release.notify_waiters();
        let task = store.get_task(task_id).await.unwrap().unwrap();
        if task.status != "running" {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("task never left the running state");
}

#[tokio::test]
async fn empty_city_name_is_rejected_before_any_row_exists() {
    let Some(pool) = test_pool().await else { return };
    let store = AtlasStore::new(pool);

    let source = ScriptedSource::new(Vec::new());
    let collector = Collector::new(store.clone(), WorkflowRunner::new(source, "wf-1"));

    let err = collector.start("   ", DataType::Attraction).await.unwrap_err();
    assert!(matches!(err, AtlasError::Validation(_)));

    let (_, total) = store.list_tasks(1, 10).await.unwrap();
    assert_eq!(total, 0);
}

// No database needed: the runner's aggregated payload feeds the parser.
#[tokio::test]
async fn runner_payload_flows_into_the_parser() {
    let source = ScriptedSource::message(json!(r#"[{"name":"A"},{"name":"B"}]"#));
    let runner = WorkflowRunner::new(source, "wf-1");

    let report = runner.run("Hangzhou").await;
    assert!(report.result.success);

    let outcome = parser::parse(&report.result.data.unwrap());
    assert_eq!(outcome.records.len(), 2);
    assert!(outcome.parse_error.is_none());
}
