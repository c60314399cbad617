//! Drives one collection end to end: dispatch, workflow run, parse, review
//! filing, terminal status. One collection per city at a time.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{error, info};
use uuid::Uuid;

use tripatlas_common::{AtlasError, DataType, ReviewSource, StepEntry, TaskStats};
use tripatlas_store::{AtlasStore, NewReview};

use crate::classifier;
use crate::parser;
use crate::runner::{WorkflowRunner, WorkflowSource};

type Result<T> = std::result::Result<T, AtlasError>;

/// Stats from one collection run.
#[derive(Debug, Default)]
pub struct CollectStats {
    pub records_parsed: u32,
    pub reviews_filed: u32,
    pub attractions: u32,
    pub restaurants: u32,
    pub hotels: u32,
    pub overviews: u32,
    pub workflow_attempts: u32,
    pub elapsed_ms: u64,
}

impl CollectStats {
    fn bump(&mut self, data_type: DataType) {
        self.reviews_filed += 1;
        match data_type {
            DataType::Attraction => self.attractions += 1,
            DataType::Restaurant => self.restaurants += 1,
            DataType::Hotel => self.hotels += 1,
            DataType::CityOverview => self.overviews += 1,
        }
    }
}

impl std::fmt::Display for CollectStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Collection Run Complete ===")?;
        writeln!(f, "Workflow attempts: {}", self.workflow_attempts)?;
        writeln!(f, "Records parsed:    {}", self.records_parsed)?;
        writeln!(f, "Reviews filed:     {}", self.reviews_filed)?;
        writeln!(f, "\nBy type:")?;
        writeln!(f, "  Attraction: {}", self.attractions)?;
        writeln!(f, "  Restaurant: {}", self.restaurants)?;
        writeln!(f, "  Hotel:      {}", self.hotels)?;
        writeln!(f, "  Overview:   {}", self.overviews)?;
        writeln!(f, "\nElapsed: {} ms", self.elapsed_ms)?;
        Ok(())
    }
}

pub struct Collector<S> {
    store: AtlasStore,
    runner: Arc<WorkflowRunner<S>>,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl<S> Clone for Collector<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            runner: Arc::clone(&self.runner),
            in_flight: Arc::clone(&self.in_flight),
        }
    }
}

impl<S: WorkflowSource + 'static> Collector<S> {
    pub fn new(store: AtlasStore, runner: WorkflowRunner<S>) -> Self {
        Self {
            store,
            runner: Arc::new(runner),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Validate, take the per-city lock, create the task row and spawn the
    /// background run. Returns the task id immediately; a run already in
    /// flight for the same city is a conflict.
    pub async fn start(&self, city_name: &str, data_type: DataType) -> Result<Uuid> {
        let city = city_name.trim();
        if city.is_empty() {
            return Err(AtlasError::Validation(
                "city_name must not be empty".to_string(),
            ));
        }

        self.acquire(city).await?;

        let task_id = match self.store.create_task(city, data_type).await {
            Ok(id) => id,
            Err(e) => {
                self.release(city).await;
                return Err(e);
            }
        };

        let collector = self.clone();
        let city = city.to_string();
        tokio::spawn(async move {
            let _ = collector.execute(task_id, &city, data_type).await;
            collector.release(&city).await;
        });

        Ok(task_id)
    }

    /// Run one collection synchronously. Same locking and task lifecycle as
    /// `start`, but the caller waits for the stats.
    pub async fn run_once(&self, city_name: &str, data_type: DataType) -> Result<CollectStats> {
        let city = city_name.trim();
        if city.is_empty() {
            return Err(AtlasError::Validation(
                "city_name must not be empty".to_string(),
            ));
        }

        self.acquire(city).await?;

        let result = match self.store.create_task(city, data_type).await {
            Ok(task_id) => self.execute(task_id, city, data_type).await,
            Err(e) => Err(e),
        };
        self.release(city).await;
        result
    }

    async fn acquire(&self, city: &str) -> Result<()> {
        let mut in_flight = self.in_flight.lock().await;
        if !in_flight.insert(city.to_string()) {
            return Err(AtlasError::CollectLockConflict(city.to_string()));
        }
        Ok(())
    }

    async fn release(&self, city: &str) {
        self.in_flight.lock().await.remove(city);
    }

    /// Run the pipeline body and mark the task failed on any error. The
    /// accumulated step and api-call logs are preserved for diagnosis.
    async fn execute(
        &self,
        task_id: Uuid,
        city: &str,
        data_type: DataType,
    ) -> Result<CollectStats> {
        match self.run_inner(task_id, city, data_type).await {
            Ok(stats) => {
                info!(task_id = %task_id, city = %city, "Collection complete. {stats}");
                Ok(stats)
            }
            Err(e) => {
                error!(task_id = %task_id, city = %city, error = %e, "Collection failed");
                let entry = StepEntry::new("error", format!("collection failed: {e}"));
                if let Err(log_err) = self.store.append_step(task_id, &entry).await {
                    error!(task_id = %task_id, error = %log_err, "Failed to append error step");
                }
                if let Err(mark_err) = self.store.mark_failed(task_id, &e.to_string()).await {
                    error!(task_id = %task_id, error = %mark_err, "Failed to mark task failed");
                }
                Err(e)
            }
        }
    }

    async fn run_inner(
        &self,
        task_id: Uuid,
        city: &str,
        data_type: DataType,
    ) -> Result<CollectStats> {
        let started = std::time::Instant::now();
        let mut step_count = 0i64;

        // Dispatch: persist the request before the call goes out.
        let request = self.runner.request_for(city);
        self.store
            .set_request(task_id, &serde_json::to_value(&request)?)
            .await?;
        self.log_step(
            task_id,
            &mut step_count,
            StepEntry::new("dispatch", format!("workflow dispatched for {city}"))
                .with_data(json!({"workflow_id": request.workflow_id})),
        )
        .await?;
        self.store.update_progress(task_id, 10).await?;

        let report = self.runner.run(city).await;
        self.store.record_api_calls(task_id, &report.api_calls).await?;

        if !report.result.success {
            let message = report
                .result
                .error
                .unwrap_or_else(|| "workflow failed".to_string());
            self.log_step(
                task_id,
                &mut step_count,
                StepEntry::new("workflow", format!("workflow failed: {message}")),
            )
            .await?;
            return Err(AtlasError::Workflow(message));
        }

        let Some(data) = report.result.data else {
            return Err(AtlasError::Workflow(
                "workflow succeeded without data".to_string(),
            ));
        };

        self.store.set_response(task_id, &data).await?;
        self.log_step(
            task_id,
            &mut step_count,
            StepEntry::new(
                "workflow",
                format!("workflow resolved after {} attempt(s)", report.api_calls.len()),
            ),
        )
        .await?;
        self.store.update_progress(task_id, 50).await?;

        // Parse failures are diagnostics, not task failures.
        let outcome = parser::parse(&data);
        if let Some(parse_error) = &outcome.parse_error {
            self.store.set_parse_error(task_id, parse_error).await?;
            self.log_step(
                task_id,
                &mut step_count,
                StepEntry::new("parse", format!("payload not parseable: {parse_error}")),
            )
            .await?;
        } else {
            self.log_step(
                task_id,
                &mut step_count,
                StepEntry::new("parse", format!("{} record(s) parsed", outcome.records.len())),
            )
            .await?;
        }

        let mut stats = CollectStats {
            records_parsed: outcome.records.len() as u32,
            workflow_attempts: report.api_calls.len() as u32,
            ..Default::default()
        };

        for record in &outcome.records {
            let review_type = self.file_review(task_id, city, data_type, record).await?;
            stats.bump(review_type);
        }
        self.log_step(
            task_id,
            &mut step_count,
            StepEntry::new("review", format!("{} review row(s) filed", stats.reviews_filed)),
        )
        .await?;

        stats.elapsed_ms = started.elapsed().as_millis() as u64;
        self.store
            .mark_completed(
                task_id,
                &TaskStats {
                    record_count: stats.reviews_filed as i64,
                    elapsed_ms: stats.elapsed_ms as i64,
                    step_count,
                },
            )
            .await?;

        Ok(stats)
    }

    /// File one record into the pending-review queue. Overview runs keep
    /// their type; everything else is routed by the classifier.
    async fn file_review(
        &self,
        task_id: Uuid,
        city: &str,
        data_type: DataType,
        record: &Value,
    ) -> Result<DataType> {
        let review_type = match data_type {
            DataType::CityOverview => DataType::CityOverview,
            _ => classifier::classify(record).data_type(),
        };
        let record_city = record
            .get("city")
            .and_then(Value::as_str)
            .unwrap_or(city)
            .to_string();

        self.store
            .insert_review(NewReview {
                task_id: Some(task_id),
                data_type: review_type,
                source: ReviewSource::Workflow,
                city_name: record_city,
                payload: record.clone(),
            })
            .await?;

        Ok(review_type)
    }

    async fn log_step(&self, task_id: Uuid, count: &mut i64, entry: StepEntry) -> Result<()> {
        self.store.append_step(task_id, &entry).await?;
        *count += 1;
        Ok(())
    }
}
