// Postgres persistence for the collection pipeline and review queue.

use serde_json::Value;
use sqlx::{PgConnection, PgPool};
use tracing::info;
use uuid::Uuid;

use tripatlas_common::{
    ApiCallRecord, AtlasError, CityOverviewUpsert, DataType, NewAttraction, NewHotel, NewRecord,
    NewRestaurant, ReviewAction, ReviewSource, ReviewStatus, StepEntry, TaskStats,
};

use crate::models::{
    AttractionRow, CityOverviewRow, CityRow, HotelRow, RestaurantRow, ReviewRow, TaskRow,
    TaskSummary,
};

type Result<T> = std::result::Result<T, AtlasError>;

/// Parameters for filing a new review row.
#[derive(Debug, Clone)]
pub struct NewReview {
    pub task_id: Option<Uuid>,
    pub data_type: DataType,
    pub source: ReviewSource,
    pub city_name: String,
    pub payload: Value,
}

/// Filter and pagination for the review list endpoint.
#[derive(Debug, Clone, Default)]
pub struct ReviewFilter {
    pub page: i64,
    pub limit: i64,
    pub data_type: Option<DataType>,
    pub status: Option<ReviewStatus>,
    pub source: Option<ReviewSource>,
}

/// What an approval commits into the destination tables. Built by the caller
/// from the effective review payload before the decision transaction opens.
#[derive(Debug, Clone)]
pub enum CommitRecord {
    Record(NewRecord),
    Overview(CityOverviewUpsert),
}

/// A reviewer's decision on a pending review.
#[derive(Debug, Clone)]
pub struct DecisionInput {
    pub action: ReviewAction,
    pub reviewer_id: Option<String>,
    pub notes: Option<String>,
    /// Effective payload persisted back to the row (reviewer edits applied).
    pub payload: Value,
    pub selected_images: Option<Value>,
    /// Required for approvals; ignored on reject.
    pub commit: Option<CommitRecord>,
}

#[derive(Clone)]
pub struct AtlasStore {
    pool: PgPool,
}

impl AtlasStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run the embedded SQL migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AtlasError::Database(e.to_string()))?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Collection tasks
    // -----------------------------------------------------------------------

    /// Create a new task in the `running` state and return its id.
    pub async fn create_task(&self, city_name: &str, data_type: DataType) -> Result<Uuid> {
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO collection_tasks (city_name, data_type, status, progress)
            VALUES ($1, $2, 'running', 0)
            RETURNING id
            "#,
        )
        .bind(city_name)
        .bind(data_type.as_str())
        .fetch_one(&self.pool)
        .await?;

        info!(task_id = %id, city = %city_name, "Collection task created");
        Ok(id)
    }

    /// Append one entry to the task's step log. The array is only ever
    /// extended, never rewritten.
    pub async fn append_step(&self, task_id: Uuid, entry: &StepEntry) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE collection_tasks
            SET steps = steps || $2::jsonb, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(task_id)
        .bind(serde_json::to_value(entry)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update_progress(&self, task_id: Uuid, progress: i32) -> Result<()> {
        sqlx::query(
            "UPDATE collection_tasks SET progress = $2, updated_at = now() WHERE id = $1",
        )
        .bind(task_id)
        .bind(progress)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Store the raw workflow request sent upstream.
    pub async fn set_request(&self, task_id: Uuid, request: &Value) -> Result<()> {
        sqlx::query(
            "UPDATE collection_tasks SET request = $2, updated_at = now() WHERE id = $1",
        )
        .bind(task_id)
        .bind(request)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Store the raw aggregated workflow response.
    pub async fn set_response(&self, task_id: Uuid, response: &Value) -> Result<()> {
        sqlx::query(
            "UPDATE collection_tasks SET response = $2, updated_at = now() WHERE id = $1",
        )
        .bind(task_id)
        .bind(response)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Replace the task's api_calls log with the full per-attempt record.
    pub async fn record_api_calls(&self, task_id: Uuid, calls: &[ApiCallRecord]) -> Result<()> {
        sqlx::query(
            "UPDATE collection_tasks SET api_calls = $2::jsonb, updated_at = now() WHERE id = $1",
        )
        .bind(task_id)
        .bind(serde_json::to_value(calls)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_parse_error(&self, task_id: Uuid, message: &str) -> Result<()> {
        sqlx::query(
            "UPDATE collection_tasks SET parse_error = $2, updated_at = now() WHERE id = $1",
        )
        .bind(task_id)
        .bind(message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Transition a running task to `completed`. Terminal rows are never
    /// touched again; attempting to re-complete one is a conflict.
    pub async fn mark_completed(&self, task_id: Uuid, stats: &TaskStats) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE collection_tasks
            SET status = 'completed', progress = 100, stats = $2::jsonb,
                completed_at = now(), updated_at = now()
            WHERE id = $1 AND status = 'running'
            "#,
        )
        .bind(task_id)
        .bind(serde_json::to_value(stats)?)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AtlasError::Conflict(format!(
                "task {task_id} is not running"
            )));
        }
        Ok(())
    }

    /// Transition a running task to `failed`, preserving the accumulated
    /// step and api-call logs.
    pub async fn mark_failed(&self, task_id: Uuid, error: &str) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE collection_tasks
            SET status = 'failed', error = $2, completed_at = now(), updated_at = now()
            WHERE id = $1 AND status = 'running'
            "#,
        )
        .bind(task_id)
        .bind(error)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AtlasError::Conflict(format!(
                "task {task_id} is not running"
            )));
        }
        Ok(())
    }

    pub async fn get_task(&self, task_id: Uuid) -> Result<Option<TaskRow>> {
        let row = sqlx::query_as::<_, TaskRow>("SELECT * FROM collection_tasks WHERE id = $1")
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Newest-first page of task summaries plus the total count.
    pub async fn list_tasks(&self, page: i64, limit: i64) -> Result<(Vec<TaskSummary>, i64)> {
        let offset = (page.max(1) - 1) * limit;
        let rows = sqlx::query_as::<_, TaskSummary>(
            r#"
            SELECT id, city_name, data_type, status, progress, error, created_at, completed_at
            FROM collection_tasks
            ORDER BY created_at DESC
            OFFSET $1 LIMIT $2
            "#,
        )
        .bind(offset)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM collection_tasks")
            .fetch_one(&self.pool)
            .await?;

        Ok((rows, total))
    }

    // -----------------------------------------------------------------------
    // Reviews
    // -----------------------------------------------------------------------

    /// File a record into the pending-review queue.
    pub async fn insert_review(&self, review: NewReview) -> Result<Uuid> {
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO reviews (task_id, data_type, source, status, payload, city_name)
            VALUES ($1, $2, $3, 'pending', $4, $5)
            RETURNING id
            "#,
        )
        .bind(review.task_id)
        .bind(review.data_type.as_str())
        .bind(review.source.as_str())
        .bind(&review.payload)
        .bind(&review.city_name)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn get_review(&self, review_id: Uuid) -> Result<Option<ReviewRow>> {
        let row = sqlx::query_as::<_, ReviewRow>("SELECT * FROM reviews WHERE id = $1")
            .bind(review_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Newest-first page of reviews matching the filter, plus the total count.
    pub async fn list_reviews(&self, filter: &ReviewFilter) -> Result<(Vec<ReviewRow>, i64)> {
        let data_type = filter.data_type.map(|d| d.as_str());
        let status = filter.status.map(|s| s.as_str());
        let source = filter.source.map(|s| s.as_str());
        let offset = (filter.page.max(1) - 1) * filter.limit;

        let rows = sqlx::query_as::<_, ReviewRow>(
            r#"
            SELECT * FROM reviews
            WHERE ($1::text IS NULL OR data_type = $1)
              AND ($2::text IS NULL OR status = $2)
              AND ($3::text IS NULL OR source = $3)
            ORDER BY submitted_at DESC
            OFFSET $4 LIMIT $5
            "#,
        )
        .bind(data_type)
        .bind(status)
        .bind(source)
        .bind(offset)
        .bind(filter.limit)
        .fetch_all(&self.pool)
        .await?;

        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM reviews
            WHERE ($1::text IS NULL OR data_type = $1)
              AND ($2::text IS NULL OR status = $2)
              AND ($3::text IS NULL OR source = $3)
            "#,
        )
        .bind(data_type)
        .bind(status)
        .bind(source)
        .fetch_one(&self.pool)
        .await?;

        Ok((rows, total))
    }

    /// Decide a pending review. The row is locked with FOR UPDATE so a review
    /// transitions out of `pending` exactly once; a second decision conflicts.
    ///
    /// On approval the destination commit happens inside the same transaction:
    /// if the commit fails, the rollback leaves the review pending.
    pub async fn decide_review(
        &self,
        review_id: Uuid,
        input: DecisionInput,
    ) -> Result<ReviewRow> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, ReviewRow>("SELECT * FROM reviews WHERE id = $1 FOR UPDATE")
            .bind(review_id)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = row else {
            return Err(AtlasError::NotFound(format!("review {review_id}")));
        };

        if row.status != ReviewStatus::Pending.as_str() {
            return Err(AtlasError::Conflict(format!(
                "review {review_id} already {}",
                row.status
            )));
        }

        let status = match input.action {
            ReviewAction::Approve => ReviewStatus::Approved,
            ReviewAction::Reject => ReviewStatus::Rejected,
        };

        if input.action == ReviewAction::Approve {
            let city_id = find_or_create_city_conn(&mut *tx, &row.city_name).await?;
            match &input.commit {
                Some(CommitRecord::Record(record)) => {
                    insert_record_conn(&mut *tx, city_id, record).await?;
                }
                Some(CommitRecord::Overview(overview)) => {
                    upsert_city_overview_conn(&mut *tx, city_id, overview).await?;
                }
                None => {
                    return Err(AtlasError::Validation(
                        "approval requires a commit record".to_string(),
                    ));
                }
            }
        }

        let updated = sqlx::query_as::<_, ReviewRow>(
            r#"
            UPDATE reviews
            SET status = $2, payload = $3, reviewed_at = now(),
                reviewer_id = $4, notes = $5, selected_images = $6
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(review_id)
        .bind(status.as_str())
        .bind(&input.payload)
        .bind(&input.reviewer_id)
        .bind(&input.notes)
        .bind(&input.selected_images)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(review_id = %review_id, status = %status, "Review decided");
        Ok(updated)
    }

    // -----------------------------------------------------------------------
    // Cities and destination records
    // -----------------------------------------------------------------------

    /// Look up a city by exact name in either language column, creating it
    /// with placeholder descriptions when absent.
    pub async fn find_or_create_city(&self, name: &str) -> Result<Uuid> {
        let mut conn = self.pool.acquire().await?;
        find_or_create_city_conn(&mut *conn, name).await
    }

    /// Resolve the city and insert one classified record. Records are
    /// create-only; nothing here updates existing rows.
    pub async fn save_record(&self, city_name: &str, record: &NewRecord) -> Result<Uuid> {
        let mut conn = self.pool.acquire().await?;
        let city_id = find_or_create_city_conn(&mut *conn, city_name).await?;
        insert_record_conn(&mut *conn, city_id, record).await
    }

    /// Upsert the overview row for a city (one row per city).
    pub async fn upsert_city_overview(
        &self,
        city_name: &str,
        overview: &CityOverviewUpsert,
    ) -> Result<Uuid> {
        let mut conn = self.pool.acquire().await?;
        let city_id = find_or_create_city_conn(&mut *conn, city_name).await?;
        upsert_city_overview_conn(&mut *conn, city_id, overview).await
    }

    // -----------------------------------------------------------------------
    // Browse (read-only)
    // -----------------------------------------------------------------------

    pub async fn list_cities(&self) -> Result<Vec<CityRow>> {
        let rows = sqlx::query_as::<_, CityRow>("SELECT * FROM cities ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn get_city(&self, city_id: Uuid) -> Result<Option<CityRow>> {
        let row = sqlx::query_as::<_, CityRow>("SELECT * FROM cities WHERE id = $1")
            .bind(city_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn attractions_by_city(&self, city_id: Uuid) -> Result<Vec<AttractionRow>> {
        let rows = sqlx::query_as::<_, AttractionRow>(
            "SELECT * FROM attractions WHERE city_id = $1 ORDER BY created_at ASC",
        )
        .bind(city_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn restaurants_by_city(&self, city_id: Uuid) -> Result<Vec<RestaurantRow>> {
        let rows = sqlx::query_as::<_, RestaurantRow>(
            "SELECT * FROM restaurants WHERE city_id = $1 ORDER BY created_at ASC",
        )
        .bind(city_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn hotels_by_city(&self, city_id: Uuid) -> Result<Vec<HotelRow>> {
        let rows = sqlx::query_as::<_, HotelRow>(
            "SELECT * FROM hotels WHERE city_id = $1 ORDER BY created_at ASC",
        )
        .bind(city_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn overview_by_city(&self, city_id: Uuid) -> Result<Option<CityOverviewRow>> {
        let row = sqlx::query_as::<_, CityOverviewRow>(
            "SELECT * FROM city_overviews WHERE city_id = $1",
        )
        .bind(city_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}

// ---------------------------------------------------------------------------
// Connection-level helpers, shared by the pool paths and the decision
// transaction.
// ---------------------------------------------------------------------------

async fn find_or_create_city_conn(conn: &mut PgConnection, name: &str) -> Result<Uuid> {
    let existing = sqlx::query_scalar::<_, Uuid>(
        "SELECT id FROM cities WHERE name_zh = $1 OR name_en = $1 LIMIT 1",
    )
    .bind(name)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(id) = existing {
        return Ok(id);
    }

    let id = sqlx::query_scalar::<_, Uuid>(
        r#"
        INSERT INTO cities (name_zh, name_en, description_zh, description_en)
        VALUES ($1, $1, '待完善', 'To be added')
        RETURNING id
        "#,
    )
    .bind(name)
    .fetch_one(&mut *conn)
    .await?;

    info!(city = %name, city_id = %id, "City created with placeholder descriptions");
    Ok(id)
}

async fn insert_record_conn(
    conn: &mut PgConnection,
    city_id: Uuid,
    record: &NewRecord,
) -> Result<Uuid> {
    match record {
        NewRecord::Attraction(a) => insert_attraction(conn, city_id, a).await,
        NewRecord::Restaurant(r) => insert_restaurant(conn, city_id, r).await,
        NewRecord::Hotel(h) => insert_hotel(conn, city_id, h).await,
    }
}

async fn insert_attraction(
    conn: &mut PgConnection,
    city_id: Uuid,
    a: &NewAttraction,
) -> Result<Uuid> {
    let id = sqlx::query_scalar::<_, Uuid>(
        r#"
        INSERT INTO attractions
            (city_id, name_zh, name_en, description_zh, description_en,
             image_url, address, ticket_price, opening_hours, category)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING id
        "#,
    )
    .bind(city_id)
    .bind(&a.name_zh)
    .bind(&a.name_en)
    .bind(&a.description_zh)
    .bind(&a.description_en)
    .bind(&a.image_url)
    .bind(&a.address)
    .bind(a.ticket_price)
    .bind(&a.opening_hours)
    .bind(&a.category)
    .fetch_one(&mut *conn)
    .await?;
    Ok(id)
}

async fn insert_restaurant(
    conn: &mut PgConnection,
    city_id: Uuid,
    r: &NewRestaurant,
) -> Result<Uuid> {
    let id = sqlx::query_scalar::<_, Uuid>(
        r#"
        INSERT INTO restaurants
            (city_id, name_zh, name_en, description_zh, description_en,
             image_url, address, cuisine, specialties, price_range)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING id
        "#,
    )
    .bind(city_id)
    .bind(&r.name_zh)
    .bind(&r.name_en)
    .bind(&r.description_zh)
    .bind(&r.description_en)
    .bind(&r.image_url)
    .bind(&r.address)
    .bind(&r.cuisine)
    .bind(&r.specialties)
    .bind(&r.price_range)
    .fetch_one(&mut *conn)
    .await?;
    Ok(id)
}

async fn insert_hotel(conn: &mut PgConnection, city_id: Uuid, h: &NewHotel) -> Result<Uuid> {
    let id = sqlx::query_scalar::<_, Uuid>(
        r#"
        INSERT INTO hotels
            (city_id, name_zh, name_en, description_zh, description_en,
             image_url, address, star_rating, amenities, price_per_night)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING id
        "#,
    )
    .bind(city_id)
    .bind(&h.name_zh)
    .bind(&h.name_en)
    .bind(&h.description_zh)
    .bind(&h.description_en)
    .bind(&h.image_url)
    .bind(&h.address)
    .bind(h.star_rating)
    .bind(&h.amenities)
    .bind(h.price_per_night)
    .fetch_one(&mut *conn)
    .await?;
    Ok(id)
}

async fn upsert_city_overview_conn(
    conn: &mut PgConnection,
    city_id: Uuid,
    overview: &CityOverviewUpsert,
) -> Result<Uuid> {
    let id = sqlx::query_scalar::<_, Uuid>(
        r#"
        INSERT INTO city_overviews (city_id, sections, pictures, picture_advises)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (city_id) DO UPDATE
        SET sections = EXCLUDED.sections,
            pictures = EXCLUDED.pictures,
            picture_advises = EXCLUDED.picture_advises,
            updated_at = now()
        RETURNING id
        "#,
    )
    .bind(city_id)
    .bind(&overview.sections)
    .bind(&overview.pictures)
    .bind(&overview.picture_advises)
    .fetch_one(&mut *conn)
    .await?;
    Ok(id)
}
