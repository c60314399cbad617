use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

/// Full row from the collection_tasks table, including the raw request,
/// response and the append-only logs. Served by the task details endpoint.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct TaskRow {
    pub id: Uuid,
    pub city_name: String,
    pub data_type: String,
    pub status: String,
    pub progress: i32,
    pub request: Option<Value>,
    pub response: Option<Value>,
    pub api_calls: Value,
    pub steps: Value,
    pub error: Option<String>,
    pub parse_error: Option<String>,
    pub stats: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Slim task projection for list views. Leaves the JSONB logs behind.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct TaskSummary {
    pub id: Uuid,
    pub city_name: String,
    pub data_type: String,
    pub status: String,
    pub progress: i32,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// A row from the reviews table.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct ReviewRow {
    pub id: Uuid,
    pub task_id: Option<Uuid>,
    pub data_type: String,
    pub source: String,
    pub status: String,
    pub payload: Value,
    pub city_name: String,
    pub submitted_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewer_id: Option<String>,
    pub notes: Option<String>,
    pub selected_images: Option<Value>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct CityRow {
    pub id: Uuid,
    pub name_zh: String,
    pub name_en: String,
    pub description_zh: String,
    pub description_en: String,
    pub image_url: Option<String>,
    pub location: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct AttractionRow {
    pub id: Uuid,
    pub city_id: Uuid,
    pub name_zh: String,
    pub name_en: String,
    pub description_zh: String,
    pub description_en: String,
    pub image_url: Option<String>,
    pub address: Option<String>,
    pub ticket_price: Option<f64>,
    pub opening_hours: Option<String>,
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct RestaurantRow {
    pub id: Uuid,
    pub city_id: Uuid,
    pub name_zh: String,
    pub name_en: String,
    pub description_zh: String,
    pub description_en: String,
    pub image_url: Option<String>,
    pub address: Option<String>,
    pub cuisine: Option<String>,
    pub specialties: Option<Value>,
    pub price_range: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct HotelRow {
    pub id: Uuid,
    pub city_id: Uuid,
    pub name_zh: String,
    pub name_en: String,
    pub description_zh: String,
    pub description_en: String,
    pub image_url: Option<String>,
    pub address: Option<String>,
    pub star_rating: Option<i32>,
    pub amenities: Option<Value>,
    pub price_per_night: Option<f64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct CityOverviewRow {
    pub id: Uuid,
    pub city_id: Uuid,
    pub sections: Value,
    pub pictures: Value,
    pub picture_advises: Value,
    pub updated_at: DateTime<Utc>,
}
