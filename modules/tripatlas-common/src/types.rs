use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AtlasError;

// --- Enums ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::Approved => "approved",
            ReviewStatus::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ReviewStatus {
    type Err = AtlasError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReviewStatus::Pending),
            "approved" => Ok(ReviewStatus::Approved),
            "rejected" => Ok(ReviewStatus::Rejected),
            other => Err(AtlasError::Validation(format!(
                "unknown review status: {other}"
            ))),
        }
    }
}

/// Decision a reviewer takes on a pending review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewAction {
    Approve,
    Reject,
}

impl std::str::FromStr for ReviewAction {
    type Err = AtlasError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approve" => Ok(ReviewAction::Approve),
            "reject" => Ok(ReviewAction::Reject),
            other => Err(AtlasError::Validation(format!(
                "unknown review action: {other}"
            ))),
        }
    }
}

/// Where a review row came from. Workflow rows are filed by the collector;
/// manual rows are submitted directly by operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewSource {
    Workflow,
    Manual,
}

impl ReviewSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewSource::Workflow => "workflow",
            ReviewSource::Manual => "manual",
        }
    }
}

impl std::fmt::Display for ReviewSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ReviewSource {
    type Err = AtlasError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "workflow" => Ok(ReviewSource::Workflow),
            "manual" => Ok(ReviewSource::Manual),
            other => Err(AtlasError::Validation(format!(
                "unknown review source: {other}"
            ))),
        }
    }
}

/// Kind of data a review row or collection run deals in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Attraction,
    Restaurant,
    Hotel,
    CityOverview,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Attraction => "attraction",
            DataType::Restaurant => "restaurant",
            DataType::Hotel => "hotel",
            DataType::CityOverview => "city_overview",
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DataType {
    type Err = AtlasError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "attraction" => Ok(DataType::Attraction),
            "restaurant" => Ok(DataType::Restaurant),
            "hotel" => Ok(DataType::Hotel),
            "city_overview" => Ok(DataType::CityOverview),
            other => Err(AtlasError::Validation(format!("unknown data type: {other}"))),
        }
    }
}

/// Classifier verdict for a single parsed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Attraction,
    Restaurant,
    Hotel,
}

impl RecordKind {
    pub fn data_type(&self) -> DataType {
        match self {
            RecordKind::Attraction => DataType::Attraction,
            RecordKind::Restaurant => DataType::Restaurant,
            RecordKind::Hotel => DataType::Hotel,
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.data_type().as_str())
    }
}

// --- Task log entries ---

/// One append-only entry in a collection task's step log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepEntry {
    pub step: String,
    pub timestamp: DateTime<Utc>,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl StepEntry {
    pub fn new(step: &str, description: impl Into<String>) -> Self {
        Self {
            step: step.to_string(),
            timestamp: Utc::now(),
            description: description.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Timing record for one upstream workflow attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiCallRecord {
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Summary numbers recorded on a completed task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStats {
    pub record_count: i64,
    pub elapsed_ms: i64,
    pub step_count: i64,
}

// --- Destination records ---

/// A classified record ready to be committed into a destination table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NewRecord {
    Attraction(NewAttraction),
    Restaurant(NewRestaurant),
    Hotel(NewHotel),
}

impl NewRecord {
    pub fn kind(&self) -> RecordKind {
        match self {
            NewRecord::Attraction(_) => RecordKind::Attraction,
            NewRecord::Restaurant(_) => RecordKind::Restaurant,
            NewRecord::Hotel(_) => RecordKind::Hotel,
        }
    }

    pub fn name_zh(&self) -> &str {
        match self {
            NewRecord::Attraction(a) => &a.name_zh,
            NewRecord::Restaurant(r) => &r.name_zh,
            NewRecord::Hotel(h) => &h.name_zh,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAttraction {
    pub name_zh: String,
    pub name_en: String,
    pub description_zh: String,
    pub description_en: String,
    pub image_url: Option<String>,
    pub address: Option<String>,
    pub ticket_price: Option<f64>,
    pub opening_hours: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRestaurant {
    pub name_zh: String,
    pub name_en: String,
    pub description_zh: String,
    pub description_en: String,
    pub image_url: Option<String>,
    pub address: Option<String>,
    pub cuisine: Option<String>,
    pub specialties: Option<Value>,
    pub price_range: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewHotel {
    pub name_zh: String,
    pub name_en: String,
    pub description_zh: String,
    pub description_en: String,
    pub image_url: Option<String>,
    pub address: Option<String>,
    pub star_rating: Option<i32>,
    pub amenities: Option<Value>,
    pub price_per_night: Option<f64>,
}

/// Payload for the upsert-by-city overview commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CityOverviewUpsert {
    pub sections: Value,
    pub pictures: Value,
    pub picture_advises: Value,
}
