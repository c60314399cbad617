//! Review queue endpoints: list pending work, decide a row.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use tripatlas_collector::classifier;
use tripatlas_common::{AtlasError, DataType, ReviewAction, ReviewSource, ReviewStatus};
use tripatlas_store::{DecisionInput, ReviewFilter};

use super::{bad_request, error_response, not_found};
use crate::AppState;

#[derive(Deserialize)]
pub struct ReviewsQuery {
    page: Option<i64>,
    limit: Option<i64>,
    data_type: Option<String>,
    status: Option<String>,
    source: Option<String>,
}

#[derive(Deserialize)]
pub struct DecisionRequest {
    action: String,
    reviewer_id: Option<String>,
    notes: Option<String>,
    /// Reviewer-edited payload. Omitted means the stored payload stands.
    payload: Option<Value>,
    selected_images: Option<Value>,
}

pub async fn api_reviews(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ReviewsQuery>,
) -> impl IntoResponse {
    let filter = match build_filter(&params) {
        Ok(filter) => filter,
        Err(e) => return error_response(e),
    };

    match state.store.list_reviews(&filter).await {
        Ok((reviews, total)) => Json(serde_json::json!({
            "reviews": reviews,
            "total": total,
            "page": filter.page,
            "limit": filter.limit,
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}

/// Decide a pending review. The commit record is derived from the
/// effective payload up front so reviewer edits can change where an
/// approval lands; the store re-checks the pending state under lock.
pub async fn api_decide_review(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<DecisionRequest>,
) -> impl IntoResponse {
    let Ok(review_id) = Uuid::parse_str(&id) else {
        return bad_request("invalid review id");
    };

    let row = match state.store.get_review(review_id).await {
        Ok(Some(row)) => row,
        Ok(None) => return not_found(format!("review {review_id}")),
        Err(e) => return error_response(e),
    };

    let data_type = match DataType::from_str(&row.data_type) {
        Ok(data_type) => data_type,
        Err(e) => return error_response(e),
    };

    let input = match build_decision(data_type, &row.payload, body) {
        Ok(input) => input,
        Err(e) => return error_response(e),
    };

    match state.store.decide_review(review_id, input).await {
        Ok(updated) => Json(serde_json::json!({"review": updated})).into_response(),
        Err(e) => error_response(e),
    }
}

fn build_filter(params: &ReviewsQuery) -> Result<ReviewFilter, AtlasError> {
    Ok(ReviewFilter {
        page: params.page.unwrap_or(1).max(1),
        limit: params.limit.unwrap_or(20).clamp(1, 100),
        data_type: params
            .data_type
            .as_deref()
            .map(DataType::from_str)
            .transpose()?,
        status: params
            .status
            .as_deref()
            .map(ReviewStatus::from_str)
            .transpose()?,
        source: params
            .source
            .as_deref()
            .map(ReviewSource::from_str)
            .transpose()?,
    })
}

/// Turn the request body into a store decision. Approvals carry a commit
/// built from the effective payload; rejects carry none.
fn build_decision(
    data_type: DataType,
    stored_payload: &Value,
    body: DecisionRequest,
) -> Result<DecisionInput, AtlasError> {
    let action = ReviewAction::from_str(&body.action)?;
    let payload = body.payload.unwrap_or_else(|| stored_payload.clone());
    let commit = match action {
        ReviewAction::Approve => Some(classifier::commit_for(data_type, &payload)),
        ReviewAction::Reject => None,
    };
    Ok(DecisionInput {
        action,
        reviewer_id: body.reviewer_id,
        notes: body.notes,
        payload,
        selected_images: body.selected_images,
        commit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tripatlas_common::NewRecord;
    use tripatlas_store::CommitRecord;

    fn request(action: &str, payload: Option<Value>) -> DecisionRequest {
        DecisionRequest {
            action: action.to_string(),
            reviewer_id: None,
            notes: None,
            payload,
            selected_images: None,
        }
    }

    #[test]
    fn approve_commits_the_edited_payload() {
        let stored = json!({"name": "老店", "category": "景点"});
        let edited = json!({"name": "老店", "cuisine": "川菜"});

        let input =
            build_decision(DataType::Attraction, &stored, request("approve", Some(edited.clone())))
                .unwrap();

        assert_eq!(input.payload, edited);
        // The edit removed the attraction markers, so the commit re-routes.
        let Some(CommitRecord::Record(NewRecord::Restaurant(r))) = input.commit else {
            panic!("expected a restaurant commit");
        };
        assert_eq!(r.cuisine.as_deref(), Some("川菜"));
    }

    #[test]
    fn approve_without_edits_keeps_the_stored_payload() {
        let stored = json!({"name": "断桥", "ticketPrice": "¥40"});
        let input = build_decision(DataType::Attraction, &stored, request("approve", None)).unwrap();

        assert_eq!(input.payload, stored);
        assert!(matches!(
            input.commit,
            Some(CommitRecord::Record(NewRecord::Attraction(_)))
        ));
    }

    #[test]
    fn overview_approval_builds_an_overview_commit() {
        let stored = json!({"city": "杭州", "history": {"content": "H"}});
        let input =
            build_decision(DataType::CityOverview, &stored, request("approve", None)).unwrap();
        assert!(matches!(input.commit, Some(CommitRecord::Overview(_))));
    }

    #[test]
    fn reject_carries_no_commit() {
        let stored = json!({"name": "老店"});
        let input = build_decision(DataType::Attraction, &stored, request("reject", None)).unwrap();
        assert_eq!(input.action, ReviewAction::Reject);
        assert!(input.commit.is_none());
    }

    #[test]
    fn unknown_action_is_a_validation_error() {
        let err = build_decision(DataType::Attraction, &json!({}), request("maybe", None))
            .unwrap_err();
        assert!(matches!(err, AtlasError::Validation(_)));
    }

    #[test]
    fn filter_parses_enums_and_rejects_garbage() {
        let params = ReviewsQuery {
            page: None,
            limit: Some(500),
            data_type: Some("hotel".to_string()),
            status: Some("pending".to_string()),
            source: None,
        };
        let filter = build_filter(&params).unwrap();
        assert_eq!(filter.page, 1);
        assert_eq!(filter.limit, 100);
        assert_eq!(filter.data_type, Some(DataType::Hotel));
        assert_eq!(filter.status, Some(ReviewStatus::Pending));

        let bad = ReviewsQuery {
            page: None,
            limit: None,
            data_type: Some("museum".to_string()),
            status: None,
            source: None,
        };
        assert!(build_filter(&bad).is_err());
    }
}
